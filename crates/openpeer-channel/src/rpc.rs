//! Remote procedure calls: the pending-call table and the caller's future.
//!
//! A call is broadcast to every registered peer, and each of them replies.
//! The first reply from a peer the request actually went to settles the call;
//! the entry is gone after that, so later replies find nothing and are ignored.

use crate::error::CallError;
use dashmap::DashMap;
use openpeer_types::PeerId;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Sleep;
use tracing::debug;

type Reply = Result<Value, CallError>;

struct PendingEntry {
    reply: oneshot::Sender<Reply>,
    targets: HashSet<PeerId>,
}

/// What happened to an inbound call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The call was waiting for this result and is now settled.
    Settled,
    /// No call is waiting on this number (never issued, or already settled).
    Unknown,
    /// The responder was not sent this call.
    ForeignResponder,
}

/// Outstanding calls keyed by the request's sequence number.
#[derive(Default)]
pub struct PendingCalls {
    table: DashMap<u64, PendingEntry>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a call sent as envelope `no` to `targets`.
    ///
    /// With a timeout, the deadline timer is created here, so this must run
    /// inside a tokio runtime context. The returned future may then be polled
    /// from anywhere while that runtime is alive.
    pub fn insert(
        self: &Arc<Self>,
        no: u64,
        targets: HashSet<PeerId>,
        timeout: Option<std::time::Duration>,
    ) -> PendingCall {
        let (tx, rx) = oneshot::channel();
        self.table.insert(no, PendingEntry { reply: tx, targets });
        PendingCall {
            no,
            rx,
            calls: Some(Arc::clone(self)),
            sleep: timeout.map(|t| Box::pin(tokio::time::sleep(t))),
            done: false,
        }
    }

    /// Drop peers from the target set of call `no`.
    ///
    /// Used for peers whose sink refused the request: they never saw it, so
    /// nothing they send may settle the call.
    pub fn exclude(&self, no: u64, peers: &[PeerId]) {
        if let Some(mut entry) = self.table.get_mut(&no) {
            for peer in peers {
                entry.targets.remove(peer);
            }
        }
    }

    /// Settle call `no` with a result received from `from`.
    pub fn settle(&self, no: u64, from: &PeerId, outcome: Result<Value, String>) -> Settlement {
        // Check and remove under the shard lock so a call settles at most once.
        let removed = self
            .table
            .remove_if(&no, |_, entry| entry.targets.contains(from));
        match removed {
            Some((_, entry)) => {
                let reply = outcome.map_err(CallError::Remote);
                // The caller may have stopped waiting; nothing to do then.
                let _ = entry.reply.send(reply);
                Settlement::Settled
            }
            None if self.table.contains_key(&no) => Settlement::ForeignResponder,
            None => Settlement::Unknown,
        }
    }

    /// Forget call `no` without settling it.
    pub fn remove(&self, no: u64) -> bool {
        self.table.remove(&no).is_some()
    }

    /// Settle every outstanding call with `error`.
    pub fn fail_all(&self, error: CallError) -> usize {
        let numbers: Vec<u64> = self.table.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for no in numbers {
            if let Some((_, entry)) = self.table.remove(&no) {
                let _ = entry.reply.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no call is outstanding.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Future returned by `Channel::call`.
///
/// Resolves with the remote return value or a [`CallError`]. Dropping it
/// before it settles withdraws the call from the pending table.
pub struct PendingCall {
    no: u64,
    rx: oneshot::Receiver<Reply>,
    calls: Option<Arc<PendingCalls>>,
    sleep: Option<Pin<Box<Sleep>>>,
    done: bool,
}

impl PendingCall {
    /// A call that has already failed, e.g. on a destroyed channel.
    pub(crate) fn failed(error: CallError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            no: 0,
            rx,
            calls: None,
            sleep: None,
            done: false,
        }
    }

    /// Sequence number of the request envelope.
    pub fn sequence_no(&self) -> u64 {
        self.no
    }
}

impl Future for PendingCall {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(Err(CallError::Closed));
        }

        if let Poll::Ready(result) = Pin::new(&mut this.rx).poll(cx) {
            this.done = true;
            // Sender dropped without a reply: the table was torn down.
            return Poll::Ready(result.unwrap_or(Err(CallError::Closed)));
        }

        if let Some(sleep) = this.sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                this.done = true;
                if let Some(calls) = &this.calls {
                    calls.remove(this.no);
                }
                debug!(no = this.no, "remote call timed out");
                return Poll::Ready(Err(CallError::Timeout));
            }
        }

        Poll::Pending
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.done {
            if let Some(calls) = &self.calls {
                if calls.remove(self.no) {
                    debug!(no = self.no, "remote call withdrawn");
                }
            }
        }
    }
}

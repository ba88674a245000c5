//! Envelope construction for one channel.
//!
//! Requests get the next number from the channel's own counter; replies echo
//! the number of the envelope they answer.

use openpeer_types::{PeerId, SessionId};
use openpeer_wire::Envelope;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stamps outgoing envelopes with this channel's identity and session.
#[derive(Debug)]
pub struct Outbox {
    sender: PeerId,
    session_id: SessionId,
    next_no: AtomicU64,
}

impl Outbox {
    /// Numbering starts at 1.
    pub fn new(sender: PeerId, session_id: SessionId) -> Self {
        Self {
            sender,
            session_id,
            next_no: AtomicU64::new(1),
        }
    }

    /// Identity stamped on every envelope.
    pub fn peer_id(&self) -> &PeerId {
        &self.sender
    }

    /// Session stamped on every envelope.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Build a request with a fresh sequence number.
    pub fn make_request(&self, data: Value, kind: &str, internal: bool) -> Envelope {
        let no = self.next_no.fetch_add(1, Ordering::Relaxed);
        Envelope::new(
            self.sender.clone(),
            no,
            self.session_id.clone(),
            kind,
            data,
            internal,
        )
    }

    /// Build a reply to envelope number `no`.
    pub fn make_reply(
        &self,
        no: u64,
        data: Value,
        kind: &str,
        internal: bool,
        error: Option<String>,
    ) -> Envelope {
        let envelope = Envelope::new(
            self.sender.clone(),
            no,
            self.session_id.clone(),
            kind,
            data,
            internal,
        );
        match error {
            Some(error) => envelope.with_error(error),
            None => envelope,
        }
    }
}

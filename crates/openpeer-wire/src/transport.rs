//! Transport contract.
//!
//! A channel owns exactly one [`Transport`], which yields every inbound
//! message together with the [`PeerSink`] it arrived on. Sinks are how the
//! channel talks back: the handshake stores the sink of each new peer in the
//! registry, and every later send goes through it.

use crate::envelope::Envelope;
use crate::error::WireError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the endpoint a sink delivers to.
///
/// Two sinks with the same id reach the same endpoint, which is how
/// duplicate parents are collapsed before the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Capability to deliver an envelope to one remote peer.
///
/// A failed send means the peer is gone; the channel evicts it.
pub trait PeerSink: Send + Sync + 'static {
    /// Identity of the endpoint this sink reaches.
    fn sink_id(&self) -> SinkId;

    /// Deliver an envelope.
    fn send(&self, envelope: &Envelope) -> Result<(), WireError>;
}

/// One inbound message.
pub struct Delivery {
    /// The raw message. Not validated yet.
    pub message: Value,
    /// Sink that reaches whoever sent the message.
    pub source: Arc<dyn PeerSink>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("source", &self.source.sink_id())
            .finish()
    }
}

/// Inbound side of a transport binding.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Wait for the next inbound message. `None` once the transport is closed.
    async fn receive(&mut self) -> Option<Delivery>;

    /// Release the binding. Must tolerate being called more than once.
    fn destroy(&mut self);
}

/// Keep the first sink per endpoint, preserving order.
pub fn dedup_sinks(sinks: Vec<Arc<dyn PeerSink>>) -> Vec<Arc<dyn PeerSink>> {
    let mut seen = std::collections::HashSet::new();
    sinks
        .into_iter()
        .filter(|sink| seen.insert(sink.sink_id()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink(SinkId);

    impl PeerSink for NullSink {
        fn sink_id(&self) -> SinkId {
            self.0
        }

        fn send(&self, _envelope: &Envelope) -> Result<(), WireError> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_ids_unique() {
        let a = SinkId::next();
        let b = SinkId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sink-"));
    }

    #[test]
    fn test_dedup_sinks_keeps_first_per_endpoint() {
        let x = SinkId::next();
        let y = SinkId::next();
        let sinks: Vec<Arc<dyn PeerSink>> = vec![
            Arc::new(NullSink(x)),
            Arc::new(NullSink(y)),
            Arc::new(NullSink(x)),
        ];
        let ids: Vec<SinkId> = dedup_sinks(sinks).iter().map(|s| s.sink_id()).collect();
        assert_eq!(ids, vec![x, y]);
    }
}

//! Self-registration handshake.
//!
//! A new channel announces itself with an internal `SelfRegister` envelope
//! to its parents. A receiver that does not know the sender yet registers it
//! under the sink the announcement arrived on and answers with its own
//! `SelfRegister`, which registers it on the other side. Known senders are
//! ignored, so the exchange stops after one round trip.

use crate::outbox::Outbox;
use openpeer_types::PeerId;
use openpeer_wire::envelope::SELF_REGISTER;
use openpeer_wire::transport::dedup_sinks;
use openpeer_wire::{PeerEntry, PeerRegistry, PeerSink, WireError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of processing one inbound `SelfRegister`.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// New peer registered. Carries the result of sending our acknowledgment.
    Registered { ack: Result<(), WireError> },
    /// Sender already registered; nothing sent.
    AlreadyKnown,
    /// Our own announcement came back; never registered.
    OwnIdentity,
}

/// Payload of a `SelfRegister` envelope.
fn announcement(outbox: &Outbox) -> openpeer_wire::Envelope {
    outbox.make_request(Value::String(String::new()), SELF_REGISTER, true)
}

/// Send `SelfRegister` to one sink.
pub fn announce_to(outbox: &Outbox, sink: &dyn PeerSink) -> Result<(), WireError> {
    let envelope = announcement(outbox);
    debug!(peer = %outbox.peer_id(), no = envelope.no, sink = %sink.sink_id(), "Sending SelfRegister");
    sink.send(&envelope)
}

/// Announce ourselves to every parent, once per distinct endpoint.
///
/// Returns how many announcements were handed to a sink.
pub fn announce(outbox: &Outbox, parents: Vec<Arc<dyn PeerSink>>) -> usize {
    let mut sent = 0;
    for parent in dedup_sinks(parents) {
        match announce_to(outbox, parent.as_ref()) {
            Ok(()) => sent += 1,
            Err(e) => warn!(sink = %parent.sink_id(), error = %e, "SelfRegister to parent failed"),
        }
    }
    sent
}

/// Handle an inbound `SelfRegister` from `sender`, received on `source`.
pub fn on_self_register(
    outbox: &Outbox,
    registry: &PeerRegistry,
    sender: &PeerId,
    source: Arc<dyn PeerSink>,
) -> HandshakeOutcome {
    if sender == outbox.peer_id() {
        debug!(peer = %sender, "Ignoring own SelfRegister");
        return HandshakeOutcome::OwnIdentity;
    }
    if !registry.add_peer(PeerEntry::new(sender.clone(), Arc::clone(&source))) {
        debug!(peer = %sender, "SelfRegister from known peer ignored");
        return HandshakeOutcome::AlreadyKnown;
    }
    info!(peer = %sender, sink = %source.sink_id(), "Peer registered");
    HandshakeOutcome::Registered {
        ack: announce_to(outbox, source.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpeer_types::SessionId;
    use openpeer_wire::{Envelope, SinkId};
    use std::sync::Mutex;

    struct RecordingSink {
        id: SinkId,
        sent: Mutex<Vec<Envelope>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SinkId::next(),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl PeerSink for RecordingSink {
        fn sink_id(&self) -> SinkId {
            self.id
        }

        fn send(&self, envelope: &Envelope) -> Result<(), WireError> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    fn outbox() -> Outbox {
        Outbox::new(PeerId::from("me"), SessionId::default())
    }

    #[test]
    fn test_announce_dedups_parents() {
        let outbox = outbox();
        let parent = RecordingSink::new();
        let other = RecordingSink::new();
        let parents: Vec<Arc<dyn PeerSink>> = vec![parent.clone(), other.clone(), parent.clone()];

        assert_eq!(announce(&outbox, parents), 2);
        let sent = parent.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SELF_REGISTER);
        assert!(sent[0].internal);
        assert_eq!(sent[0].data, Value::String(String::new()));
        assert_eq!(other.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_new_peer_registered_and_acknowledged() {
        let outbox = outbox();
        let registry = PeerRegistry::new();
        let source = RecordingSink::new();

        let outcome = on_self_register(&outbox, &registry, &PeerId::from("child"), source.clone());
        assert!(matches!(outcome, HandshakeOutcome::Registered { ack: Ok(()) }));
        assert!(registry.contains(&PeerId::from("child")));

        let sent = source.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SELF_REGISTER);
        assert_eq!(sent[0].sender, PeerId::from("me"));
    }

    #[test]
    fn test_duplicate_self_register_ignored() {
        let outbox = outbox();
        let registry = PeerRegistry::new();
        let source = RecordingSink::new();

        on_self_register(&outbox, &registry, &PeerId::from("child"), source.clone());
        let outcome = on_self_register(&outbox, &registry, &PeerId::from("child"), source.clone());

        assert!(matches!(outcome, HandshakeOutcome::AlreadyKnown));
        assert_eq!(registry.count(), 1);
        assert_eq!(source.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_own_identity_not_registered() {
        let outbox = outbox();
        let registry = PeerRegistry::new();
        let source = RecordingSink::new();

        let outcome = on_self_register(&outbox, &registry, &PeerId::from("me"), source.clone());
        assert!(matches!(outcome, HandshakeOutcome::OwnIdentity));
        assert_eq!(registry.count(), 0);
        assert!(source.sent.lock().unwrap().is_empty());
    }
}

//! Peer registry: tracks registered peers and the sinks that reach them.
//!
//! Entries are added by the self-registration handshake and removed when a
//! send to the peer fails or the application forgets the peer. The local
//! channel never appears in its own registry.

use crate::envelope::Envelope;
use crate::error::WireError;
use crate::transport::PeerSink;
use chrono::{DateTime, Utc};
use openpeer_types::PeerId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An entry representing a single registered peer.
#[derive(Clone)]
pub struct PeerEntry {
    /// Self-asserted identity of the peer.
    pub peer_id: PeerId,
    /// Sink the peer's `SelfRegister` arrived on.
    pub sink: Arc<dyn PeerSink>,
    /// When the handshake registered the peer.
    pub registered_at: DateTime<Utc>,
}

impl PeerEntry {
    /// New entry stamped with the current time.
    pub fn new(peer_id: PeerId, sink: Arc<dyn PeerSink>) -> Self {
        Self {
            peer_id,
            sink,
            registered_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for PeerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEntry")
            .field("peer_id", &self.peer_id)
            .field("sink", &self.sink.sink_id())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Outcome of sending one envelope to every registered peer.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Peers the envelope was handed to.
    pub delivered: Vec<PeerId>,
    /// Peers whose sink refused the envelope.
    pub failed: Vec<(PeerId, WireError)>,
}

/// Registry of all known peers.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<PeerId, PeerEntry>>>,
}

impl PeerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer unless it is already known.
    ///
    /// Returns `true` if the entry was inserted. An existing entry keeps its
    /// original sink.
    pub fn add_peer(&self, entry: PeerEntry) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if peers.contains_key(&entry.peer_id) {
            return false;
        }
        peers.insert(entry.peer_id.clone(), entry);
        true
    }

    /// Remove a peer entirely.
    pub fn remove_peer(&self, peer_id: &PeerId) -> Option<PeerEntry> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.remove(peer_id)
    }

    /// Get a snapshot of a specific peer.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerEntry> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).cloned()
    }

    /// Whether the peer is registered.
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.contains_key(peer_id)
    }

    /// Identities of all registered peers, sorted.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<PeerId> = peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered peers.
    pub fn count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }

    /// Every registered peer with the sink that reaches it.
    ///
    /// Callers that must know exactly who an envelope went to take the
    /// snapshot once and pass it to [`PeerRegistry::send_each`].
    pub fn snapshot(&self) -> Vec<(PeerId, Arc<dyn PeerSink>)> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .map(|p| (p.peer_id.clone(), Arc::clone(&p.sink)))
            .collect()
    }

    /// Send an envelope to each peer of a snapshot.
    pub fn send_each(
        targets: &[(PeerId, Arc<dyn PeerSink>)],
        envelope: &Envelope,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (peer_id, sink) in targets {
            match sink.send(envelope) {
                Ok(()) => report.delivered.push(peer_id.clone()),
                Err(e) => report.failed.push((peer_id.clone(), e)),
            }
        }
        report
    }

    /// Send an envelope to every registered peer.
    ///
    /// Sinks are snapshotted first so no lock is held while sending.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        Self::send_each(&self.snapshot(), envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SinkId;
    use openpeer_types::SessionId;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Sink that records what it was asked to send.
    struct RecordingSink {
        id: SinkId,
        fail: bool,
        sent: Mutex<Vec<u64>>,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id: SinkId::next(),
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl PeerSink for RecordingSink {
        fn sink_id(&self) -> SinkId {
            self.id
        }

        fn send(&self, envelope: &Envelope) -> Result<(), WireError> {
            if self.fail {
                return Err(WireError::SinkClosed);
            }
            self.sent.lock().unwrap().push(envelope.no);
            Ok(())
        }
    }

    fn envelope(no: u64) -> Envelope {
        Envelope::new(
            PeerId::from("me"),
            no,
            SessionId::default(),
            "*",
            Value::Null,
            false,
        )
    }

    #[test]
    fn test_add_and_get_peer() {
        let registry = PeerRegistry::new();
        let sink = RecordingSink::new(false);
        assert!(registry.add_peer(PeerEntry::new(PeerId::from("node-1"), sink.clone())));

        let retrieved = registry.get_peer(&PeerId::from("node-1")).unwrap();
        assert_eq!(retrieved.peer_id, PeerId::from("node-1"));
        assert_eq!(retrieved.sink.sink_id(), sink.id);
        assert!(registry.contains(&PeerId::from("node-1")));
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = PeerRegistry::new();
        let first = RecordingSink::new(false);
        let second = RecordingSink::new(false);
        assert!(registry.add_peer(PeerEntry::new(PeerId::from("node-1"), first.clone())));
        assert!(!registry.add_peer(PeerEntry::new(PeerId::from("node-1"), second)));

        assert_eq!(registry.count(), 1);
        let entry = registry.get_peer(&PeerId::from("node-1")).unwrap();
        assert_eq!(entry.sink.sink_id(), first.id);
    }

    #[test]
    fn test_remove_peer() {
        let registry = PeerRegistry::new();
        registry.add_peer(PeerEntry::new(PeerId::from("node-1"), RecordingSink::new(false)));
        assert_eq!(registry.count(), 1);

        assert!(registry.remove_peer(&PeerId::from("node-1")).is_some());
        assert!(registry.remove_peer(&PeerId::from("node-1")).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_peer_ids_sorted() {
        let registry = PeerRegistry::new();
        for id in ["c", "a", "b"] {
            registry.add_peer(PeerEntry::new(PeerId::from(id), RecordingSink::new(false)));
        }
        let ids: Vec<String> = registry.peer_ids().iter().map(|p| p.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_send_each_ignores_later_registrations() {
        let registry = PeerRegistry::new();
        let early = RecordingSink::new(false);
        let late = RecordingSink::new(false);
        registry.add_peer(PeerEntry::new(PeerId::from("early"), early.clone()));

        let snapshot = registry.snapshot();
        registry.add_peer(PeerEntry::new(PeerId::from("late"), late.clone()));

        let report = PeerRegistry::send_each(&snapshot, &envelope(3));
        assert_eq!(report.delivered, vec![PeerId::from("early")]);
        assert_eq!(*early.sent.lock().unwrap(), vec![3]);
        assert!(late.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_reports_failures() {
        let registry = PeerRegistry::new();
        let good = RecordingSink::new(false);
        registry.add_peer(PeerEntry::new(PeerId::from("good"), good.clone()));
        registry.add_peer(PeerEntry::new(PeerId::from("bad"), RecordingSink::new(true)));

        let report = registry.broadcast(&envelope(7));
        assert_eq!(report.delivered, vec![PeerId::from("good")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PeerId::from("bad"));
        assert_eq!(*good.sent.lock().unwrap(), vec![7]);
        // Broadcasting never evicts on its own.
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_broadcast_empty_registry() {
        let report = PeerRegistry::new().broadcast(&envelope(1));
        assert!(report.delivered.is_empty());
        assert!(report.failed.is_empty());
    }
}

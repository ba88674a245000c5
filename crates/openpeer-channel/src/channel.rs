//! A channel is a peer that owns its registry and drives its transport.
//!
//! [`Channel::open`] attaches to a transport, spawns the inbound handler and
//! hand-shakes with the given parents. The handler processes one message at
//! a time: gate, classify, then handshake / RPC / event dispatch. The public
//! operations are synchronous and never hold a lock while user code runs.

use crate::context::{Namespace, ProcedureContext};
use crate::dispatch::{Listener, ListenerRegistry};
use crate::error::{CallError, ChannelError, ChannelResult, ProcedureError};
use crate::gate::{SessionGate, Verdict};
use crate::handshake::{self, HandshakeOutcome};
use crate::outbox::Outbox;
use crate::rpc::{PendingCall, PendingCalls, Settlement};
use openpeer_types::{ChannelConfig, PeerId, SessionId, DEFAULT_EVENT_TYPE};
use openpeer_wire::envelope::{REMOTE_CALL, REMOTE_CALL_RESULT};
use openpeer_wire::{
    CallRequest, Delivery, Envelope, Inbound, PeerRegistry, PeerSink, Transport, WireError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// State shared between the public handle and the inbound handler task.
struct Shared {
    config: ChannelConfig,
    outbox: Outbox,
    gate: SessionGate,
    registry: PeerRegistry,
    listeners: ListenerRegistry,
    context: ProcedureContext,
    calls: Arc<PendingCalls>,
    runtime: tokio::runtime::Handle,
    destroyed: AtomicBool,
}

impl Shared {
    fn peer_id(&self) -> &PeerId {
        self.outbox.peer_id()
    }

    /// Handle one inbound message to completion.
    fn handle_delivery(&self, delivery: Delivery) {
        if self.destroyed.load(Ordering::Acquire) {
            trace!(peer = %self.peer_id(), "Delivery after destroy dropped");
            return;
        }
        let envelope = match self.gate.check(delivery.message) {
            Verdict::Admit(envelope) => envelope,
            Verdict::Reject(reason) => {
                trace!(peer = %self.peer_id(), ?reason, "Inbound message dropped");
                return;
            }
        };

        match envelope.classify() {
            Inbound::SelfRegister => self.on_self_register(&envelope.sender, delivery.source),
            Inbound::RemoteCall(request) => self.on_remote_call(&envelope, request),
            Inbound::RemoteCallResult(outcome) => self.on_call_result(&envelope, outcome),
            Inbound::UnknownInternal(kind) => {
                debug!(sender = %envelope.sender, %kind, "Unknown internal envelope ignored");
            }
            Inbound::Malformed(reason) => {
                debug!(sender = %envelope.sender, %reason, "Malformed internal envelope ignored");
            }
            Inbound::Event { kind, data } => {
                let invoked = self.listeners.dispatch(&kind, &data);
                trace!(sender = %envelope.sender, %kind, invoked, "Event dispatched");
            }
        }
    }

    fn on_self_register(&self, sender: &PeerId, source: Arc<dyn PeerSink>) {
        let outcome = handshake::on_self_register(&self.outbox, &self.registry, sender, source);
        if let HandshakeOutcome::Registered { ack: Err(e) } = outcome {
            warn!(peer = %sender, error = %e, "SelfRegister acknowledgment failed");
            self.evict(sender);
        }
    }

    fn on_remote_call(&self, envelope: &Envelope, request: CallRequest) {
        let Some(peer) = self.registry.get_peer(&envelope.sender) else {
            debug!(sender = %envelope.sender, verb = %request.verb, "Call from unregistered peer dropped");
            return;
        };

        debug!(sender = %envelope.sender, no = envelope.no, verb = %request.verb, "Running remote call");
        let reply = match self.context.invoke(request) {
            Ok(value) => self
                .outbox
                .make_reply(envelope.no, value, REMOTE_CALL_RESULT, true, None),
            Err(e) => self.outbox.make_reply(
                envelope.no,
                Value::Null,
                REMOTE_CALL_RESULT,
                true,
                Some(e.to_string()),
            ),
        };

        if let Err(e) = peer.sink.send(&reply) {
            warn!(peer = %envelope.sender, no = envelope.no, error = %e, "Call result not delivered");
            self.evict(&envelope.sender);
        }
    }

    fn on_call_result(&self, envelope: &Envelope, outcome: Result<Value, String>) {
        match self.calls.settle(envelope.no, &envelope.sender, outcome) {
            Settlement::Settled => {
                debug!(sender = %envelope.sender, no = envelope.no, "Remote call settled");
            }
            Settlement::Unknown => {
                trace!(sender = %envelope.sender, no = envelope.no, "Result for no pending call");
            }
            Settlement::ForeignResponder => {
                debug!(sender = %envelope.sender, no = envelope.no, "Result from peer not called");
            }
        }
    }

    /// Send to every registered peer. Returns the peers that accepted it.
    fn send_all(&self, envelope: &Envelope) -> Vec<PeerId> {
        let report = self.registry.broadcast(envelope);
        self.evict_failed(envelope, &report.failed);
        report.delivered
    }

    fn evict_failed(&self, envelope: &Envelope, failed: &[(PeerId, WireError)]) {
        for (peer, e) in failed {
            warn!(peer = %peer, no = envelope.no, error = %e, "Send to peer failed");
            self.evict(peer);
        }
    }

    fn evict(&self, peer: &PeerId) {
        if !self.config.evict_on_send_failure {
            return;
        }
        if self.registry.remove_peer(peer).is_some() {
            info!(peer = %peer, "Peer evicted");
        }
    }
}

/// Inbound handler: one delivery at a time until shut down or the transport closes.
async fn run_inbound<T: Transport>(
    shared: Arc<Shared>,
    mut transport: T,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            delivery = transport.receive() => match delivery {
                Some(delivery) => shared.handle_delivery(delivery),
                None => {
                    debug!(peer = %shared.peer_id(), "Transport closed");
                    break;
                }
            },
        }
    }
    transport.destroy();
    debug!(peer = %shared.peer_id(), "Transport released");
}

/// A logical peer: publishes and receives events, calls and serves procedures.
pub struct Channel {
    shared: Arc<Shared>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Channel {
    /// Open a channel on `transport` and hand-shake with `parents`.
    ///
    /// Must be called from within a tokio runtime, which drives the inbound
    /// handler.
    pub fn open<T: Transport>(
        config: ChannelConfig,
        transport: T,
        parents: Vec<Arc<dyn PeerSink>>,
    ) -> ChannelResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        let peer_id = PeerId::generate();
        let session_id = config.session_id();
        let shared = Arc::new(Shared {
            outbox: Outbox::new(peer_id.clone(), session_id.clone()),
            gate: SessionGate::new(peer_id.clone(), session_id.clone()),
            registry: PeerRegistry::new(),
            listeners: ListenerRegistry::new(),
            context: ProcedureContext::new(),
            calls: Arc::new(PendingCalls::new()),
            runtime: runtime.clone(),
            destroyed: AtomicBool::new(false),
            config,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        runtime.spawn(run_inbound(Arc::clone(&shared), transport, shutdown_rx));
        info!(peer = %peer_id, session = %session_id, "Channel opened");

        let channel = Self {
            shared,
            shutdown: Mutex::new(Some(shutdown_tx)),
        };
        if !parents.is_empty() {
            handshake::announce(&channel.shared.outbox, parents);
        }
        Ok(channel)
    }

    /// Open a channel with the default configuration and no parents.
    pub fn create<T: Transport>(transport: T) -> ChannelResult<Self> {
        Self::open(ChannelConfig::default(), transport, Vec::new())
    }

    /// This channel's identity.
    pub fn peer_id(&self) -> &PeerId {
        self.shared.peer_id()
    }

    /// This channel's session.
    pub fn session_id(&self) -> &SessionId {
        self.shared.outbox.session_id()
    }

    /// The configuration the channel was opened with.
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Registered peers, sorted.
    pub fn peers(&self) -> Vec<PeerId> {
        self.shared.registry.peer_ids()
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.shared.registry.count()
    }

    /// Names remote peers may call.
    pub fn procedures(&self) -> Vec<String> {
        self.shared.context.names()
    }

    /// Number of listeners for an event type.
    pub fn listener_count(&self, kind: &str) -> usize {
        self.shared.listeners.count(kind)
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.calls.len()
    }

    /// Whether [`Channel::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Expose a procedure to remote callers under `name`.
    pub fn register<F>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(Vec<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    {
        self.shared.context.register(name, f);
        self
    }

    /// Expose a procedure over typed arguments. See [`crate::context::typed`].
    pub fn register_typed<A, R, F>(&self, name: impl Into<String>, f: F) -> &Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R, ProcedureError> + Send + Sync + 'static,
    {
        self.shared.context.register(name, crate::context::typed(f));
        self
    }

    /// Expose every procedure of a namespace.
    pub fn register_all(&self, namespace: Namespace) -> &Self {
        self.shared.context.register_namespace(namespace);
        self
    }

    /// Hand-shake with another parent after construction.
    pub fn connect(&self, sink: Arc<dyn PeerSink>) -> ChannelResult<()> {
        if self.is_destroyed() {
            return Err(ChannelError::Closed);
        }
        handshake::announce_to(&self.shared.outbox, sink.as_ref())?;
        Ok(())
    }

    /// Drop a peer from the registry. It re-registers on its next `SelfRegister`.
    pub fn forget_peer(&self, peer: &PeerId) -> bool {
        let removed = self.shared.registry.remove_peer(peer).is_some();
        if removed {
            info!(peer = %peer, "Peer forgotten");
        }
        removed
    }

    /// Publish an event to every registered peer.
    ///
    /// Returns the number of peers the event was handed to.
    pub fn push(&self, data: Value, kind: &str) -> usize {
        if self.is_destroyed() {
            warn!(peer = %self.peer_id(), %kind, "push on destroyed channel ignored");
            return 0;
        }
        let envelope = self.shared.outbox.make_request(data, kind, false);
        let delivered = self.shared.send_all(&envelope);
        trace!(no = envelope.no, %kind, peers = delivered.len(), "Event pushed");
        delivered.len()
    }

    /// Publish an event with the default type `"*"`.
    pub fn push_default(&self, data: Value) -> usize {
        self.push(data, DEFAULT_EVENT_TYPE)
    }

    /// Call `verb` on every registered peer; the first reply settles the call.
    pub fn call(&self, verb: &str, args: Vec<Value>) -> PendingCall {
        if self.is_destroyed() {
            warn!(peer = %self.peer_id(), %verb, "call on destroyed channel");
            return PendingCall::failed(CallError::Closed);
        }
        let request = CallRequest::new(verb, args);
        let data = match serde_json::to_value(&request) {
            Ok(data) => data,
            Err(e) => return PendingCall::failed(CallError::Remote(e.to_string())),
        };
        let envelope = self.shared.outbox.make_request(data, REMOTE_CALL, true);

        // One snapshot decides both who is sent the call and who may answer
        // it. The entry exists before the first send so an immediate reply
        // finds it.
        let snapshot = self.shared.registry.snapshot();
        let targets: HashSet<PeerId> = snapshot.iter().map(|(id, _)| id.clone()).collect();
        let call = {
            let _runtime = self.shared.runtime.enter();
            self.shared
                .calls
                .insert(envelope.no, targets, self.shared.config.call_timeout())
        };
        let report = PeerRegistry::send_each(&snapshot, &envelope);
        if !report.failed.is_empty() {
            let failed: Vec<PeerId> = report.failed.iter().map(|(id, _)| id.clone()).collect();
            self.shared.calls.exclude(envelope.no, &failed);
            self.shared.evict_failed(&envelope, &report.failed);
        }
        debug!(no = envelope.no, %verb, peers = report.delivered.len(), "Remote call sent");
        call
    }

    /// Subscribe to events of type `kind`.
    pub fn message(&self, kind: &str, listener: Listener) -> &Self {
        self.shared.listeners.add(kind, listener);
        self
    }

    /// Subscribe to events pushed with the default type `"*"`.
    pub fn message_default(&self, listener: Listener) -> &Self {
        self.message(DEFAULT_EVENT_TYPE, listener)
    }

    /// Unsubscribe.
    ///
    /// - `off(None, None)` removes every listener
    /// - `off(Some(kind), None)` removes every listener for `kind`
    /// - `off(Some(kind), Some(l))` removes only `l` from `kind`
    ///
    /// A listener without a type removes nothing.
    pub fn off(&self, kind: Option<&str>, listener: Option<&Listener>) -> &Self {
        match (kind, listener) {
            (None, _) => self.shared.listeners.clear(),
            (Some(kind), None) => self.shared.listeners.clear_kind(kind),
            (Some(kind), Some(listener)) => {
                self.shared.listeners.remove(kind, listener);
            }
        }
        self
    }

    /// Detach from the transport, drop all listeners and fail pending calls.
    ///
    /// Idempotent. Also runs when the channel is dropped.
    pub fn destroy(&self) {
        let shutdown = {
            let mut guard = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        let Some(shutdown) = shutdown else {
            return;
        };
        self.shared.destroyed.store(true, Ordering::Release);
        // The handler may already have stopped because the transport closed.
        let _ = shutdown.send(());
        self.shared.listeners.clear();
        let failed = self.shared.calls.fail_all(CallError::Closed);
        info!(peer = %self.peer_id(), failed_calls = failed, "Channel destroyed");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer_id", self.peer_id())
            .field("session_id", self.session_id())
            .field("peers", &self.peer_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpeer_wire::MemoryHub;

    #[test]
    fn test_open_requires_runtime() {
        let hub = MemoryHub::new();
        let err = Channel::create(hub.attach()).unwrap_err();
        assert!(matches!(err, ChannelError::NoRuntime));
    }

    #[tokio::test]
    async fn test_identity_and_session() {
        let hub = MemoryHub::new();
        let channel = Channel::open(ChannelConfig::with_id("room"), hub.attach(), vec![]).unwrap();
        assert_eq!(channel.peer_id().as_str().len(), 32);
        assert_eq!(channel.session_id().as_str(), "open-peer-channel:room");
        assert_eq!(channel.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let hub = MemoryHub::new();
        let channel = Channel::create(hub.attach()).unwrap();
        channel.message("x", crate::dispatch::listener(|_| {}));

        channel.destroy();
        channel.destroy();
        assert!(channel.is_destroyed());
        assert_eq!(channel.listener_count("x"), 0);
        assert_eq!(channel.push(Value::Null, "x"), 0);
        assert_eq!(channel.call("greet", vec![]).await, Err(CallError::Closed));
        assert!(matches!(
            channel.connect(hub.attach().sink_to(hub.attach().id())),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_call_without_peers_stays_pending() {
        let hub = MemoryHub::new();
        let channel = Channel::create(hub.attach()).unwrap();
        let mut call = tokio_test::task::spawn(channel.call("greet", vec![]));
        tokio_test::assert_pending!(call.poll());
        assert_eq!(channel.pending_calls(), 1);

        drop(call);
        assert_eq!(channel.pending_calls(), 0);
    }
}

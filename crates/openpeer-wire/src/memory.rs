//! In-process transport.
//!
//! A [`MemoryHub`] is a shared medium. Each [`MemoryTransport`] attached to
//! it is one endpoint with its own inbound queue. Envelopes travel as JSON
//! values, so everything crossing the hub is serialized just like on a real
//! message transport.

use crate::envelope::Envelope;
use crate::error::WireError;
use crate::transport::{Delivery, PeerSink, SinkId, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

type Endpoints = Arc<RwLock<HashMap<SinkId, mpsc::UnboundedSender<Delivery>>>>;

/// Shared medium connecting any number of endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    endpoints: Endpoints,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint.
    pub fn attach(&self) -> MemoryTransport {
        let id = SinkId::next();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        endpoints.insert(id, tx);
        MemoryTransport {
            id,
            rx,
            hub: self.clone(),
            attached: true,
        }
    }

    /// Sink that delivers to `to`, with replies routed back to `from`.
    pub fn sink(&self, from: SinkId, to: SinkId) -> Arc<dyn PeerSink> {
        Arc::new(MemorySink {
            hub: self.clone(),
            from,
            to,
        })
    }

    /// Deliver a raw value to one endpoint, bypassing envelope encoding.
    pub fn inject(&self, from: SinkId, to: SinkId, message: Value) -> Result<(), WireError> {
        self.deliver(from, to, message)
    }

    /// Deliver a raw value to every endpoint except `from`.
    pub fn broadcast(&self, from: SinkId, message: Value) -> usize {
        let targets: Vec<SinkId> = {
            let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
            endpoints.keys().copied().filter(|id| *id != from).collect()
        };
        targets
            .into_iter()
            .filter(|to| self.deliver(from, *to, message.clone()).is_ok())
            .count()
    }

    /// Number of attached endpoints.
    pub fn endpoint_count(&self) -> usize {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.len()
    }

    fn deliver(&self, from: SinkId, to: SinkId, message: Value) -> Result<(), WireError> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        let tx = endpoints.get(&to).ok_or(WireError::SinkClosed)?;
        let delivery = Delivery {
            message,
            source: self.sink(to, from),
        };
        tx.send(delivery).map_err(|_| WireError::SinkClosed)?;
        trace!(%from, %to, "hub: delivered");
        Ok(())
    }

    fn detach(&self, id: SinkId) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        endpoints.remove(&id);
    }
}

/// Sink from one hub endpoint to another.
struct MemorySink {
    hub: MemoryHub,
    from: SinkId,
    to: SinkId,
}

impl PeerSink for MemorySink {
    fn sink_id(&self) -> SinkId {
        self.to
    }

    fn send(&self, envelope: &Envelope) -> Result<(), WireError> {
        let message = envelope.to_value()?;
        self.hub.deliver(self.from, self.to, message)
    }
}

/// One endpoint attached to a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryTransport {
    id: SinkId,
    rx: mpsc::UnboundedReceiver<Delivery>,
    hub: MemoryHub,
    attached: bool,
}

impl MemoryTransport {
    /// Identity of this endpoint.
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Sink from this endpoint to another one, e.g. a parent to hand-shake with.
    pub fn sink_to(&self, to: SinkId) -> Arc<dyn PeerSink> {
        self.hub.sink(self.id, to)
    }

    /// The hub this endpoint is attached to.
    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&mut self) -> Option<Delivery> {
        if !self.attached {
            return None;
        }
        self.rx.recv().await
    }

    fn destroy(&mut self) {
        if self.attached {
            self.attached = false;
            self.hub.detach(self.id);
            self.rx.close();
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

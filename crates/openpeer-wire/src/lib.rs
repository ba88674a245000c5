//! Open Peer Channel wire protocol.
//!
//! Everything a channel needs to talk to other channels over a bare,
//! unordered message transport.
//!
//! ## Architecture
//!
//! - **Envelope**: the JSON record exchanged between peers
//! - **Inbound**: discriminated view of a validated envelope
//! - **PeerSink**: capability to deliver an envelope to one remote peer
//! - **Transport**: source of inbound deliveries, owned by one channel
//! - **PeerRegistry**: known peers and the sinks used to reach them
//! - **MemoryHub**: in-process transport used by tests and the demo CLI

pub mod envelope;
pub mod error;
pub mod memory;
pub mod registry;
pub mod transport;

pub use envelope::{CallRequest, Envelope, Inbound};
pub use error::WireError;
pub use memory::{MemoryHub, MemoryTransport};
pub use registry::{BroadcastReport, PeerEntry, PeerRegistry};
pub use transport::{Delivery, PeerSink, SinkId, Transport};

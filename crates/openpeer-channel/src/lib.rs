//! Open Peer Channel: peers over a bare message transport.
//!
//! A [`Channel`] turns an unordered, connectionless message transport into a
//! set of logical peers that can publish typed events to each other and call
//! each other's registered procedures.
//!
//! ## Architecture
//!
//! - **SessionGate**: admits only well-formed envelopes of our session
//! - **Handshake**: `SelfRegister` exchange that fills the peer registry
//! - **ListenerRegistry**: per-type event listeners
//! - **PendingCalls**: correlates call results with waiting callers
//! - **ProcedureContext**: names remote peers may call
//! - **Channel**: owns all of the above and the transport binding

pub mod channel;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handshake;
pub mod outbox;
pub mod rpc;

pub use channel::Channel;
pub use config::load_config;
pub use context::{typed, Namespace, ProcedureContext};
pub use dispatch::{listener, Listener};
pub use error::{CallError, ChannelError, ProcedureError};
pub use rpc::PendingCall;

pub use openpeer_types::{ChannelConfig, PeerId, SessionId};
pub use openpeer_wire::{MemoryHub, MemoryTransport, PeerSink, Transport};

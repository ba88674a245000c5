//! Core types for Open Peer Channel.
//!
//! Shared identifiers and configuration used by the wire layer and the
//! channel. This crate contains no protocol logic.

pub mod config;
pub mod ids;

pub use config::ChannelConfig;
pub use ids::{PeerId, SessionId};

/// Event type used when a caller does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "*";

//! Peer and session identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every session id.
pub const SESSION_PREFIX: &str = "open-peer-channel:";

/// Channel id used when none is configured.
pub const DEFAULT_CHANNEL_ID: &str = "*";

/// Identity of one channel instance: 32 lowercase hex characters.
///
/// Generated once at construction and never persisted. Doubles as the
/// sender tag on every envelope the channel emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session scope. Two channels interoperate iff their session ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Derive the session id for a configured channel id.
    pub fn for_channel(channel_id: &str) -> Self {
        Self(format!("{SESSION_PREFIX}{channel_id}"))
    }

    /// Borrow the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::for_channel(DEFAULT_CHANNEL_ID)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Channel configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use crate::ids::{SessionId, DEFAULT_CHANNEL_ID};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel id. Only channels sharing it can talk. Default: `"*"`.
    pub id: String,
    /// Give up on a remote call after this many milliseconds.
    /// Default: unset (a call waits until a reply arrives).
    pub call_timeout_ms: Option<u64>,
    /// Drop a peer from the registry when sending to it fails. Default: true.
    pub evict_on_send_failure: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_CHANNEL_ID.to_string(),
            call_timeout_ms: None,
            evict_on_send_failure: true,
        }
    }
}

impl ChannelConfig {
    /// Config with the given channel id and defaults elsewhere.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Session id derived from the channel id.
    pub fn session_id(&self) -> SessionId {
        SessionId::for_channel(&self.id)
    }

    /// Call timeout as a `Duration`, if configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

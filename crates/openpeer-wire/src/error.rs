//! Errors from the wire layer.

use thiserror::Error;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Sink closed")]
    SinkClosed,
    #[error("Malformed envelope: {0}")]
    Malformed(String),
}

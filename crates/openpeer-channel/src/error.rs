//! Channel error types.

use openpeer_wire::WireError;
use thiserror::Error;

/// Errors from channel construction and control operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A wire-level failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// `Channel::open` was called outside a tokio runtime.
    #[error("No tokio runtime available to drive the channel")]
    NoRuntime,

    /// The channel has been destroyed.
    #[error("Channel destroyed")]
    Closed,
}

/// Why a remote call did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The remote procedure failed. Carries its message text only.
    #[error("{0}")]
    Remote(String),

    /// No reply within the configured call timeout.
    #[error("Remote call timed out")]
    Timeout,

    /// The channel was destroyed before a reply arrived.
    #[error("Channel closed before the call settled")]
    Closed,
}

/// Failure of a locally executed procedure. Only the message crosses the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcedureError {
    /// No procedure is registered under this name.
    #[error("{0} is not defined")]
    NotDefined(String),

    /// The arguments could not be decoded.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The procedure itself failed.
    #[error("{0}")]
    Failed(String),
}

impl ProcedureError {
    /// Wrap any displayable error as a procedure failure.
    pub fn failed(e: impl std::fmt::Display) -> Self {
        Self::Failed(e.to_string())
    }
}

impl From<String> for ProcedureError {
    fn from(s: String) -> Self {
        Self::Failed(s)
    }
}

impl From<&str> for ProcedureError {
    fn from(s: &str) -> Self {
        Self::Failed(s.to_string())
    }
}

/// Alias for channel results.
pub type ChannelResult<T> = Result<T, ChannelError>;

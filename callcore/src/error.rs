//! Error types for the call session core

use callcore_proto::models::SfuError;
use thiserror::Error;

/// Where a cancellation originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The RPC transport itself reported the call as canceled
    Transport,
    /// The caller's cancellation token fired
    Caller,
}

/// Capture device failures, surfaced to the user as-is
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission to use the device was denied")]
    NotAllowed,

    #[error("Requested device not found: {0}")]
    NotFound(String),

    #[error("Device error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("RPC {method} failed: {message}")]
    Rpc {
        method: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("SFU error: {0}")]
    Server(SfuError),

    #[error("Canceled ({0:?})")]
    Cancelled(CancelSource),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether another attempt of the same RPC may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { retryable, .. } => *retryable,
            Self::Server(error) => error.should_retry,
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for call session operations
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the shortcut bridge.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShortcutError {
    /// The bridge to the host could not be reached. Never retried internally.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    /// The host declined the operation; `reason` is surfaced verbatim.
    #[error("Host rejected {command}: {reason}")]
    HostRejected { command: String, reason: String },
    #[error("Unexpected response to {command}: {reason}")]
    UnexpectedResponse { command: String, reason: String },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl ShortcutError {
    /// True for failures reported by the host rather than by the bridge itself
    pub fn is_host_rejection(&self) -> bool {
        matches!(self, ShortcutError::HostRejected { .. })
    }

    pub fn is_transport_unavailable(&self) -> bool {
        matches!(self, ShortcutError::TransportUnavailable(_))
    }
}

impl From<serde_json::Error> for ShortcutError {
    fn from(error: serde_json::Error) -> Self {
        ShortcutError::SerializationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for ShortcutError {
    fn from(error: config::ConfigError) -> Self {
        ShortcutError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShortcutError>;

//! Transport Layer Abstraction
//!
//! The command dispatch transport is an external collaborator: it takes one
//! named command with a JSON payload and resolves or rejects it exactly once.
//! This trait is the seam the invoker talks to, so the same invoker runs over
//! a socket ([`IpcTransport`](super::IpcTransport)) or an in-process host.

use async_trait::async_trait;
use serde_json::Value;

use super::command::Command;

/// Outcome of a failed command at the transport level
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The bridge itself could not carry the command
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// The host answered with a rejection reason
    #[error("Host rejected command: {0}")]
    Rejected(Value),
}

/// Carries one command to the host and returns its single result
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn invoke(&self, command: &Command) -> Result<Value, TransportError>;

    /// Transport name for logging
    fn transport_name(&self) -> &str {
        "unnamed_transport"
    }
}

//! # Command Invoker
//!
//! Sends one named command with a JSON payload to the host and returns its
//! single result or error. No retries and no ordering between concurrent
//! invocations beyond what the transport provides.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::command::{Command, CommandName};
use super::transport::{CommandTransport, TransportError};
use crate::error::{Result, ShortcutError};

pub struct CommandInvoker {
    transport: Arc<dyn CommandTransport>,
    plugin_identifier: String,
    stats: InvokerCounters,
}

#[derive(Default)]
struct InvokerCounters {
    invoked: AtomicU64,
    succeeded: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
}

/// Invoker statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerStats {
    pub invoked: u64,
    pub succeeded: u64,
    pub rejected: u64,
    pub unavailable: u64,
}

impl CommandInvoker {
    pub fn new(transport: Arc<dyn CommandTransport>, plugin_identifier: impl Into<String>) -> Self {
        Self {
            transport,
            plugin_identifier: plugin_identifier.into(),
            stats: InvokerCounters::default(),
        }
    }

    pub fn plugin_identifier(&self) -> &str {
        &self.plugin_identifier
    }

    /// Invoke a command and deserialize its result
    pub async fn invoke<R, P>(&self, name: CommandName, payload: &P) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        let command = Command::new(&self.plugin_identifier, name, payload);
        let value = self.send(&command).await?;

        serde_json::from_value(value).map_err(|e| ShortcutError::UnexpectedResponse {
            command: command.qualified_name.clone(),
            reason: e.to_string(),
        })
    }

    async fn send(&self, command: &Command) -> Result<Value> {
        self.stats.invoked.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        debug!(
            command = %command.qualified_name,
            command_id = %command.command_id,
            transport = self.transport.transport_name(),
            "📤 Invoking host command"
        );

        match self.transport.invoke(command).await {
            Ok(value) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    command = %command.qualified_name,
                    command_id = %command.command_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Host command resolved"
                );
                Ok(value)
            }
            Err(TransportError::Rejected(reason)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                let reason = rejection_reason(&reason);
                error!(
                    command = %command.qualified_name,
                    command_id = %command.command_id,
                    reason = %reason,
                    "❌ Host rejected command"
                );
                Err(ShortcutError::HostRejected {
                    command: command.qualified_name.clone(),
                    reason,
                })
            }
            Err(TransportError::Unavailable(reason)) => {
                self.stats.unavailable.fetch_add(1, Ordering::Relaxed);
                error!(
                    command = %command.qualified_name,
                    command_id = %command.command_id,
                    reason = %reason,
                    "❌ Transport unavailable"
                );
                Err(ShortcutError::TransportUnavailable(reason))
            }
        }
    }

    pub fn stats(&self) -> InvokerStats {
        InvokerStats {
            invoked: self.stats.invoked.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            unavailable: self.stats.unavailable.load(Ordering::Relaxed),
        }
    }
}

/// Host reasons are usually strings; anything else is kept as JSON text
fn rejection_reason(reason: &Value) -> String {
    match reason {
        Value::String(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Transport returning a canned outcome and recording what it was sent
    struct ScriptedTransport {
        outcome: std::result::Result<Value, TransportError>,
        sent: Mutex<Vec<Command>>,
    }

    impl ScriptedTransport {
        fn new(outcome: std::result::Result<Value, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandTransport for ScriptedTransport {
        async fn invoke(&self, command: &Command) -> std::result::Result<Value, TransportError> {
            self.sent.lock().push(command.clone());
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn test_invoke_sends_qualified_command_once() {
        let transport = ScriptedTransport::new(Ok(json!(true)));
        let invoker = CommandInvoker::new(transport.clone(), "globalShortcut");

        let registered: bool = invoker
            .invoke(CommandName::IsRegistered, &json!({"shortcut": "Ctrl+P"}))
            .await
            .unwrap();

        assert!(registered);
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].qualified_name, "plugin:globalShortcut|is_registered");
        assert_eq!(sent[0].payload, json!({"shortcut": "Ctrl+P"}));
    }

    #[tokio::test]
    async fn test_void_result_accepts_null() {
        let invoker = CommandInvoker::new(ScriptedTransport::new(Ok(Value::Null)), "globalShortcut");
        let result: Result<()> = invoker.invoke(CommandName::UnregisterAll, &json!({})).await;
        tokio_test::assert_ok!(result);
        assert_eq!(invoker.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced_verbatim() {
        let transport = ScriptedTransport::new(Err(TransportError::Rejected(json!(
            "shortcut already registered"
        ))));
        let invoker = CommandInvoker::new(transport.clone(), "globalShortcut");

        let err = invoker
            .invoke::<(), _>(CommandName::Register, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ShortcutError::HostRejected {
                command: "plugin:globalShortcut|register".to_string(),
                reason: "shortcut already registered".to_string(),
            }
        );
        // No retry
        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(invoker.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_structured_rejection_reason_kept_as_json() {
        let transport = ScriptedTransport::new(Err(TransportError::Rejected(json!({
            "code": "unsupported"
        }))));
        let invoker = CommandInvoker::new(transport, "globalShortcut");

        match invoker.invoke::<(), _>(CommandName::Register, &json!({})).await {
            Err(ShortcutError::HostRejected { reason, .. }) => {
                assert_eq!(reason, r#"{"code":"unsupported"}"#)
            }
            other => panic!("Expected HostRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_transport() {
        let transport =
            ScriptedTransport::new(Err(TransportError::Unavailable("bridge down".to_string())));
        let invoker = CommandInvoker::new(transport, "globalShortcut");

        let err = invoker
            .invoke::<(), _>(CommandName::UnregisterAll, &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_transport_unavailable());
        assert_eq!(invoker.stats().unavailable, 1);
    }

    #[tokio::test]
    async fn test_unexpected_result_type() {
        let invoker = CommandInvoker::new(ScriptedTransport::new(Ok(json!("yes"))), "globalShortcut");
        let err = invoker
            .invoke::<bool, _>(CommandName::IsRegistered, &json!({"shortcut": "Ctrl+P"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortcutError::UnexpectedResponse { .. }));
    }
}

//! # IPC Transport
//!
//! Newline-delimited JSON over a persistent TCP connection to the host.
//!
//! One connection carries both directions of the bridge:
//!
//! - requests written by [`IpcTransport::invoke`], each with a fresh numeric id
//! - responses resolving exactly one pending request by id
//! - host pushes addressed to a callback channel, handed to the
//!   [`CallbackChannel`] the transport was connected with
//!
//! A background reader task owns the read half. When the connection closes,
//! every pending request fails with [`TransportError::Unavailable`] and so does
//! every later invocation.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use super::command::{ClientFrame, Command, HostFrame};
use super::transport::{CommandTransport, TransportError};
use crate::config::IpcConfig;
use crate::error::{Result, ShortcutError};
use crate::registry::CallbackChannel;

type PendingResponse = oneshot::Sender<std::result::Result<Value, TransportError>>;
type PendingMap = Arc<Mutex<HashMap<u64, PendingResponse>>>;

pub struct IpcTransport {
    peer_address: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    request_timeout: Option<Duration>,
    reader_task: JoinHandle<()>,
}

impl IpcTransport {
    /// Connect to the host and start routing its pushes into `events`
    pub async fn connect(config: &IpcConfig, events: Arc<dyn CallbackChannel>) -> Result<Self> {
        let address = config.address();
        info!("🔗 IPC transport: Connecting to {}", address);

        let stream = match timeout(config.connect_timeout(), TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("❌ IPC transport: Connection failed to {} - {}", address, e);
                return Err(ShortcutError::TransportUnavailable(format!(
                    "Connection to {address} failed: {e}"
                )));
            }
            Err(_) => {
                error!("⏰ IPC transport: Connection timeout to {}", address);
                return Err(ShortcutError::TransportUnavailable(format!(
                    "Connection to {address} timed out after {}ms",
                    config.connect_timeout_ms
                )));
            }
        };

        // Frames are small and latency matters more than throughput
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", address, e);
        }

        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_task = tokio::spawn(read_host_frames(
            read_half,
            pending.clone(),
            connected.clone(),
            events,
        ));

        info!("✅ IPC transport: Connected to {}", address);

        Ok(Self {
            peer_address: address,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            connected,
            next_request_id: AtomicU64::new(1),
            request_timeout: config.request_timeout(),
            reader_task,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Requests written but not yet resolved
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn peer_address(&self) -> &str {
        &self.peer_address
    }

    async fn write_frame(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl CommandTransport for IpcTransport {
    async fn invoke(&self, command: &Command) -> std::result::Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable(format!(
                "Not connected to {}",
                self.peer_address
            )));
        }

        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let frame = ClientFrame::Request {
            id,
            cmd: command.qualified_name.clone(),
            payload: command.payload.clone(),
        };
        let mut line = serde_json::to_string(&frame)
            .map_err(|e| TransportError::Unavailable(format!("Serialization failed: {e}")))?;
        line.push('\n');

        // Registered before writing so an immediate response always finds its slot
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(id, sender);

        // The reader marks the connection closed before draining; re-checking
        // here means a slot inserted after that drain is never left hanging
        if !self.is_connected() {
            self.pending.lock().remove(&id);
            return Err(TransportError::Unavailable(format!(
                "Connection to {} closed",
                self.peer_address
            )));
        }

        debug!(
            "📤 Sending request {} ({}) for command {}",
            id, command.qualified_name, command.command_id
        );

        if let Err(e) = self.write_frame(&line).await {
            self.pending.lock().remove(&id);
            error!("❌ Request {}: Send failed - {}", id, e);
            return Err(TransportError::Unavailable(format!("Send failed: {e}")));
        }

        let response = match self.request_timeout {
            Some(limit) => match timeout(limit, receiver).await {
                Ok(response) => response,
                Err(_) => {
                    self.pending.lock().remove(&id);
                    error!(
                        "⏰ Request {} timed out after {}ms",
                        id,
                        limit.as_millis()
                    );
                    return Err(TransportError::Unavailable(format!(
                        "Command {} timed out after {}ms",
                        command.qualified_name,
                        limit.as_millis()
                    )));
                }
            },
            None => receiver.await,
        };

        response.unwrap_or_else(|_| {
            Err(TransportError::Unavailable(
                "Connection closed before response".to_string(),
            ))
        })
    }

    fn transport_name(&self) -> &str {
        "ipc"
    }
}

async fn read_host_frames(
    read_half: OwnedReadHalf,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    events: Arc<dyn CallbackChannel>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_host_frame(&line, &pending, events.as_ref()),
            Ok(None) => {
                info!("🔌 IPC transport: Host closed the connection");
                break;
            }
            Err(e) => {
                warn!("IPC transport: Read failed - {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);

    let drained: Vec<PendingResponse> = pending.lock().drain().map(|(_, sender)| sender).collect();
    if !drained.is_empty() {
        warn!(
            "Failing {} pending request(s) after connection loss",
            drained.len()
        );
    }
    for sender in drained {
        let _ = sender.send(Err(TransportError::Unavailable(
            "Connection closed before response".to_string(),
        )));
    }
}

fn handle_host_frame(line: &str, pending: &PendingMap, events: &dyn CallbackChannel) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<HostFrame>(line) {
        Ok(HostFrame::Response { id, ok, error }) => {
            let result = match error {
                Some(reason) => Err(TransportError::Rejected(reason)),
                None => Ok(ok.unwrap_or(Value::Null)),
            };

            let sender = pending.lock().remove(&id);
            match sender {
                Some(sender) => {
                    debug!("📥 Response for request {}", id);
                    // The caller may have timed out and gone away
                    let _ = sender.send(result);
                }
                None => warn!("Ignoring response for unknown request {}", id),
            }
        }
        Ok(HostFrame::Event { channel, payload }) => {
            debug!(channel = %channel, "📨 Host push received");
            events.dispatch(&channel, payload);
        }
        Err(e) => warn!("Ignoring malformed host frame: {} ({})", e, line),
    }
}

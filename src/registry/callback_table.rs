//! # Legacy Callback Table
//!
//! Generation B of the callback channel. Handlers live in one shared table keyed
//! by numeric tokens; the host pushes every notification through a single
//! dispatch entry point carrying the token.
//!
//! The table is the only shared mutable state of the bridge:
//!
//! - tokens come from a monotonic atomic counter and are never handed out twice
//! - a handler stays reachable at its token until it is explicitly removed
//! - notifications flow through one FIFO pump task, so a token's notifications
//!   reach its handler in the order the host emitted them
//!
//! The handler is looked up when the pump reaches a notification, not when it is
//! queued, so a token removed in between drops the notification silently.

use super::channel::{
    invoke_handler, triggered_descriptor, CallbackChannel, CallbackToken, ChannelRef,
    TransportGeneration,
};
use crate::error::{Result, ShortcutError};
use crate::shortcut::ShortcutHandler;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type CallbackMap = Arc<Mutex<HashMap<CallbackToken, ShortcutHandler>>>;

/// Process-wide token → handler table
pub struct CallbackTable {
    next_token: AtomicU64,
    callbacks: CallbackMap,
    /// Sender side of the shared dispatch pump, started on first attach
    pump: OnceLock<mpsc::UnboundedSender<(CallbackToken, String)>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            pump: OnceLock::new(),
        }
    }

    fn allocate_token(&self) -> CallbackToken {
        CallbackToken(self.next_token.fetch_add(1, Ordering::SeqCst))
    }

    /// Tokens currently holding a handler
    pub fn tokens(&self) -> Vec<CallbackToken> {
        let mut tokens: Vec<_> = self.callbacks.lock().keys().copied().collect();
        tokens.sort();
        tokens
    }

    fn ensure_pump(&self, runtime: &Handle) {
        if self.pump.get().is_some() {
            return;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        // Losing a concurrent race drops `sender`, which ends the spare pump at once
        if self.pump.set(sender).is_ok() {
            runtime.spawn(run_dispatch_pump(self.callbacks.clone(), receiver));
            debug!("Started legacy callback dispatch pump");
        }
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_dispatch_pump(
    callbacks: CallbackMap,
    mut receiver: mpsc::UnboundedReceiver<(CallbackToken, String)>,
) {
    while let Some((token, shortcut)) = receiver.recv().await {
        let channel = ChannelRef::Legacy(token);
        // Release the lock before running user code
        let handler = callbacks.lock().get(&token).cloned();
        match handler {
            Some(handler) => invoke_handler(&handler, &channel, &shortcut),
            None => {
                debug!(channel = %channel, shortcut = %shortcut, "Dropping notification for removed token")
            }
        }
    }
    debug!("Legacy callback dispatch pump finished");
}

impl CallbackChannel for CallbackTable {
    fn generation(&self) -> TransportGeneration {
        TransportGeneration::Legacy
    }

    fn attach(&self, handler: ShortcutHandler) -> Result<ChannelRef> {
        let runtime = Handle::try_current().map_err(|e| {
            ShortcutError::RuntimeError(format!("Cannot attach callback outside a tokio runtime: {e}"))
        })?;
        self.ensure_pump(&runtime);

        let token = self.allocate_token();
        let previous = self.callbacks.lock().insert(token, handler);
        assert!(
            previous.is_none(),
            "callback token {token:?} allocated twice"
        );

        let channel = ChannelRef::Legacy(token);
        info!(channel = %channel, "Stored callback in legacy table");
        Ok(channel)
    }

    fn detach(&self, channel: &ChannelRef) -> bool {
        let ChannelRef::Legacy(token) = channel else {
            warn!(channel = %channel, "Cannot detach structured channel from legacy table");
            return false;
        };

        let removed = self.callbacks.lock().remove(token).is_some();
        if removed {
            info!(channel = %channel, "Cleared callback from legacy table");
        } else {
            debug!(channel = %channel, "Callback already cleared");
        }
        removed
    }

    fn dispatch(&self, channel: &ChannelRef, payload: Value) {
        let ChannelRef::Legacy(token) = channel else {
            warn!(channel = %channel, "Dropping host notification addressed to a structured channel");
            return;
        };

        let Some(shortcut) = triggered_descriptor(&payload) else {
            warn!(channel = %channel, %payload, "Dropping malformed host notification");
            return;
        };

        if !self.callbacks.lock().contains_key(token) {
            debug!(channel = %channel, shortcut = %shortcut, "Dropping notification for unknown token");
            return;
        }

        match self.pump.get() {
            Some(pump) => {
                if pump.send((*token, shortcut)).is_err() {
                    debug!(channel = %channel, "Dispatch pump gone; notification dropped");
                }
            }
            None => debug!(channel = %channel, "Dispatch pump not running; notification dropped"),
        }
    }

    fn is_attached(&self, channel: &ChannelRef) -> bool {
        match channel {
            ChannelRef::Legacy(token) => self.callbacks.lock().contains_key(token),
            ChannelRef::Structured(_) => false,
        }
    }

    fn attached_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

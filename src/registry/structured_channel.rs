//! # Structured Channels
//!
//! Generation A of the callback channel: every attached handler gets its own
//! inbox (an unbounded mpsc queue) drained by a dedicated consumer task on the
//! caller's runtime. One consumer per identity is what keeps host emission
//! order; separate identities are drained independently.

use super::channel::{
    invoke_handler, triggered_descriptor, CallbackChannel, ChannelId, ChannelRef,
    TransportGeneration,
};
use crate::error::{Result, ShortcutError};
use crate::shortcut::ShortcutHandler;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Live inbox for one channel identity
struct Inbox {
    sender: mpsc::UnboundedSender<String>,
    /// Cleared on detach so queued but undelivered messages are dropped
    open: Arc<AtomicBool>,
}

/// Registry of structured channel inboxes keyed by identity
pub struct StructuredChannels {
    next_id: AtomicU64,
    inboxes: DashMap<ChannelId, Inbox>,
}

impl StructuredChannels {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inboxes: DashMap::new(),
        }
    }

    fn allocate_id(&self) -> ChannelId {
        ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Identities currently attached
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.inboxes.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for StructuredChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain one inbox, in order, until the sender is gone or the inbox is closed
async fn consume_inbox(
    channel: ChannelRef,
    handler: ShortcutHandler,
    open: Arc<AtomicBool>,
    mut receiver: mpsc::UnboundedReceiver<String>,
) {
    while let Some(shortcut) = receiver.recv().await {
        if !open.load(Ordering::Acquire) {
            debug!(channel = %channel, shortcut = %shortcut, "Dropping message for closed channel");
            break;
        }
        invoke_handler(&handler, &channel, &shortcut);
    }
    debug!(channel = %channel, "Channel consumer finished");
}

impl CallbackChannel for StructuredChannels {
    fn generation(&self) -> TransportGeneration {
        TransportGeneration::Structured
    }

    fn attach(&self, handler: ShortcutHandler) -> Result<ChannelRef> {
        let runtime = Handle::try_current().map_err(|e| {
            ShortcutError::RuntimeError(format!("Cannot attach channel outside a tokio runtime: {e}"))
        })?;

        let id = self.allocate_id();
        let channel = ChannelRef::Structured(id);
        let (sender, receiver) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let previous = self.inboxes.insert(
            id,
            Inbox {
                sender,
                open: open.clone(),
            },
        );
        assert!(
            previous.is_none(),
            "structured channel identity {id:?} allocated twice"
        );

        runtime.spawn(consume_inbox(channel, handler, open, receiver));

        info!(channel = %channel, "Attached structured channel");
        Ok(channel)
    }

    fn detach(&self, channel: &ChannelRef) -> bool {
        let ChannelRef::Structured(id) = channel else {
            warn!(channel = %channel, "Cannot detach legacy token from structured channels");
            return false;
        };

        match self.inboxes.remove(id) {
            Some((_, inbox)) => {
                inbox.open.store(false, Ordering::Release);
                info!(channel = %channel, "Detached structured channel");
                true
            }
            None => {
                debug!(channel = %channel, "Channel already detached");
                false
            }
        }
    }

    fn dispatch(&self, channel: &ChannelRef, payload: Value) {
        let ChannelRef::Structured(id) = channel else {
            warn!(channel = %channel, "Dropping host message addressed to a legacy token");
            return;
        };

        let Some(shortcut) = triggered_descriptor(&payload) else {
            warn!(channel = %channel, %payload, "Dropping malformed host message");
            return;
        };

        match self.inboxes.get(id) {
            Some(inbox) => {
                if inbox.sender.send(shortcut).is_err() {
                    debug!(channel = %channel, "Channel consumer gone; message dropped");
                }
            }
            None => {
                debug!(channel = %channel, shortcut = %shortcut, "Dropping message for detached channel");
            }
        }
    }

    fn is_attached(&self, channel: &ChannelRef) -> bool {
        match channel {
            ChannelRef::Structured(id) => self.inboxes.contains_key(id),
            ChannelRef::Legacy(_) => false,
        }
    }

    fn attached_count(&self) -> usize {
        self.inboxes.len()
    }
}

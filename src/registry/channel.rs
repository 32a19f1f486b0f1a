//! # Callback Channel Contract
//!
//! A callback channel is a host-addressable inbox: a handler is attached under a
//! process-unique identity, the identity travels to the host inside a command
//! payload, and every message the host later pushes to that identity is handed
//! to that handler and no other.
//!
//! Two generations implement the contract:
//!
//! - [`StructuredChannels`](super::StructuredChannels): one inbox and one
//!   consumer task per identity, referenced on the wire as `"__CHANNEL__:<id>"`.
//! - [`CallbackTable`](super::CallbackTable): the legacy shared token table with a
//!   single dispatch entry point, referenced on the wire by a bare number.
//!
//! Both deliver on the caller's tokio runtime, keep host emission order per
//! identity, and drop pushes addressed to a detached identity without error.

use crate::constants::CHANNEL_REF_PREFIX;
use crate::error::Result;
use crate::shortcut::ShortcutHandler;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use super::{CallbackTable, StructuredChannels};

/// Which callback channel generation is handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportGeneration {
    /// Per-identity structured channels
    Structured,
    /// Process-wide numeric callback table
    Legacy,
}

impl Default for TransportGeneration {
    fn default() -> Self {
        if cfg!(feature = "legacy-callback-table") {
            TransportGeneration::Legacy
        } else {
            TransportGeneration::Structured
        }
    }
}

impl fmt::Display for TransportGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportGeneration::Structured => f.write_str("structured"),
            TransportGeneration::Legacy => f.write_str("legacy"),
        }
    }
}

/// Identity of a structured channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// Slot in the legacy callback table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(pub u64);

/// Reference to a callback channel as carried in command payloads and host pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRef {
    Structured(ChannelId),
    Legacy(CallbackToken),
}

impl ChannelRef {
    pub fn generation(&self) -> TransportGeneration {
        match self {
            ChannelRef::Structured(_) => TransportGeneration::Structured,
            ChannelRef::Legacy(_) => TransportGeneration::Legacy,
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Structured(ChannelId(id)) => write!(f, "{CHANNEL_REF_PREFIX}{id}"),
            ChannelRef::Legacy(CallbackToken(token)) => write!(f, "{token}"),
        }
    }
}

impl Serialize for ChannelRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ChannelRef::Structured(_) => serializer.collect_str(self),
            ChannelRef::Legacy(CallbackToken(token)) => serializer.serialize_u64(*token),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireRef {
            Token(u64),
            Channel(String),
        }

        match WireRef::deserialize(deserializer)? {
            WireRef::Token(token) => Ok(ChannelRef::Legacy(CallbackToken(token))),
            WireRef::Channel(raw) => raw
                .strip_prefix(CHANNEL_REF_PREFIX)
                .and_then(|id| id.parse::<u64>().ok())
                .map(|id| ChannelRef::Structured(ChannelId(id)))
                .ok_or_else(|| D::Error::custom(format!("invalid channel reference '{raw}'"))),
        }
    }
}

/// Host-facing inbox contract shared by both generations
pub trait CallbackChannel: Send + Sync {
    fn generation(&self) -> TransportGeneration;

    /// Attach a handler under a fresh identity. Identities are never reused
    /// while attached.
    fn attach(&self, handler: ShortcutHandler) -> Result<ChannelRef>;

    /// Detach the handler; later pushes to this identity are dropped.
    /// Returns whether anything was attached.
    fn detach(&self, channel: &ChannelRef) -> bool;

    /// Host entry point: route one pushed message to the attached handler.
    /// Never fails; unknown or detached identities are ignored.
    fn dispatch(&self, channel: &ChannelRef, payload: Value);

    fn is_attached(&self, channel: &ChannelRef) -> bool;

    fn attached_count(&self) -> usize;
}

/// Create the callback channel implementation for a generation
pub fn create_callback_channel(generation: TransportGeneration) -> Arc<dyn CallbackChannel> {
    match generation {
        TransportGeneration::Structured => Arc::new(StructuredChannels::new()),
        TransportGeneration::Legacy => Arc::new(CallbackTable::new()),
    }
}

/// Extract the triggered descriptor from a host push.
///
/// Accepts the bare descriptor string or an object carrying it under
/// `"shortcut"`.
pub fn triggered_descriptor(payload: &Value) -> Option<String> {
    match payload {
        Value::String(shortcut) => Some(shortcut.clone()),
        Value::Object(map) => map
            .get("shortcut")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Run a handler, containing a panic so one faulty handler cannot stop delivery
pub(crate) fn invoke_handler(handler: &ShortcutHandler, channel: &ChannelRef, shortcut: &str) {
    if catch_unwind(AssertUnwindSafe(|| handler(shortcut))).is_err() {
        error!(
            channel = %channel,
            shortcut = %shortcut,
            "Shortcut handler panicked; continuing delivery"
        );
    }
}

//! # In-Memory Host
//!
//! A host that lives in this process, for tests and local development. It keeps
//! its own table of registered descriptors, answers the command vocabulary the
//! way the real host does and pushes triggers into the callback channel the
//! bridge was built with.
//!
//! ```rust
//! use global_shortcut::testing::InMemoryHost;
//! use global_shortcut::{create_callback_channel, BridgeConfig, GlobalShortcut};
//! use std::sync::Arc;
//!
//! # async fn example() -> global_shortcut::Result<()> {
//! let config = BridgeConfig::default();
//! let channels = create_callback_channel(config.generation);
//! let host = Arc::new(InMemoryHost::new(&config.plugin_identifier, channels.clone()));
//! let shortcuts = GlobalShortcut::new(&config, host.clone(), channels);
//!
//! shortcuts.register("Ctrl+K", |shortcut| println!("{shortcut}")).await?;
//! host.trigger("Ctrl+K");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::constants::split_qualified_command;
use crate::execution::{
    Command, CommandName, CommandTransport, RegisterAllPayload, RegisterPayload, ShortcutPayload,
    TransportError,
};
use crate::registry::{CallbackChannel, ChannelRef};
use crate::shortcut::ShortcutDescriptor;

type HostResult = std::result::Result<Value, TransportError>;

/// In-process host implementing the host side of the command vocabulary
pub struct InMemoryHost {
    plugin_identifier: String,
    channels: Arc<dyn CallbackChannel>,
    state: Mutex<HostState>,
}

#[derive(Default)]
struct HostState {
    /// `None` marks a registration made outside this bridge
    registered: BTreeMap<ShortcutDescriptor, Option<ChannelRef>>,
    refused: HashSet<ShortcutDescriptor>,
    unavailable: bool,
    fail_next_unregister: bool,
    received: Vec<Command>,
}

impl InMemoryHost {
    pub fn new(plugin_identifier: impl Into<String>, channels: Arc<dyn CallbackChannel>) -> Self {
        Self {
            plugin_identifier: plugin_identifier.into(),
            channels,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Make every later command fail as if the bridge were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Refuse to bind this descriptor, as a platform that cannot hook it would
    pub fn refuse_shortcut(&self, shortcut: impl Into<ShortcutDescriptor>) {
        self.state.lock().refused.insert(shortcut.into());
    }

    /// Reject the next `unregister` or `unregister_all`
    pub fn fail_next_unregister(&self) {
        self.state.lock().fail_next_unregister = true;
    }

    /// Change host state behind the bridge's back
    pub fn register_externally(&self, shortcut: impl Into<ShortcutDescriptor>) {
        self.state.lock().registered.insert(shortcut.into(), None);
    }

    pub fn unregister_externally(&self, shortcut: impl Into<ShortcutDescriptor>) {
        self.state.lock().registered.remove(&shortcut.into());
    }

    pub fn is_registered(&self, shortcut: impl Into<ShortcutDescriptor>) -> bool {
        self.state.lock().registered.contains_key(&shortcut.into())
    }

    /// Channel the host would push triggers for this descriptor to
    pub fn channel_for(&self, shortcut: impl Into<ShortcutDescriptor>) -> Option<ChannelRef> {
        self.state
            .lock()
            .registered
            .get(&shortcut.into())
            .copied()
            .flatten()
    }

    pub fn registered_shortcuts(&self) -> Vec<ShortcutDescriptor> {
        self.state.lock().registered.keys().cloned().collect()
    }

    /// Simulate a physical key press. Returns whether a push was emitted.
    pub fn trigger(&self, shortcut: impl Into<ShortcutDescriptor>) -> bool {
        let shortcut = shortcut.into();
        match self.channel_for(shortcut.clone()) {
            Some(channel) => {
                self.push(&channel, Value::String(shortcut.into_inner()));
                true
            }
            None => false,
        }
    }

    /// Push an arbitrary message to a channel identity, live or not
    pub fn push(&self, channel: &ChannelRef, payload: Value) {
        debug!(channel = %channel, "In-memory host push");
        self.channels.dispatch(channel, payload);
    }

    /// Every command received so far, in arrival order
    pub fn received_commands(&self) -> Vec<Command> {
        self.state.lock().received.clone()
    }

    fn handle(&self, command: &Command) -> HostResult {
        match split_qualified_command(&command.qualified_name) {
            Some((plugin, _)) if plugin == self.plugin_identifier => {}
            _ => {
                return Err(rejection(format!(
                    "Unknown command {}",
                    command.qualified_name
                )))
            }
        }

        let mut state = self.state.lock();
        match command.name {
            CommandName::Register => {
                let payload: RegisterPayload = parse_payload(command)?;
                state.check_bindable(&payload.shortcut)?;
                state
                    .registered
                    .insert(payload.shortcut, Some(payload.handler));
                Ok(Value::Null)
            }
            CommandName::RegisterAll => {
                let payload: RegisterAllPayload = parse_payload(command)?;
                // All or nothing
                for shortcut in &payload.shortcuts {
                    state.check_bindable(shortcut)?;
                }
                for shortcut in payload.shortcuts {
                    state.registered.insert(shortcut, Some(payload.handler));
                }
                Ok(Value::Null)
            }
            CommandName::IsRegistered => {
                let payload: ShortcutPayload = parse_payload(command)?;
                Ok(Value::Bool(state.registered.contains_key(&payload.shortcut)))
            }
            CommandName::Unregister => {
                let payload: ShortcutPayload = parse_payload(command)?;
                state.take_unregister_failure()?;
                state.registered.remove(&payload.shortcut);
                Ok(Value::Null)
            }
            CommandName::UnregisterAll => {
                state.take_unregister_failure()?;
                state.registered.clear();
                Ok(Value::Null)
            }
        }
    }
}

impl HostState {
    fn check_bindable(&self, shortcut: &ShortcutDescriptor) -> std::result::Result<(), TransportError> {
        if self.refused.contains(shortcut) {
            return Err(rejection(format!(
                "Failed to register shortcut {shortcut}: not supported on this platform"
            )));
        }
        if self.registered.contains_key(shortcut) {
            return Err(rejection(format!("Shortcut {shortcut} is already registered")));
        }
        Ok(())
    }

    fn take_unregister_failure(&mut self) -> std::result::Result<(), TransportError> {
        if std::mem::take(&mut self.fail_next_unregister) {
            return Err(rejection("Failed to release shortcut".to_string()));
        }
        Ok(())
    }
}

fn rejection(reason: String) -> TransportError {
    TransportError::Rejected(Value::String(reason))
}

fn parse_payload<T: DeserializeOwned>(command: &Command) -> std::result::Result<T, TransportError> {
    serde_json::from_value(command.payload.clone())
        .map_err(|e| rejection(format!("Invalid payload for {}: {e}", command.name)))
}

#[async_trait]
impl CommandTransport for InMemoryHost {
    async fn invoke(&self, command: &Command) -> HostResult {
        let unavailable = {
            let mut state = self.state.lock();
            state.received.push(command.clone());
            state.unavailable
        };
        if unavailable {
            return Err(TransportError::Unavailable(
                "In-memory host is unavailable".to_string(),
            ));
        }

        self.handle(command)
    }

    fn transport_name(&self) -> &str {
        "in_memory"
    }
}

//! # Global Shortcut Facade
//!
//! Public surface for registering system-wide shortcuts through the host.
//!
//! Every registration follows the same sequence: attach the handler to a fresh
//! callback channel, send the command carrying the channel reference, then keep
//! the attachment if the host accepted or release it if the host refused. The
//! attachment always exists before the command leaves this process, so the host
//! can never push a trigger to an identity that is not yet live.
//!
//! The host is the source of truth for what is registered. Locally the facade
//! only remembers which channel serves which descriptor, so that a confirmed
//! unregistration can release the right handler.
//!
//! ```rust,no_run
//! use global_shortcut::{BridgeConfig, GlobalShortcut};
//!
//! # async fn example() -> global_shortcut::Result<()> {
//! let shortcuts = GlobalShortcut::connect(&BridgeConfig::load()?).await?;
//!
//! shortcuts
//!     .register("CommandOrControl+Shift+C", |shortcut| println!("{shortcut} triggered"))
//!     .await?;
//! shortcuts
//!     .register_all(["CommandOrControl+Shift+C", "Ctrl+Alt+F12"], |shortcut| {
//!         println!("Shortcut {shortcut} triggered")
//!     })
//!     .await?;
//!
//! assert!(shortcuts.is_registered("Ctrl+Alt+F12").await?);
//! shortcuts.unregister_all().await?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::execution::{
    CommandInvoker, CommandName, CommandTransport, EmptyPayload, InvokerStats, IpcTransport,
    RegisterAllPayload, RegisterPayload, ShortcutPayload,
};
use crate::logging::{log_error, log_shortcut_operation};
use crate::registry::{create_callback_channel, CallbackChannel, ChannelRef, TransportGeneration};
use crate::shortcut::{RegistrationState, ShortcutDescriptor, ShortcutHandler};

/// Registration facade over the host bridge
pub struct GlobalShortcut {
    invoker: CommandInvoker,
    channels: Arc<dyn CallbackChannel>,
    bindings: Mutex<BindingTable>,
}

/// Which channel serves which descriptor, plus in-flight markers.
///
/// Completions act on what their command was sent with: an unregister releases
/// a descriptor only while it is still bound to the channel captured at send
/// time, and a marker is removed only by the call that set it.
#[derive(Debug, Default)]
struct BindingTable {
    channel_by_shortcut: HashMap<ShortcutDescriptor, ChannelRef>,
    shortcuts_by_channel: HashMap<ChannelRef, HashSet<ShortcutDescriptor>>,
    in_flight: HashMap<ShortcutDescriptor, InFlight>,
    next_ticket: u64,
}

/// Marker left by one in-flight call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    ticket: u64,
    state: RegistrationState,
}

impl BindingTable {
    /// Bind descriptors to a channel. Returns channels that lost their last
    /// descriptor in the process and can be detached.
    fn bind(&mut self, shortcuts: &[ShortcutDescriptor], channel: ChannelRef) -> Vec<ChannelRef> {
        let mut orphaned = Vec::new();

        for shortcut in shortcuts {
            if let Some(previous) = self.channel_by_shortcut.insert(shortcut.clone(), channel) {
                if previous != channel {
                    orphaned.extend(self.release(previous, shortcut));
                }
            }
            self.shortcuts_by_channel
                .entry(channel)
                .or_default()
                .insert(shortcut.clone());
        }

        orphaned
    }

    /// Unbind a descriptor if it is still served by `expected`. Returns the
    /// channel once no descriptor uses it anymore.
    fn unbind(&mut self, shortcut: &ShortcutDescriptor, expected: ChannelRef) -> Option<ChannelRef> {
        if self.channel_by_shortcut.get(shortcut) != Some(&expected) {
            return None;
        }
        self.channel_by_shortcut.remove(shortcut);
        self.release(expected, shortcut)
    }

    fn release(&mut self, channel: ChannelRef, shortcut: &ShortcutDescriptor) -> Option<ChannelRef> {
        let shortcuts = self.shortcuts_by_channel.get_mut(&channel)?;
        shortcuts.remove(shortcut);
        if shortcuts.is_empty() {
            self.shortcuts_by_channel.remove(&channel);
            Some(channel)
        } else {
            None
        }
    }

    /// Current descriptor → channel pairs, sorted by descriptor
    fn snapshot(&self) -> Vec<(ShortcutDescriptor, ChannelRef)> {
        let mut pairs: Vec<_> = self
            .channel_by_shortcut
            .iter()
            .map(|(shortcut, channel)| (shortcut.clone(), *channel))
            .collect();
        pairs.sort();
        pairs
    }

    /// Mark descriptors as transitioning; returns the ticket owning the marks
    fn mark(&mut self, shortcuts: &[ShortcutDescriptor], state: RegistrationState) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        for shortcut in shortcuts {
            self.in_flight
                .insert(shortcut.clone(), InFlight { ticket, state });
        }
        ticket
    }

    /// Remove the marks set under `ticket`, leaving newer calls' marks alone
    fn unmark(&mut self, shortcuts: &[ShortcutDescriptor], ticket: u64) {
        for shortcut in shortcuts {
            if self
                .in_flight
                .get(shortcut)
                .is_some_and(|mark| mark.ticket == ticket)
            {
                self.in_flight.remove(shortcut);
            }
        }
    }

    fn state(&self, shortcut: &ShortcutDescriptor) -> RegistrationState {
        if let Some(mark) = self.in_flight.get(shortcut) {
            return mark.state;
        }
        if self.channel_by_shortcut.contains_key(shortcut) {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    fn bound_shortcuts(&self) -> Vec<ShortcutDescriptor> {
        let mut shortcuts: Vec<_> = self.channel_by_shortcut.keys().cloned().collect();
        shortcuts.sort();
        shortcuts
    }
}

impl GlobalShortcut {
    /// Build the facade over an existing transport and channel generation
    pub fn new(
        config: &BridgeConfig,
        transport: Arc<dyn CommandTransport>,
        channels: Arc<dyn CallbackChannel>,
    ) -> Self {
        if channels.generation() != config.generation {
            debug!(
                configured = %config.generation,
                actual = %channels.generation(),
                "Callback channel generation differs from configuration"
            );
        }

        Self {
            invoker: CommandInvoker::new(transport, config.plugin_identifier.clone()),
            channels,
            bindings: Mutex::new(BindingTable::default()),
        }
    }

    /// Connect to the host over IPC with the configured channel generation
    pub async fn connect(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let channels = create_callback_channel(config.generation);
        let transport = IpcTransport::connect(&config.ipc, channels.clone()).await?;

        info!(
            generation = %config.generation,
            plugin = %config.plugin_identifier,
            "Global shortcut bridge connected"
        );
        Ok(Self::new(config, Arc::new(transport), channels))
    }

    /// Register a global shortcut. The handler receives the triggered descriptor.
    pub async fn register<F>(&self, shortcut: impl Into<ShortcutDescriptor>, handler: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let shortcut = shortcut.into();
        let handler: ShortcutHandler = Arc::new(handler);
        let channel = self.channels.attach(handler)?;
        let shortcuts = vec![shortcut.clone()];

        let ticket = self
            .bindings
            .lock()
            .mark(&shortcuts, RegistrationState::Registering);

        let result = self
            .invoker
            .invoke::<(), _>(
                CommandName::Register,
                &RegisterPayload {
                    shortcut,
                    handler: channel,
                },
            )
            .await;

        self.complete_registration(CommandName::Register, shortcuts, channel, ticket, result)
    }

    /// Register a collection of shortcuts sharing one handler and one channel.
    /// The handler receives whichever descriptor fired.
    pub async fn register_all<I, S, F>(&self, shortcuts: I, handler: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<ShortcutDescriptor>,
        F: Fn(&str) + Send + Sync + 'static,
    {
        let shortcuts: Vec<ShortcutDescriptor> = shortcuts.into_iter().map(Into::into).collect();
        let handler: ShortcutHandler = Arc::new(handler);
        let channel = self.channels.attach(handler)?;

        let ticket = self
            .bindings
            .lock()
            .mark(&shortcuts, RegistrationState::Registering);

        let result = self
            .invoker
            .invoke::<(), _>(
                CommandName::RegisterAll,
                &RegisterAllPayload {
                    shortcuts: shortcuts.clone(),
                    handler: channel,
                },
            )
            .await;

        self.complete_registration(CommandName::RegisterAll, shortcuts, channel, ticket, result)
    }

    fn complete_registration(
        &self,
        command: CommandName,
        shortcuts: Vec<ShortcutDescriptor>,
        channel: ChannelRef,
        ticket: u64,
        result: Result<()>,
    ) -> Result<()> {
        let channel_label = channel.to_string();
        let label = describe(&shortcuts);

        match result {
            Ok(()) => {
                let orphaned = {
                    let mut bindings = self.bindings.lock();
                    bindings.unmark(&shortcuts, ticket);
                    bindings.bind(&shortcuts, channel)
                };
                for previous in orphaned {
                    self.channels.detach(&previous);
                }
                if shortcuts.is_empty() {
                    // Nothing can address this channel
                    self.channels.detach(&channel);
                }

                log_shortcut_operation(
                    command.as_str(),
                    Some(&label),
                    Some(&channel_label),
                    "registered",
                    None,
                );
                Ok(())
            }
            Err(err) => {
                self.bindings.lock().unmark(&shortcuts, ticket);
                self.channels.detach(&channel);

                log_error(
                    "global_shortcut",
                    command.as_str(),
                    &err.to_string(),
                    Some(&label),
                );
                Err(err)
            }
        }
    }

    /// Ask the host whether this application has the shortcut registered.
    ///
    /// Not cached: two calls can disagree if the host changed in between.
    pub async fn is_registered(&self, shortcut: impl Into<ShortcutDescriptor>) -> Result<bool> {
        let shortcut = shortcut.into();
        self.invoker
            .invoke(CommandName::IsRegistered, &ShortcutPayload { shortcut })
            .await
    }

    /// Unregister a shortcut. Its handler is released only once the host confirms.
    pub async fn unregister(&self, shortcut: impl Into<ShortcutDescriptor>) -> Result<()> {
        let shortcut = shortcut.into();
        let shortcuts = vec![shortcut.clone()];
        let (sent_channel, ticket) = {
            let mut bindings = self.bindings.lock();
            let sent_channel = bindings.channel_by_shortcut.get(&shortcut).copied();
            let ticket = sent_channel
                .map(|_| bindings.mark(&shortcuts, RegistrationState::Unregistering));
            (sent_channel, ticket)
        };

        let result = self
            .invoker
            .invoke::<(), _>(
                CommandName::Unregister,
                &ShortcutPayload {
                    shortcut: shortcut.clone(),
                },
            )
            .await;

        match result {
            Ok(()) => {
                let released = {
                    let mut bindings = self.bindings.lock();
                    if let Some(ticket) = ticket {
                        bindings.unmark(&shortcuts, ticket);
                    }
                    // A registration completed meanwhile owns the descriptor now
                    sent_channel.and_then(|channel| bindings.unbind(&shortcut, channel))
                };
                if let Some(channel) = released {
                    self.channels.detach(&channel);
                }

                log_shortcut_operation(
                    CommandName::Unregister.as_str(),
                    Some(shortcut.as_str()),
                    sent_channel.map(|channel| channel.to_string()).as_deref(),
                    "unregistered",
                    sent_channel
                        .is_none()
                        .then_some("no local handler was bound"),
                );
                Ok(())
            }
            Err(err) => {
                // Host still considers it registered: keep the handler live
                if let Some(ticket) = ticket {
                    self.bindings.lock().unmark(&shortcuts, ticket);
                }
                log_error(
                    "global_shortcut",
                    CommandName::Unregister.as_str(),
                    &err.to_string(),
                    Some(shortcut.as_str()),
                );
                Err(err)
            }
        }
    }

    /// Unregister every shortcut registered by this application.
    ///
    /// Only the bindings present when the command was sent are released.
    pub async fn unregister_all(&self) -> Result<()> {
        let (sent, shortcuts, ticket) = {
            let mut bindings = self.bindings.lock();
            let sent = bindings.snapshot();
            let shortcuts: Vec<ShortcutDescriptor> =
                sent.iter().map(|(shortcut, _)| shortcut.clone()).collect();
            let ticket = bindings.mark(&shortcuts, RegistrationState::Unregistering);
            (sent, shortcuts, ticket)
        };

        let result = self
            .invoker
            .invoke::<(), _>(CommandName::UnregisterAll, &EmptyPayload::default())
            .await;

        match result {
            Ok(()) => {
                let channels: Vec<ChannelRef> = {
                    let mut bindings = self.bindings.lock();
                    bindings.unmark(&shortcuts, ticket);
                    sent.iter()
                        .filter_map(|(shortcut, channel)| bindings.unbind(shortcut, *channel))
                        .collect()
                };
                let released = channels.len();
                for channel in channels {
                    self.channels.detach(&channel);
                }

                log_shortcut_operation(
                    CommandName::UnregisterAll.as_str(),
                    None,
                    None,
                    "unregistered",
                    Some(&format!("released {released} channel(s)")),
                );
                Ok(())
            }
            Err(err) => {
                self.bindings.lock().unmark(&shortcuts, ticket);
                log_error(
                    "global_shortcut",
                    CommandName::UnregisterAll.as_str(),
                    &err.to_string(),
                    None,
                );
                Err(err)
            }
        }
    }

    /// Local view of a descriptor's registration state
    pub fn registration_state(&self, shortcut: impl Into<ShortcutDescriptor>) -> RegistrationState {
        self.bindings.lock().state(&shortcut.into())
    }

    /// Channel currently serving a descriptor
    pub fn channel_for(&self, shortcut: impl Into<ShortcutDescriptor>) -> Option<ChannelRef> {
        self.bindings
            .lock()
            .channel_by_shortcut
            .get(&shortcut.into())
            .copied()
    }

    /// Descriptors with a live local handler, sorted
    pub fn bound_shortcuts(&self) -> Vec<ShortcutDescriptor> {
        self.bindings.lock().bound_shortcuts()
    }

    pub fn channels(&self) -> &Arc<dyn CallbackChannel> {
        &self.channels
    }

    pub fn generation(&self) -> TransportGeneration {
        self.channels.generation()
    }

    pub fn invoker_stats(&self) -> InvokerStats {
        self.invoker.stats()
    }
}

fn describe(shortcuts: &[ShortcutDescriptor]) -> String {
    shortcuts
        .iter()
        .map(ShortcutDescriptor::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

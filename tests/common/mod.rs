//! Shared helpers for the integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use global_shortcut::execution::Command;
use global_shortcut::testing::InMemoryHost;
use global_shortcut::{
    create_callback_channel, BridgeConfig, CallbackChannel, CommandName, CommandTransport,
    GlobalShortcut, TransportError, TransportGeneration,
};

pub const GENERATIONS: [TransportGeneration; 2] =
    [TransportGeneration::Structured, TransportGeneration::Legacy];

/// Facade wired to an in-memory host over one channel generation
pub struct Harness {
    pub host: Arc<InMemoryHost>,
    pub channels: Arc<dyn CallbackChannel>,
    pub shortcuts: GlobalShortcut,
}

impl Harness {
    pub fn new(generation: TransportGeneration) -> Self {
        let config = BridgeConfig {
            generation,
            ..BridgeConfig::default()
        };
        let channels = create_callback_channel(generation);
        let host = Arc::new(InMemoryHost::new(
            config.plugin_identifier.clone(),
            channels.clone(),
        ));
        let shortcuts = GlobalShortcut::new(&config, host.clone(), channels.clone());

        Self {
            host,
            channels,
            shortcuts,
        }
    }
}

/// Transport that applies every command on the host at once but can hold a
/// reply back until released, leaving the command in flight from the
/// facade's point of view
pub struct GatedTransport {
    host: Arc<InMemoryHost>,
    gated: Mutex<HashSet<CommandName>>,
    held: Mutex<Vec<oneshot::Sender<()>>>,
}

impl GatedTransport {
    pub fn new(host: Arc<InMemoryHost>) -> Self {
        Self {
            host,
            gated: Mutex::new(HashSet::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Hold the reply of the next command with this name
    pub fn hold_next(&self, name: CommandName) {
        self.gated.lock().insert(name);
    }

    /// Wait until at least `count` replies are being held
    pub async fn wait_held(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.held.lock().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {count} held replies"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Let every held reply through
    pub fn release_all(&self) {
        let held: Vec<_> = self.held.lock().drain(..).collect();
        for release in held {
            let _ = release.send(());
        }
    }
}

#[async_trait]
impl CommandTransport for GatedTransport {
    async fn invoke(&self, command: &Command) -> Result<Value, TransportError> {
        let result = self.host.invoke(command).await;

        let gated = self.gated.lock().remove(&command.name);
        if gated {
            let (release, released) = oneshot::channel();
            self.held.lock().push(release);
            let _ = released.await;
        }
        result
    }

    fn transport_name(&self) -> &str {
        "gated"
    }
}

/// Facade over a gated transport, shareable with spawned calls
pub struct GatedHarness {
    pub host: Arc<InMemoryHost>,
    pub gate: Arc<GatedTransport>,
    pub channels: Arc<dyn CallbackChannel>,
    pub shortcuts: Arc<GlobalShortcut>,
}

impl GatedHarness {
    pub fn new(generation: TransportGeneration) -> Self {
        let config = BridgeConfig {
            generation,
            ..BridgeConfig::default()
        };
        let channels = create_callback_channel(generation);
        let host = Arc::new(InMemoryHost::new(
            config.plugin_identifier.clone(),
            channels.clone(),
        ));
        let gate = Arc::new(GatedTransport::new(host.clone()));
        let shortcuts = Arc::new(GlobalShortcut::new(&config, gate.clone(), channels.clone()));

        Self {
            host,
            gate,
            channels,
            shortcuts,
        }
    }
}

/// Handler that records every descriptor it is called with
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let calls = self.calls.clone();
        move |shortcut: &str| calls.lock().push(shortcut.to_string())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Wait until at least `expected` calls were recorded
    pub async fn wait_for(&self, expected: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.count() < expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {expected} calls, got {:?}",
                self.calls()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.calls()
    }
}

/// Give delivery tasks time to run anything still queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

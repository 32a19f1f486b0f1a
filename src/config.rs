//! # Bridge Configuration
//!
//! Settings for the command bridge: the plugin namespace commands are sent to,
//! which callback channel generation is used, where the host listens and how
//! logging is set up.
//!
//! Values come from an optional file (TOML, YAML or JSON) layered under
//! environment overrides prefixed with `SHORTCUT_BRIDGE_`, nested keys separated
//! by a double underscore:
//!
//! ```bash
//! SHORTCUT_BRIDGE_GENERATION=legacy
//! SHORTCUT_BRIDGE_IPC__PORT=7431
//! SHORTCUT_BRIDGE_LOGGING__JSON=true
//! ```

use crate::constants::{ENV_PREFIX, PLUGIN_IDENTIFIER};
use crate::error::{Result, ShortcutError};
use crate::registry::TransportGeneration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Namespace commands are qualified with (`plugin:<id>|<command>`)
    pub plugin_identifier: String,

    /// Callback channel generation handed to the host
    pub generation: TransportGeneration,

    /// Host endpoint for [`crate::execution::IpcTransport`]
    pub ipc: IpcConfig,

    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            plugin_identifier: PLUGIN_IDENTIFIER.to_string(),
            generation: TransportGeneration::default(),
            ipc: IpcConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Host endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Fail a command with `TransportUnavailable` if the host has not answered
    /// in time. Unset means wait indefinitely.
    pub request_timeout_ms: Option<u64>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7431,
            connect_timeout_ms: 5000,
            request_timeout_ms: None,
        }
    }
}

impl IpcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging configuration consumed by [`crate::logging::init_structured_logging`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from defaults and environment overrides
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(Self::environment_source())
            .build()?
            .try_deserialize::<BridgeConfig>()?;

        config.validate()?;
        debug!(?config, "Bridge configuration loaded from environment");
        Ok(config)
    }

    /// Load configuration from a file, with environment overrides on top
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ShortcutError::ConfigurationError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(Self::environment_source())
            .build()?
            .try_deserialize::<BridgeConfig>()?;

        config.validate()?;
        debug!(
            path = %path.display(),
            ?config,
            "Bridge configuration loaded from file"
        );
        Ok(config)
    }

    fn environment_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate values the host and transport depend on
    pub fn validate(&self) -> Result<()> {
        if self.plugin_identifier.is_empty() {
            return Err(ShortcutError::ConfigurationError(
                "plugin_identifier cannot be empty".to_string(),
            ));
        }

        if self.plugin_identifier.contains(['|', ':']) {
            return Err(ShortcutError::ConfigurationError(format!(
                "plugin_identifier '{}' cannot contain '|' or ':'",
                self.plugin_identifier
            )));
        }

        if self.ipc.port == 0 {
            return Err(ShortcutError::ConfigurationError(
                "ipc.port cannot be zero".to_string(),
            ));
        }

        if self.ipc.connect_timeout_ms == 0 {
            return Err(ShortcutError::ConfigurationError(
                "ipc.connect_timeout_ms cannot be zero".to_string(),
            ));
        }

        if self.ipc.request_timeout_ms == Some(0) {
            return Err(ShortcutError::ConfigurationError(
                "ipc.request_timeout_ms cannot be zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

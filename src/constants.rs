//! # Bridge Constants
//!
//! Identifiers shared between this process and the host: the plugin namespace,
//! the versioned command vocabulary and the wire prefix of structured channel
//! references.

/// Plugin namespace every command is qualified with
pub const PLUGIN_IDENTIFIER: &str = "globalShortcut";

/// Prefix of a structured channel reference on the wire (`__CHANNEL__:<id>`)
pub const CHANNEL_REF_PREFIX: &str = "__CHANNEL__:";

/// Command names understood by the host
pub mod commands {
    pub const REGISTER: &str = "register";
    pub const REGISTER_ALL: &str = "register_all";
    pub const IS_REGISTERED: &str = "is_registered";
    pub const UNREGISTER: &str = "unregister";
    pub const UNREGISTER_ALL: &str = "unregister_all";
}

/// Build the fully qualified command name, e.g. `plugin:globalShortcut|register`
pub fn qualified_command(plugin: &str, command: &str) -> String {
    format!("plugin:{plugin}|{command}")
}

/// Split a qualified command name into `(plugin, command)`
pub fn split_qualified_command(qualified: &str) -> Option<(&str, &str)> {
    qualified.strip_prefix("plugin:")?.split_once('|')
}

/// Environment variable prefix used by [`crate::config::BridgeConfig::load`]
pub const ENV_PREFIX: &str = "SHORTCUT_BRIDGE";

//! Command vocabulary, payloads and wire frames for the host bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::constants::{commands, qualified_command};
use crate::registry::ChannelRef;
use crate::shortcut::ShortcutDescriptor;

/// Commands understood by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Register,
    RegisterAll,
    IsRegistered,
    Unregister,
    UnregisterAll,
}

impl CommandName {
    pub const ALL: [CommandName; 5] = [
        CommandName::Register,
        CommandName::RegisterAll,
        CommandName::IsRegistered,
        CommandName::Unregister,
        CommandName::UnregisterAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Register => commands::REGISTER,
            CommandName::RegisterAll => commands::REGISTER_ALL,
            CommandName::IsRegistered => commands::IS_REGISTERED,
            CommandName::Unregister => commands::UNREGISTER,
            CommandName::UnregisterAll => commands::UNREGISTER_ALL,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == name)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Unique identifier for this command, used in logs
    pub command_id: String,

    pub name: CommandName,

    /// Plugin-qualified name, e.g. `plugin:globalShortcut|register`
    pub qualified_name: String,

    pub payload: Value,

    pub issued_at: DateTime<Utc>,
}

impl Command {
    /// Create a new command with generated ID and current timestamp
    pub fn new(plugin_identifier: &str, name: CommandName, payload: Value) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            name,
            qualified_name: qualified_command(plugin_identifier, name.as_str()),
            payload,
            issued_at: Utc::now(),
        }
    }
}

/// Payload of `register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub shortcut: ShortcutDescriptor,
    pub handler: ChannelRef,
}

/// Payload of `register_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAllPayload {
    pub shortcuts: Vec<ShortcutDescriptor>,
    pub handler: ChannelRef,
}

/// Payload of `is_registered` and `unregister`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortcutPayload {
    pub shortcut: ShortcutDescriptor,
}

/// Payload of `unregister_all`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Frames written by this process on the IPC connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    Request { id: u64, cmd: String, payload: Value },
}

/// Frames written by the host on the IPC connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostFrame {
    /// Resolution of one request. `error` present means rejection; otherwise
    /// `ok` (absent or null for void results) is the result.
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    /// Fire-and-forget push addressed to a callback channel
    Event {
        channel: ChannelRef,
        #[serde(default)]
        payload: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CallbackToken, ChannelId};
    use serde_json::json;

    #[test]
    fn test_command_names_match_host_vocabulary() {
        let names: Vec<_> = CommandName::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec!["register", "register_all", "is_registered", "unregister", "unregister_all"]
        );
        assert_eq!(CommandName::parse("register_all"), Some(CommandName::RegisterAll));
        assert_eq!(CommandName::parse("registerAll"), None);
    }

    #[test]
    fn test_command_is_plugin_qualified() {
        let command = Command::new("globalShortcut", CommandName::IsRegistered, json!({}));
        assert_eq!(command.qualified_name, "plugin:globalShortcut|is_registered");
        assert!(!command.command_id.is_empty());
    }

    #[test]
    fn test_register_payload_shapes() {
        let payload = RegisterPayload {
            shortcut: "CommandOrControl+Shift+C".into(),
            handler: ChannelRef::Structured(ChannelId(4)),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"shortcut": "CommandOrControl+Shift+C", "handler": "__CHANNEL__:4"})
        );

        let payload = RegisterAllPayload {
            shortcuts: vec!["Ctrl+A".into(), "Ctrl+B".into()],
            handler: ChannelRef::Legacy(CallbackToken(9)),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"shortcuts": ["Ctrl+A", "Ctrl+B"], "handler": 9})
        );

        assert_eq!(serde_json::to_value(EmptyPayload::default()).unwrap(), json!({}));
    }

    #[test]
    fn test_host_frames_parse() {
        let frame: HostFrame =
            serde_json::from_str(r#"{"kind":"response","id":7,"ok":true}"#).unwrap();
        assert_eq!(
            frame,
            HostFrame::Response {
                id: 7,
                ok: Some(json!(true)),
                error: None
            }
        );

        let frame: HostFrame =
            serde_json::from_str(r#"{"kind":"response","id":8,"error":"already registered"}"#)
                .unwrap();
        assert!(matches!(frame, HostFrame::Response { error: Some(_), .. }));

        let frame: HostFrame = serde_json::from_str(
            r#"{"kind":"event","channel":"__CHANNEL__:2","payload":"Ctrl+Alt+F12"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            HostFrame::Event {
                channel: ChannelRef::Structured(ChannelId(2)),
                payload: json!("Ctrl+Alt+F12")
            }
        );
    }

    #[test]
    fn test_client_frame_shape() {
        let frame = ClientFrame::Request {
            id: 1,
            cmd: "plugin:globalShortcut|unregister_all".to_string(),
            payload: json!({}),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"kind": "request", "id": 1, "cmd": "plugin:globalShortcut|unregister_all", "payload": {}})
        );
    }
}

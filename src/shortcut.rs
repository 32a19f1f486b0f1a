//! Shortcut descriptors, handlers and the per-descriptor registration states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A shortcut definition such as `"CommandOrControl+Shift+C"`.
///
/// Opaque to this crate: parsing and validation belong to the host, and two
/// descriptors are equal only when their strings are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortcutDescriptor(String);

impl ShortcutDescriptor {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ShortcutDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShortcutDescriptor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ShortcutDescriptor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for ShortcutDescriptor {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl AsRef<str> for ShortcutDescriptor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Application callback, invoked with the descriptor that fired
pub type ShortcutHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Registration state of one descriptor as seen from this process.
///
/// The host remains the source of truth; this is the local view of the
/// `Unregistered → Registering → Registered → Unregistering → Unregistered`
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Unregistering,
}

impl RegistrationState {
    /// A command for this descriptor is in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            RegistrationState::Registering | RegistrationState::Unregistering
        )
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Registered => "registered",
            RegistrationState::Unregistering => "unregistering",
        };
        f.write_str(name)
    }
}

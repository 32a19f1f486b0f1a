#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Global Shortcut Bridge
//!
//! Client-side binding for system-wide keyboard shortcuts owned by a privileged
//! host process.
//!
//! ## Overview
//!
//! This process never hooks the OS directly. It asks the host to bind a shortcut
//! descriptor, hands it a callback channel reference, and the host pushes one
//! message into that channel every time the shortcut fires.
//!
//! ## Architecture
//!
//! ```text
//! GlobalShortcut (facade)
//! ├── CommandInvoker ──► CommandTransport (IpcTransport | InMemoryHost)
//! └── CallbackChannel ◄── host pushes
//!     ├── StructuredChannels (Generation A)
//!     └── CallbackTable      (Generation B)
//! ```
//!
//! ## Module Organization
//!
//! - [`global_shortcut`] - Registration facade
//! - [`execution`] - Command vocabulary, invoker and transports
//! - [`registry`] - Callback channels of both generations
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`testing`] - In-process host
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use global_shortcut::{BridgeConfig, GlobalShortcut};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load()?;
//! global_shortcut::logging::init_structured_logging(&config.logging);
//!
//! let shortcuts = GlobalShortcut::connect(&config).await?;
//! shortcuts
//!     .register("CommandOrControl+Shift+C", |shortcut| {
//!         println!("Shortcut {shortcut} triggered");
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transport Generations
//!
//! The structured generation is the default. Building with the
//! `legacy-callback-table` feature switches the default to the token table;
//! either can also be chosen at runtime through [`BridgeConfig::generation`].
//! The facade behaves the same over both.

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod global_shortcut;
pub mod logging;
pub mod registry;
pub mod shortcut;
pub mod testing;

pub use config::{BridgeConfig, IpcConfig, LoggingConfig};
pub use error::{Result, ShortcutError};
pub use execution::{CommandInvoker, CommandName, CommandTransport, IpcTransport, TransportError};
pub use global_shortcut::GlobalShortcut;
pub use registry::{
    create_callback_channel, CallbackChannel, CallbackTable, ChannelRef, StructuredChannels,
    TransportGeneration,
};
pub use shortcut::{RegistrationState, ShortcutDescriptor, ShortcutHandler};

//! # Callback Channel Registry
//!
//! Host-addressable inboxes that route asynchronous shortcut triggers back to the
//! handler that registered them.
//!
//! ## Architecture
//!
//! ```text
//! Callback Channels
//! ├── CallbackChannel       (attach / detach / dispatch contract)
//! ├── StructuredChannels    (Generation A: inbox + consumer task per identity)
//! └── CallbackTable         (Generation B: shared token table + dispatch pump)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use global_shortcut::registry::{create_callback_channel, TransportGeneration};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channels = create_callback_channel(TransportGeneration::Structured);
//! let channel = channels.attach(Arc::new(|shortcut: &str| println!("{shortcut} fired")))?;
//!
//! // The host pushes triggers for this identity
//! channels.dispatch(&channel, serde_json::json!("CommandOrControl+Shift+C"));
//!
//! channels.detach(&channel);
//! # Ok(())
//! # }
//! ```

pub mod callback_table;
pub mod channel;
pub mod structured_channel;

pub use callback_table::CallbackTable;
pub use channel::{
    create_callback_channel, triggered_descriptor, CallbackChannel, CallbackToken, ChannelId,
    ChannelRef, TransportGeneration,
};
pub use structured_channel::StructuredChannels;

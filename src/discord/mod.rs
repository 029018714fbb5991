//! Discord integration.
//!
//! This module receives gateway messages, bridges them to WhatsApp and
//! delivers WhatsApp messages into Discord through channel webhooks.

pub mod adapter;
pub mod client;
pub mod convert;
pub mod sender;

// Re-export main types for external use
pub use adapter::DiscordAdapter;
pub use client::DiscordBot;
pub use sender::DiscordSender;

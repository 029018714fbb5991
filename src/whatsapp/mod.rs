//! WhatsApp integration through the HTTP sidecar.
//!
//! ## Module Structure
//!
//! - `client`: outbound requests (`/send`, `/mark-read`, `/contacts`, `/unread`)
//! - `events`: long-poll listener and event conversion
//! - `adapter`: WhatsApp to Discord bridging

pub mod adapter;
pub mod client;
pub mod events;

pub use adapter::WhatsAppAdapter;
pub use client::WhatsAppSender;
pub use events::WhatsAppListener;

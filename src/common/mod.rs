//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod types;

pub use messages::{
    AttachmentSource, InboundAttachment, InboundAuthor, InboundKind, InboundMessage,
    InboundSticker, Mention, OutboundAttachment, QuoteEmbed, QuotedMessage, SendRequest,
    StickerOptions,
};
pub use types::{AttachmentKind, Platform, PlatformMessageType};

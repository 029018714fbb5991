//! Canonical message types for bridge communication.
//!
//! Inbound events are normalized into [`InboundMessage`] by each platform
//! client before they reach a queue. Outbound sends are described by a
//! [`SendRequest`] that every [`PlatformSender`](crate::bridge::PlatformSender)
//! understands.

use bytes::Bytes;

use crate::common::types::Platform;

/// Author of an inbound message, as the origin platform reports it.
#[derive(Debug, Clone)]
pub struct InboundAuthor {
    /// Discord user id or WhatsApp phone number.
    pub native_id: String,
    /// Nickname, username or push name.
    pub display_name: String,
    pub is_bot: bool,
    pub avatar_url: Option<String>,
}

/// What kind of native event produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InboundKind {
    #[default]
    Regular,
    Reply,
    /// Discord "pinned a message" notification.
    Pinned,
}

/// Where the bytes of an attachment come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// Already downloaded.
    Inline(Bytes),
    /// Fetched with a GET when the task runs.
    Remote(String),
}

/// Attachment descriptor attached to an inbound event.
#[derive(Debug, Clone)]
pub struct InboundAttachment {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    /// Size reported by the platform, if known before download.
    pub size: Option<u64>,
    pub source: AttachmentSource,
    /// WhatsApp marks stickers as images with a separate message type.
    pub is_sticker: bool,
}

/// Discord sticker metadata.
#[derive(Debug, Clone)]
pub struct InboundSticker {
    pub name: String,
    /// Raster image URL, absent for Lottie (json) stickers.
    pub image_url: Option<String>,
    /// Name of the pack or guild the sticker belongs to.
    pub pack_name: String,
}

/// A message the inbound one replies to or quotes.
#[derive(Debug, Clone)]
pub struct QuotedMessage {
    pub native_id: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub content: String,
}

/// A mentioned user.
#[derive(Debug, Clone)]
pub struct Mention {
    pub native_id: String,
    pub display_name: String,
}

/// One inbound platform event, normalized.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub platform: Platform,
    pub native_id: String,
    /// Discord channel id or WhatsApp chat JID.
    pub channel_native_id: String,
    pub author: InboundAuthor,
    pub content: String,
    pub kind: InboundKind,
    pub attachment: Option<InboundAttachment>,
    pub sticker: Option<InboundSticker>,
    pub quoted: Option<QuotedMessage>,
    pub mentions: Vec<Mention>,
    /// Fallback text when the content is empty (first embed description).
    pub embed_description: Option<String>,
    /// Set when a Discord webhook authored the message.
    pub webhook_id: Option<String>,
    /// Set when the bridge account itself authored the message.
    pub from_self: bool,
}

/// File payload of an outbound send.
#[derive(Debug, Clone)]
pub struct OutboundAttachment {
    pub filename: String,
    pub mime_type: Option<String>,
    pub source: AttachmentSource,
}

/// Options for sending media as a WhatsApp sticker.
#[derive(Debug, Clone)]
pub struct StickerOptions {
    pub name: String,
    pub author: String,
    pub animated_as_gif: bool,
}

/// Quote embed used as a Discord reply indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEmbed {
    pub author_name: String,
    pub author_icon_url: Option<String>,
    pub url: Option<String>,
    pub description: String,
    pub colour: u32,
}

/// Everything an outbound send may carry.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: Option<String>,
    pub attachment: Option<OutboundAttachment>,
    /// Native id of the artifact this send replies to.
    pub reply_target: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Native ids that may be pinged; nothing else is.
    pub mention_allow_list: Vec<String>,
    pub sticker: Option<StickerOptions>,
    pub embed: Option<QuoteEmbed>,
}

impl SendRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Set the display name and avatar override.
    pub fn as_author(mut self, display_name: impl Into<String>, avatar_url: Option<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.avatar_url = avatar_url;
        self
    }

    pub fn with_mentions(mut self, allow_list: Vec<String>) -> Self {
        self.mention_allow_list = allow_list;
        self
    }

    pub fn with_reply_target(mut self, reply_target: Option<String>) -> Self {
        self.reply_target = reply_target;
        self
    }
}

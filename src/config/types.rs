//! Configuration type definitions.

use serde::Deserialize;

use crate::common::types::AttachmentKind;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub attachment_icons: AttachmentIcons,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub channels: Vec<ChannelPairing>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Append an invisible per-author suffix to webhook usernames.
    #[serde(default)]
    pub disambiguate_usernames: bool,
}

/// WhatsApp sidecar connection.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_sidecar_url")]
    pub sidecar_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            sidecar_url: default_sidecar_url(),
        }
    }
}

fn default_sidecar_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "qbridge.db".to_string()
}

/// Text prefixes for attachments sent to Discord, per attachment kind.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AttachmentIcons {
    #[serde(default = "default_document_icon")]
    pub document: String,
    #[serde(default = "default_audio_icon")]
    pub audio: String,
    #[serde(default = "default_image_icon")]
    pub image: String,
    #[serde(default = "default_video_icon")]
    pub video: String,
    #[serde(default = "default_sticker_icon")]
    pub sticker: String,
}

impl AttachmentIcons {
    pub fn for_kind(&self, kind: AttachmentKind) -> &str {
        match kind {
            AttachmentKind::Document => &self.document,
            AttachmentKind::Audio => &self.audio,
            AttachmentKind::Image => &self.image,
            AttachmentKind::Video => &self.video,
            AttachmentKind::Sticker => &self.sticker,
        }
    }
}

impl Default for AttachmentIcons {
    fn default() -> Self {
        Self {
            document: default_document_icon(),
            audio: default_audio_icon(),
            image: default_image_icon(),
            video: default_video_icon(),
            sticker: default_sticker_icon(),
        }
    }
}

fn default_document_icon() -> String {
    "📄 ".to_string()
}

fn default_audio_icon() -> String {
    "🎵 ".to_string()
}

fn default_image_icon() -> String {
    "🖼️ ".to_string()
}

fn default_video_icon() -> String {
    "🎞️ ".to_string()
}

fn default_sticker_icon() -> String {
    "🏷️ ".to_string()
}

/// Size limits of the Discord side and the reply preview length.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_message_length")]
    pub discord_message_length: usize,
    #[serde(default = "default_attachment_bytes")]
    pub discord_attachment_bytes: u64,
    #[serde(default = "default_reply_preview_length")]
    pub reply_preview_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            discord_message_length: default_message_length(),
            discord_attachment_bytes: default_attachment_bytes(),
            reply_preview_length: default_reply_preview_length(),
        }
    }
}

fn default_message_length() -> usize {
    2000
}

fn default_attachment_bytes() -> u64 {
    8_000_000
}

fn default_reply_preview_length() -> usize {
    50
}

/// One bridged Discord channel and WhatsApp chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPairing {
    /// Discord channel ID
    pub discord: String,
    /// WhatsApp chat JID, e.g. `120363000000000000@g.us`
    pub whatsapp: String,
    /// Webhook URL posting into the Discord channel
    pub webhook: String,
}

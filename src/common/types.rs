//! Shared types used across the application.

use std::fmt;

/// A chat platform the bridge connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Discord,
    WhatsApp,
}

impl Platform {
    /// The platform on the other side of a bridge pairing.
    pub fn other(&self) -> Self {
        match self {
            Self::Discord => Self::WhatsApp,
            Self::WhatsApp => Self::Discord,
        }
    }

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "DISCORD",
            Self::WhatsApp => "WHATSAPP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DISCORD" => Some(Self::Discord),
            "WHATSAPP" => Some(Self::WhatsApp),
            _ => None,
        }
    }

    /// Native mention tokens this platform uses for a user id.
    ///
    /// Discord writes `<@id>` or the legacy nickname form `<@!id>`,
    /// WhatsApp writes `@<phone number>`.
    pub fn mention_tokens(&self, native_id: &str) -> Vec<String> {
        match self {
            Self::Discord => vec![format!("<@{}>", native_id), format!("<@!{}>", native_id)],
            Self::WhatsApp => vec![format!("@{}", native_id)],
        }
    }

    /// The live mention token for a user id on this platform.
    pub fn mention(&self, native_id: &str) -> String {
        match self {
            Self::Discord => format!("<@{}>", native_id),
            Self::WhatsApp => format!("@{}", native_id),
        }
    }

    /// A plain-text handle written in this platform's own markup.
    pub fn plain_mention(&self, display_name: &str) -> String {
        match self {
            Self::Discord => format!("@{}", display_name),
            Self::WhatsApp => format!("*@{}*", display_name),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discord => write!(f, "Discord"),
            Self::WhatsApp => write!(f, "WhatsApp"),
        }
    }
}

/// Kind of attachment carried by a bridged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Document,
    Audio,
    Image,
    Video,
    Sticker,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "DOCUMENT",
            Self::Audio => "AUDIO",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Sticker => "STICKER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DOCUMENT" => Some(Self::Document),
            "AUDIO" => Some(Self::Audio),
            "IMAGE" => Some(Self::Image),
            "VIDEO" => Some(Self::Video),
            "STICKER" => Some(Self::Sticker),
            _ => None,
        }
    }
}

/// What a recorded platform artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformMessageType {
    /// The canonical copy of a message (first text chunk, or the origin).
    Message,
    /// Synthesized quote standing in for a reply link.
    ReplyIndicator,
    /// Second and later chunks of a split message.
    SplitMessage,
    /// A separately delivered file or sticker.
    Attachment,
    /// A platform notification such as a pin.
    System,
}

impl PlatformMessageType {
    /// Types eligible to be treated as "the" copy of a logical message.
    pub const CANONICAL: [PlatformMessageType; 2] = [Self::Message, Self::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::ReplyIndicator => "REPLY_INDICATOR",
            Self::SplitMessage => "SPLIT_MESSAGE",
            Self::Attachment => "ATTACHMENT",
            Self::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MESSAGE" => Some(Self::Message),
            "REPLY_INDICATOR" => Some(Self::ReplyIndicator),
            "SPLIT_MESSAGE" => Some(Self::SplitMessage),
            "ATTACHMENT" => Some(Self::Attachment),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

/// Author permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionLevel {
    #[default]
    Standard,
    Moderator,
    Admin,
}

impl PermissionLevel {
    pub fn to_id(&self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Moderator => 1,
            Self::Admin => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Standard),
            1 => Some(Self::Moderator),
            2 => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Author flag bits.
pub mod author_flags {
    pub const IS_BOT: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for platform in [Platform::Discord, Platform::WhatsApp] {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
            assert_eq!(platform.other().other(), platform);
        }
        assert_eq!(Platform::parse("TELEGRAM"), None);
    }

    #[test]
    fn test_mention_tokens() {
        assert_eq!(
            Platform::Discord.mention_tokens("42"),
            vec!["<@42>".to_string(), "<@!42>".to_string()]
        );
        assert_eq!(Platform::WhatsApp.mention("31600000000"), "@31600000000");
        assert_eq!(Platform::WhatsApp.plain_mention("Ann"), "*@Ann*");
    }

    #[test]
    fn test_canonical_types() {
        assert!(PlatformMessageType::CANONICAL.contains(&PlatformMessageType::Message));
        assert!(PlatformMessageType::CANONICAL.contains(&PlatformMessageType::System));
        assert!(!PlatformMessageType::CANONICAL.contains(&PlatformMessageType::ReplyIndicator));
    }

    #[test]
    fn test_permission_level_ids() {
        assert_eq!(PermissionLevel::default(), PermissionLevel::Standard);
        assert_eq!(PermissionLevel::from_id(PermissionLevel::Admin.to_id()), Some(PermissionLevel::Admin));
        assert_eq!(PermissionLevel::from_id(9), None);
    }
}

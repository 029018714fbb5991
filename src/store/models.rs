//! Row types for the correlation store.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::common::types::{AttachmentKind, PermissionLevel, Platform, PlatformMessageType};

/// A bridged user identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: i64,
    pub discord_id: Option<String>,
    pub whatsapp_id: Option<String>,
    pub display_name: String,
    pub permission_level: PermissionLevel,
    pub flags: u32,
}

impl Author {
    /// The native id this author has on a platform, if linked there.
    pub fn native_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Discord => self.discord_id.as_deref(),
            Platform::WhatsApp => self.whatsapp_id.as_deref(),
        }
    }
}

/// Lookup key for [`Database::find_or_create_author`](super::Database::find_or_create_author).
#[derive(Debug, Clone)]
pub struct AuthorKey {
    pub platform: Platform,
    pub native_id: String,
}

impl AuthorKey {
    pub fn new(platform: Platform, native_id: impl Into<String>) -> Self {
        Self {
            platform,
            native_id: native_id.into(),
        }
    }
}

/// Defaults used when an author is created.
#[derive(Debug, Clone)]
pub struct AuthorDefaults {
    pub display_name: String,
    pub flags: u32,
}

/// A Discord channel paired with a WhatsApp chat.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub discord_id: String,
    pub whatsapp_id: String,
    /// Webhook used to post into the Discord channel.
    pub discord_webhook_url: String,
}

impl Channel {
    /// Whether a Discord webhook id belongs to this channel's own webhook.
    pub fn is_own_webhook(&self, webhook_id: &str) -> bool {
        self.discord_webhook_url
            .contains(&format!("/api/webhooks/{}/", webhook_id))
    }
}

/// Fields for seeding a channel pairing.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub discord_id: String,
    pub whatsapp_id: String,
    pub discord_webhook_url: String,
}

/// A platform-neutral bridged message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub author_id: i64,
    pub channel_id: i64,
    pub reply_to_id: Option<i64>,
    pub original_platform: Platform,
    pub attachment_kind: Option<AttachmentKind>,
    pub attachment_size: Option<u64>,
    pub content: String,
    pub original_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author_id: i64,
    pub channel_id: i64,
    pub original_platform: Platform,
    pub attachment_kind: Option<AttachmentKind>,
    pub attachment_size: Option<u64>,
    pub content: String,
}

/// One concrete artifact on one platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformMessage {
    pub id: i64,
    pub message_id: i64,
    pub platform: Platform,
    pub native_id: String,
    pub kind: PlatformMessageType,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewPlatformMessage {
    pub message_id: i64,
    pub platform: Platform,
    pub native_id: String,
    pub kind: PlatformMessageType,
}

/// Aggregate counters over the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeStats {
    pub discord_messages: u64,
    pub whatsapp_messages: u64,
    pub total_attachment_bytes: u64,
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} '{}'", stringify!($ty), text).into())
                })
            }
        }
    };
}

text_column!(Platform);
text_column!(AttachmentKind);
text_column!(PlatformMessageType);

impl ToSql for PermissionLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_id() as i64))
    }
}

impl FromSql for PermissionLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let id = value.as_i64()?;
        u8::try_from(id)
            .ok()
            .and_then(PermissionLevel::from_id)
            .ok_or(FromSqlError::OutOfRange(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_webhook_detection() {
        let channel = Channel {
            id: 1,
            discord_id: "100".to_string(),
            whatsapp_id: "123@g.us".to_string(),
            discord_webhook_url: "https://discord.com/api/webhooks/555/token".to_string(),
        };
        assert!(channel.is_own_webhook("555"));
        assert!(!channel.is_own_webhook("55"));
        assert!(!channel.is_own_webhook("token"));
    }

    #[test]
    fn test_author_native_id() {
        let author = Author {
            id: 7,
            discord_id: Some("42".to_string()),
            whatsapp_id: None,
            display_name: "Ann".to_string(),
            permission_level: PermissionLevel::Standard,
            flags: 0,
        };
        assert_eq!(author.native_id(Platform::Discord), Some("42"));
        assert_eq!(author.native_id(Platform::WhatsApp), None);
    }
}

//! Conversion of gateway messages into bridge events.
//!
//! Channel and role mentions are replaced by their names from the cache,
//! custom emoji by their CDN image link. User mentions are left in place
//! for the mention resolver.

use fancy_regex::Regex;
use serenity::cache::Cache;
use serenity::model::channel::{Message, MessageType};
use serenity::model::id::{ChannelId, RoleId};
use serenity::model::user::User;
use serenity::prelude::Context;
use tracing::warn;

use crate::common::{
    AttachmentSource, InboundAttachment, InboundAuthor, InboundKind, InboundMessage,
    InboundSticker, Mention, Platform, QuotedMessage,
};

/// Fallback content type for attachments Discord did not label.
const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// Regex-based cleanup of Discord-only tokens.
#[derive(Debug, Clone)]
pub struct ContentCleaner {
    /// Pattern for Discord user mentions (<@123> or <@!123>).
    mention_pattern: Regex,
    /// Pattern for Discord channel mentions (<#123>).
    channel_pattern: Regex,
    /// Pattern for Discord role mentions (<@&123>).
    role_pattern: Regex,
    /// Pattern for Discord custom emojis (<:name:id> or <a:name:id>).
    emoji_pattern: Regex,
}

impl Default for ContentCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentCleaner {
    pub fn new() -> Self {
        Self {
            mention_pattern: Regex::new(r"<@!?(\d+)>").unwrap(),
            channel_pattern: Regex::new(r"<#(\d+)>").unwrap(),
            role_pattern: Regex::new(r"<@&(\d+)>").unwrap(),
            emoji_pattern: Regex::new(r"<(a?):([a-zA-Z0-9_]+):(\d+)>").unwrap(),
        }
    }

    /// Replace custom emoji with `:name: (url)`.
    pub fn resolve_custom_emojis(&self, message: &str) -> String {
        self.emoji_pattern
            .replace_all(message, |caps: &fancy_regex::Captures| -> String {
                let extension = if &caps[1] == "a" { "gif" } else { "png" };
                format!(
                    ":{}: (https://cdn.discordapp.com/emojis/{}.{})",
                    &caps[2], &caps[3], extension
                )
            })
            .to_string()
    }

    /// Convert Discord channel mentions to plain text.
    pub fn resolve_channel_mentions(&self, message: &str, cache: &Cache) -> String {
        self.channel_pattern
            .replace_all(message, |caps: &fancy_regex::Captures| -> String {
                if let Some(channel_id) = parse_id(&caps[1]).map(ChannelId::new) {
                    for guild_id in cache.guilds() {
                        if let Some(guild) = cache.guild(guild_id) {
                            if let Some(channel) = guild.channels.get(&channel_id) {
                                return format!("#{}", channel.name);
                            }
                        }
                    }
                }
                caps[0].to_string()
            })
            .to_string()
    }

    /// Convert Discord role mentions to plain text.
    pub fn resolve_role_mentions(&self, message: &str, cache: &Cache) -> String {
        self.role_pattern
            .replace_all(message, |caps: &fancy_regex::Captures| -> String {
                if let Some(role_id) = parse_id(&caps[1]).map(RoleId::new) {
                    for guild_id in cache.guilds() {
                        if let Some(guild) = cache.guild(guild_id) {
                            if let Some(role) = guild.roles.get(&role_id) {
                                return format!("@{}", role.name);
                            }
                        }
                    }
                }
                caps[0].to_string()
            })
            .to_string()
    }

    /// Replace user mentions with `@name` using the given users.
    pub fn resolve_user_mentions(&self, message: &str, users: &[(String, String)]) -> String {
        self.mention_pattern
            .replace_all(message, |caps: &fancy_regex::Captures| -> String {
                users
                    .iter()
                    .find(|(id, _)| id == &caps[1])
                    .map(|(_, name)| format!("@{}", name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string()
    }

    /// Everything except user mentions.
    pub fn clean(&self, message: &str, cache: &Cache) -> String {
        let result = self.resolve_channel_mentions(message, cache);
        let result = self.resolve_role_mentions(&result, cache);
        self.resolve_custom_emojis(&result)
    }
}

fn parse_id(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Name shown for a message author: nickname, then global name, then username.
fn display_name(message: &Message) -> String {
    message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone())
}

fn user_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

/// Convert a gateway message into a bridge event.
pub async fn to_inbound(ctx: &Context, cleaner: &ContentCleaner, message: &Message) -> InboundMessage {
    let kind = match message.kind {
        MessageType::PinsAdd => InboundKind::Pinned,
        MessageType::InlineReply => InboundKind::Reply,
        _ => InboundKind::Regular,
    };

    let quoted = match kind {
        InboundKind::Regular => None,
        _ => quoted_message(ctx, cleaner, message).await,
    };

    let sticker = message.sticker_items.first().map(|item| InboundSticker {
        name: item.name.clone(),
        image_url: item.image_url(),
        pack_name: message
            .guild_id
            .and_then(|guild_id| ctx.cache.guild(guild_id).map(|guild| guild.name.clone()))
            .unwrap_or_else(|| "Discord".to_string()),
    });

    let attachment = message.attachments.first().map(|attachment| InboundAttachment {
        mime_type: Some(
            attachment
                .content_type
                .clone()
                .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string()),
        ),
        filename: Some(attachment.filename.clone()),
        size: Some(u64::from(attachment.size)),
        source: AttachmentSource::Remote(attachment.url.clone()),
        is_sticker: false,
    });

    let mentions = message
        .mentions
        .iter()
        .map(|user| Mention {
            native_id: user.id.to_string(),
            display_name: user_name(user),
        })
        .collect();

    InboundMessage {
        platform: Platform::Discord,
        native_id: message.id.to_string(),
        channel_native_id: message.channel_id.to_string(),
        author: InboundAuthor {
            native_id: message.author.id.to_string(),
            display_name: display_name(message),
            is_bot: message.author.bot,
            avatar_url: message.author.avatar_url(),
        },
        content: cleaner.clean(&message.content, &ctx.cache),
        kind,
        attachment,
        sticker,
        quoted,
        mentions,
        embed_description: message
            .embeds
            .first()
            .and_then(|embed| embed.description.as_deref())
            .map(|description| cleaner.clean(description, &ctx.cache)),
        webhook_id: message.webhook_id.map(|id| id.to_string()),
        from_self: false,
    }
}

async fn quoted_message(
    ctx: &Context,
    cleaner: &ContentCleaner,
    message: &Message,
) -> Option<QuotedMessage> {
    let reference = message.message_reference.as_ref()?;
    let referenced_id = reference.message_id?;

    let referenced = match message.referenced_message.as_deref() {
        Some(referenced) => Some(referenced.clone()),
        None => match ctx.http.get_message(message.channel_id, referenced_id).await {
            Ok(referenced) => Some(referenced),
            Err(e) => {
                warn!(message_id = %message.id, "Failed to fetch referenced message: {}", e);
                None
            }
        },
    };

    Some(match referenced {
        Some(referenced) => {
            let users: Vec<(String, String)> = referenced
                .mentions
                .iter()
                .map(|user| (user.id.to_string(), user_name(user)))
                .collect();
            let content = cleaner.resolve_user_mentions(
                &cleaner.clean(&referenced.content, &ctx.cache),
                &users,
            );
            QuotedMessage {
                native_id: referenced.id.to_string(),
                author_name: display_name(&referenced),
                author_avatar_url: referenced.author.avatar_url(),
                content,
            }
        }
        None => QuotedMessage {
            native_id: referenced_id.to_string(),
            author_name: "Unknown".to_string(),
            author_avatar_url: None,
            content: String::new(),
        },
    })
}

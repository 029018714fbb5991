//! Outbound Discord delivery through channel webhooks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serenity::all::{
    ChannelId, CreateAllowedMentions, CreateAttachment, CreateEmbed, CreateEmbedAuthor,
    ExecuteWebhook, GuildId, Http, UserId, Webhook,
};
use serenity::model::channel::Channel as DiscordChannel;
use tracing::{debug, info, warn};

use crate::bridge::{reply, PlatformSender};
use crate::common::error::{SendError, SendResult};
use crate::common::{AttachmentSource, OutboundAttachment, QuoteEmbed, SendRequest};
use crate::store::Channel;

/// Sends into bridged channels via their webhooks, impersonating the
/// WhatsApp author.
pub struct DiscordSender {
    http: Arc<Http>,
    webhooks: Mutex<HashMap<String, Webhook>>,
    guilds: Mutex<HashMap<ChannelId, GuildId>>,
}

impl DiscordSender {
    pub fn new(token: &str) -> Self {
        Self::with_http(Arc::new(Http::new(token)))
    }

    pub fn with_http(http: Arc<Http>) -> Self {
        Self {
            http,
            webhooks: Mutex::new(HashMap::new()),
            guilds: Mutex::new(HashMap::new()),
        }
    }

    async fn webhook(&self, url: &str) -> SendResult<Webhook> {
        let cached = self.webhooks.lock().ok().and_then(|cache| cache.get(url).cloned());
        if let Some(webhook) = cached {
            return Ok(webhook);
        }

        let webhook = Webhook::from_url(&self.http, url).await?;
        if let Ok(mut cache) = self.webhooks.lock() {
            cache.insert(url.to_string(), webhook.clone());
        }
        Ok(webhook)
    }

    async fn guild_of(&self, channel_id: ChannelId) -> Option<GuildId> {
        let cached = self.guilds.lock().ok().and_then(|cache| cache.get(&channel_id).copied());
        if cached.is_some() {
            return cached;
        }

        let guild_id = match self.http.get_channel(channel_id).await {
            Ok(DiscordChannel::Guild(channel)) => channel.guild_id,
            Ok(_) => return None,
            Err(e) => {
                warn!(channel = %channel_id, "Failed to look up channel: {}", e);
                return None;
            }
        };
        if let Ok(mut cache) = self.guilds.lock() {
            cache.insert(channel_id, guild_id);
        }
        Some(guild_id)
    }

    async fn attachment(&self, attachment: &OutboundAttachment) -> SendResult<CreateAttachment> {
        match &attachment.source {
            AttachmentSource::Inline(data) => Ok(CreateAttachment::bytes(
                data.to_vec(),
                attachment.filename.clone(),
            )),
            AttachmentSource::Remote(url) => Ok(CreateAttachment::url(&self.http, url).await?),
        }
    }
}

#[async_trait]
impl PlatformSender for DiscordSender {
    async fn send(&self, channel: &Channel, request: &SendRequest) -> SendResult<String> {
        let webhook = self.webhook(&channel.discord_webhook_url).await?;

        let reply_link = match &request.reply_target {
            Some(target) => self.permalink(channel, target).await,
            None => None,
        };

        let mut builder =
            ExecuteWebhook::new().allowed_mentions(allowed_mentions(&request.mention_allow_list));

        if let Some(content) = render_content(request.text.as_deref(), reply_link.as_deref()) {
            builder = builder.content(content);
        }
        if let Some(username) = &request.display_name {
            builder = builder.username(username);
        }
        if let Some(avatar_url) = &request.avatar_url {
            builder = builder.avatar_url(avatar_url);
        }
        if let Some(embed) = &request.embed {
            builder = builder.embed(quote_embed(embed));
        }
        if let Some(attachment) = &request.attachment {
            builder = builder.add_file(self.attachment(attachment).await?);
        }

        let message = webhook
            .execute(&self.http, true, builder)
            .await?
            .ok_or(SendError::MissingMessageId)?;

        info!(
            channel = %channel.discord_id,
            message_id = %message.id,
            "Sent message to Discord"
        );
        Ok(message.id.to_string())
    }

    async fn permalink(&self, channel: &Channel, native_id: &str) -> Option<String> {
        let channel_id = parse_id(&channel.discord_id).map(ChannelId::new)?;
        let guild_id = self.guild_of(channel_id).await?;
        Some(jump_url(guild_id.get(), channel_id.get(), native_id))
    }

    async fn avatar_url(&self, user_id: &str) -> Option<String> {
        let user_id = parse_id(user_id).map(UserId::new)?;
        match self.http.get_user(user_id).await {
            Ok(user) => user.avatar_url(),
            Err(e) => {
                debug!(user = %user_id, "Failed to fetch user: {}", e);
                None
            }
        }
    }
}

fn parse_id(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|id| *id != 0)
}

fn jump_url(guild_id: u64, channel_id: u64, message_id: &str) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild_id, channel_id, message_id
    )
}

/// A reply is shown as a jump link above the text.
fn render_content(text: Option<&str>, reply_link: Option<&str>) -> Option<String> {
    match (text, reply_link) {
        (Some(text), Some(link)) => Some(format!("{}{}", reply::jump_header(link), text)),
        (Some(text), None) => Some(text.to_string()),
        (None, _) => None,
    }
}

/// Only the listed users may be pinged; never roles or everyone.
fn allowed_mentions(allow_list: &[String]) -> CreateAllowedMentions {
    let users: Vec<UserId> = allow_list
        .iter()
        .filter_map(|id| parse_id(id))
        .map(UserId::new)
        .collect();

    CreateAllowedMentions::new()
        .everyone(false)
        .empty_roles()
        .users(users)
}

fn quote_embed(embed: &QuoteEmbed) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(&embed.author_name);
    if let Some(icon_url) = &embed.author_icon_url {
        author = author.icon_url(icon_url);
    }
    if let Some(url) = &embed.url {
        author = author.url(url);
    }

    CreateEmbed::new()
        .author(author)
        .description(&embed.description)
        .colour(embed.colour)
}

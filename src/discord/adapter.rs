//! Discord to WhatsApp bridging.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::mentions::resolve_mentions;
use crate::bridge::{attachment, markup, reply, BridgeContext, TaskQueue, NO_CONTENT};
use crate::common::types::author_flags;
use crate::common::{
    AttachmentKind, AttachmentSource, InboundKind, InboundMessage, OutboundAttachment, Platform,
    PlatformMessageType, SendRequest, StickerOptions,
};
use crate::store::{AuthorDefaults, AuthorKey, NewMessage};

const UNBRIDGEABLE_STICKER: &str = "❌ Unbridgeable sticker";
const STICKER_TEXT: &str = "[sticker]";

/// Feeds Discord gateway events into the Discord queue.
#[derive(Clone)]
pub struct DiscordAdapter {
    ctx: Arc<BridgeContext>,
    queue: TaskQueue,
}

impl DiscordAdapter {
    pub fn new(ctx: Arc<BridgeContext>, queue: TaskQueue) -> Self {
        Self { ctx, queue }
    }

    pub fn handle(&self, message: InboundMessage) {
        let ctx = self.ctx.clone();
        self.queue
            .enqueue(async move { bridge_to_whatsapp(&ctx, message).await });
    }
}

/// Bridge one Discord message into its paired WhatsApp chat.
pub async fn bridge_to_whatsapp(ctx: &BridgeContext, msg: InboundMessage) -> anyhow::Result<()> {
    let Some(channel) = ctx
        .store
        .find_channel_by_native_id(Platform::Discord, &msg.channel_native_id)?
    else {
        debug!(platform = %msg.platform, channel = %msg.channel_native_id, "Channel is not bridged, ignoring");
        return Ok(());
    };

    if let Some(webhook_id) = &msg.webhook_id {
        if channel.is_own_webhook(webhook_id) {
            debug!(message_id = %msg.native_id, "Ignoring echo of our own webhook");
            return Ok(());
        }
    }

    let author = ctx.store.find_or_create_author(
        &AuthorKey::new(Platform::Discord, &msg.author.native_id),
        &AuthorDefaults {
            display_name: msg.author.display_name.clone(),
            flags: if msg.author.is_bot { author_flags::IS_BOT } else { 0 },
        },
    )?;

    let (attachment_kind, attachment_size, media) = match (&msg.sticker, &msg.attachment) {
        (Some(_), _) => (Some(AttachmentKind::Sticker), None, None),
        (None, Some(inbound)) => {
            let kind = attachment::classify(inbound.mime_type.as_deref(), false);
            let media = kind.map(|_| OutboundAttachment {
                filename: inbound
                    .filename
                    .clone()
                    .unwrap_or_else(|| attachment::default_filename(inbound.mime_type.as_deref())),
                mime_type: inbound.mime_type.clone(),
                source: inbound.source.clone(),
            });
            (kind, kind.and(inbound.size), media)
        }
        (None, None) => (None, None, None),
    };

    let message = ctx.store.create_message(&NewMessage {
        author_id: author.id,
        channel_id: channel.id,
        original_platform: Platform::Discord,
        attachment_kind,
        attachment_size,
        content: msg.content.clone(),
    })?;

    let content = if !msg.content.is_empty() {
        msg.content.clone()
    } else {
        msg.embed_description
            .clone()
            .filter(|description| !description.is_empty())
            .unwrap_or_else(|| NO_CONTENT.to_string())
    };
    let mentions = resolve_mentions(ctx, Platform::Discord, &content, &msg.mentions).await?;
    let content = if msg.sticker.is_some() {
        STICKER_TEXT.to_string()
    } else {
        mentions.text
    };

    let (text, origin_kind) = match msg.kind {
        InboundKind::Pinned => (
            format!("📌 *{}* pinned a message", author.display_name),
            PlatformMessageType::System,
        ),
        _ => (
            format!(
                "*<{}>* {}",
                author.display_name,
                markup::translate(&content, markup::DISCORD_TO_WHATSAPP)
            ),
            PlatformMessageType::Message,
        ),
    };

    ctx.record(message.id, Platform::Discord, &msg.native_id, origin_kind)?;

    let mut request = SendRequest::text(text).with_mentions(mentions.allow_list);
    request.attachment = media;

    if matches!(msg.kind, InboundKind::Reply | InboundKind::Pinned) {
        if let Some(quoted) = &msg.quoted {
            let link = reply::link_reply(&ctx.store, Platform::Discord, &quoted.native_id, message.id)?;
            if link.needs_indicator() {
                let quoted_content = if quoted.content.is_empty() {
                    NO_CONTENT
                } else {
                    quoted.content.as_str()
                };
                let preview = reply::preview(
                    &markup::translate(quoted_content, markup::DISCORD_TO_WHATSAPP),
                    ctx.settings.limits.reply_preview_length,
                );
                let indicator = SendRequest::text(reply::whatsapp_indicator(&quoted.author_name, &preview))
                    .with_mentions(request.mention_allow_list.clone());
                let native_id = ctx.whatsapp.send(&channel, &indicator).await?;
                ctx.record(message.id, Platform::WhatsApp, &native_id, PlatformMessageType::ReplyIndicator)?;
            } else {
                request = request.with_reply_target(link.native_target);
            }
        }
    }

    let native_id = ctx
        .send_with_fallback(Platform::WhatsApp, &channel, request)
        .await?;
    ctx.record(message.id, Platform::WhatsApp, &native_id, PlatformMessageType::Message)?;

    if let Some(sticker) = &msg.sticker {
        let sticker_request = match &sticker.image_url {
            Some(url) => SendRequest {
                attachment: Some(OutboundAttachment {
                    filename: format!("{}.png", sticker.name),
                    mime_type: None,
                    source: AttachmentSource::Remote(url.clone()),
                }),
                sticker: Some(StickerOptions {
                    name: sticker.name.clone(),
                    author: sticker.pack_name.clone(),
                    animated_as_gif: true,
                }),
                ..SendRequest::default()
            },
            None => SendRequest::text(UNBRIDGEABLE_STICKER),
        };
        let native_id = ctx
            .send_with_fallback(Platform::WhatsApp, &channel, sticker_request)
            .await?;
        ctx.record(message.id, Platform::WhatsApp, &native_id, PlatformMessageType::Attachment)?;
    }

    info!(
        message_id = message.id,
        author = %author.display_name,
        "Bridged Discord message to WhatsApp"
    );
    Ok(())
}

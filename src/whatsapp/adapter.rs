//! WhatsApp to Discord bridging.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::bridge::mentions::resolve_mentions;
use crate::bridge::reply::ReplyLink;
use crate::bridge::{
    attachment, markup, neutralize_mass_mentions, reply, splitter, username, BridgeContext,
    TaskQueue, NO_CONTENT,
};
use crate::common::{
    AttachmentKind, AttachmentSource, InboundAttachment, InboundMessage, OutboundAttachment,
    Platform, PlatformMessageType, QuoteEmbed, QuotedMessage, SendRequest,
};
use crate::store::{AuthorDefaults, AuthorKey, Channel, NewMessage};

/// Embed colour of a quote whose target came from Discord.
pub const DISCORD_COLOUR: u32 = 0x5865F2;
/// Embed colour of a quote whose target came from WhatsApp.
pub const WHATSAPP_COLOUR: u32 = 0x1BA691;

const ATTACHMENT_TOO_LARGE: &str = ":x: Message attachment is too large.";

/// Feeds sidecar events into the WhatsApp queue.
#[derive(Clone)]
pub struct WhatsAppAdapter {
    ctx: Arc<BridgeContext>,
    queue: TaskQueue,
}

impl WhatsAppAdapter {
    pub fn new(ctx: Arc<BridgeContext>, queue: TaskQueue) -> Self {
        Self { ctx, queue }
    }

    pub fn handle(&self, message: InboundMessage) {
        let ctx = self.ctx.clone();
        self.queue
            .enqueue(async move { bridge_to_discord(&ctx, message).await });
    }
}

struct Media<'a> {
    kind: AttachmentKind,
    inbound: &'a InboundAttachment,
    data: Bytes,
}

/// Download and classify the attachment. A failed download bridges the
/// text alone.
async fn fetch_media<'a>(ctx: &BridgeContext, msg: &'a InboundMessage) -> Option<Media<'a>> {
    let inbound = msg.attachment.as_ref()?;
    let kind = attachment::classify(inbound.mime_type.as_deref(), inbound.is_sticker)?;
    match ctx.download(&inbound.source).await {
        Ok(data) => Some(Media { kind, inbound, data }),
        Err(e) => {
            warn!(message_id = %msg.native_id, "Failed to download media: {:#}", e);
            None
        }
    }
}

/// Bridge one WhatsApp message into its paired Discord channel.
pub async fn bridge_to_discord(ctx: &BridgeContext, msg: InboundMessage) -> anyhow::Result<()> {
    if msg.from_self {
        debug!(message_id = %msg.native_id, "Ignoring message sent by the bridge account");
        return Ok(());
    }

    let Some(channel) = ctx
        .store
        .find_channel_by_native_id(Platform::WhatsApp, &msg.channel_native_id)?
    else {
        debug!(platform = %msg.platform, chat = %msg.channel_native_id, "Chat is not bridged, ignoring");
        return Ok(());
    };

    if ctx
        .store
        .find_platform_message_by_native_id(Platform::WhatsApp, &msg.native_id)?
        .is_some()
    {
        debug!(message_id = %msg.native_id, "Message already bridged");
        return Ok(());
    }

    let author = ctx.store.find_or_create_author(
        &AuthorKey::new(Platform::WhatsApp, &msg.author.native_id),
        &AuthorDefaults {
            display_name: msg.author.display_name.clone(),
            flags: 0,
        },
    )?;

    let media = fetch_media(ctx, &msg).await;
    let attachment_kind = media.as_ref().map(|media| media.kind);

    let message = ctx.store.create_message(&NewMessage {
        author_id: author.id,
        channel_id: channel.id,
        original_platform: Platform::WhatsApp,
        attachment_kind,
        attachment_size: media.as_ref().map(|media| media.data.len() as u64),
        content: msg.content.clone(),
    })?;
    ctx.record(message.id, Platform::WhatsApp, &msg.native_id, PlatformMessageType::Message)?;

    let body = if msg.content.is_empty() {
        NO_CONTENT.to_string()
    } else {
        neutralize_mass_mentions(&msg.content)
    };
    let text = format!("{}{}", attachment::icon(&ctx.settings.icons, attachment_kind), body);
    let mentions = resolve_mentions(ctx, Platform::WhatsApp, &text, &msg.mentions).await?;
    let text = markup::translate(&mentions.text, markup::WHATSAPP_TO_DISCORD);

    let display_name = if ctx.settings.disambiguate_usernames {
        username::encode(&author.display_name, author.id)
    } else {
        author
            .display_name
            .chars()
            .take(username::MAX_USERNAME_CHARS)
            .collect()
    };
    let avatar_url = msg.author.avatar_url.clone();

    let mut reply_target = None;
    if let Some(quoted) = &msg.quoted {
        let link = reply::link_reply(&ctx.store, Platform::WhatsApp, &quoted.native_id, message.id)?;
        if link.needs_indicator() {
            let request = SendRequest {
                embed: Some(quote_embed(ctx, &channel, quoted, &link).await?),
                ..SendRequest::default()
            }
            .as_author(display_name.clone(), avatar_url.clone());
            let native_id = ctx.discord.send(&channel, &request).await?;
            ctx.record(message.id, Platform::Discord, &native_id, PlatformMessageType::ReplyIndicator)?;
        } else {
            reply_target = link.native_target;
        }
    }

    // The jump link counts against the first chunk's length.
    let text = match reply_target {
        Some(target) => match ctx.discord.permalink(&channel, &target).await {
            Some(link) => format!("{}{}", reply::jump_header(&link), text),
            None => text,
        },
        None => text,
    };

    let chunks = splitter::split_chunks(&text, ctx.settings.limits.discord_message_length);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let request = SendRequest::text(chunk)
            .as_author(display_name.clone(), avatar_url.clone())
            .with_mentions(mentions.allow_list.clone());
        let native_id = ctx
            .send_with_fallback(Platform::Discord, &channel, request)
            .await?;
        ctx.record(message.id, Platform::Discord, &native_id, splitter::chunk_kind(index))?;
    }

    if let Err(e) = ctx.whatsapp.mark_read(&channel).await {
        warn!(chat = %channel.whatsapp_id, "Failed to mark chat as read: {}", e);
    }

    if let Some(media) = media {
        let request = if media.data.len() as u64 <= ctx.settings.limits.discord_attachment_bytes {
            let mime_type = media.inbound.mime_type.clone();
            SendRequest {
                attachment: Some(OutboundAttachment {
                    filename: media
                        .inbound
                        .filename
                        .clone()
                        .filter(|filename| !filename.is_empty())
                        .unwrap_or_else(|| attachment::default_filename(mime_type.as_deref())),
                    mime_type,
                    source: AttachmentSource::Inline(media.data),
                }),
                ..SendRequest::default()
            }
        } else {
            debug!(message_id = message.id, size = media.data.len(), "Attachment over the upload limit");
            SendRequest::text(ATTACHMENT_TOO_LARGE)
        };
        let request = request.as_author(display_name.clone(), avatar_url.clone());

        let native_id = ctx
            .send_with_fallback(Platform::Discord, &channel, request)
            .await?;
        ctx.record(message.id, Platform::Discord, &native_id, PlatformMessageType::Attachment)?;
    }

    info!(
        message_id = message.id,
        author = %author.display_name,
        "Bridged WhatsApp message to Discord"
    );
    Ok(())
}

/// Build the embed standing in for a reply whose target has no Discord
/// copy.
async fn quote_embed(
    ctx: &BridgeContext,
    channel: &Channel,
    quoted: &QuotedMessage,
    link: &ReplyLink,
) -> anyhow::Result<QuoteEmbed> {
    let target = link.target.as_ref();
    let from_discord = target.is_some_and(|target| target.original_platform == Platform::Discord);

    let author_name = link
        .target_author
        .as_ref()
        .map(|author| author.display_name.clone())
        .unwrap_or_else(|| quoted.author_name.clone());

    let discord_author = link.target_author.as_ref().and_then(|author| author.discord_id.as_deref());
    let author_icon_url = match discord_author {
        Some(discord_id) if from_discord => ctx.discord.avatar_url(discord_id).await,
        _ => quoted.author_avatar_url.clone(),
    };

    let url = match target {
        Some(target) => {
            let canonical = ctx.store.find_platform_message(
                target.id,
                Platform::Discord,
                &PlatformMessageType::CANONICAL,
            )?;
            match canonical {
                Some(artifact) => ctx.discord.permalink(channel, &artifact.native_id).await,
                None => None,
            }
        }
        None => None,
    };

    let content = match target {
        Some(target) if target.original_platform == Platform::Discord => target.content.clone(),
        Some(target) => markup::translate(&target.content, markup::WHATSAPP_TO_DISCORD),
        None => markup::translate(&quoted.content, markup::WHATSAPP_TO_DISCORD),
    };
    let content = if content.is_empty() {
        NO_CONTENT.to_string()
    } else {
        content
    };

    Ok(QuoteEmbed {
        author_name,
        author_icon_url,
        url,
        description: reply::preview(&content, ctx.settings.limits.reply_preview_length),
        colour: if from_discord {
            DISCORD_COLOUR
        } else {
            WHATSAPP_COLOUR
        },
    })
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::bridge::testing::{harness, Harness};
    use crate::common::{InboundAuthor, InboundKind, Mention};
    use crate::store::NewPlatformMessage;

    fn inbound(native_id: &str, content: &str) -> InboundMessage {
        InboundMessage {
            platform: Platform::WhatsApp,
            native_id: native_id.to_string(),
            channel_native_id: "120363@g.us".to_string(),
            author: InboundAuthor {
                native_id: "316".to_string(),
                display_name: "Bo".to_string(),
                is_bot: false,
                avatar_url: Some("https://pps.whatsapp.net/bo.jpg".to_string()),
            },
            content: content.to_string(),
            kind: InboundKind::Regular,
            attachment: None,
            sticker: None,
            quoted: None,
            mentions: Vec::new(),
            embed_description: None,
            webhook_id: None,
            from_self: false,
        }
    }

    fn with_media(msg: InboundMessage, mime: &str, data: &'static [u8]) -> InboundMessage {
        InboundMessage {
            attachment: Some(InboundAttachment {
                mime_type: Some(mime.to_string()),
                filename: None,
                size: None,
                source: AttachmentSource::Inline(Bytes::from_static(data)),
                is_sticker: false,
            }),
            ..msg
        }
    }

    fn quoting(msg: InboundMessage, quoted_id: &str, content: &str) -> InboundMessage {
        InboundMessage {
            kind: InboundKind::Reply,
            quoted: Some(QuotedMessage {
                native_id: quoted_id.to_string(),
                author_name: "Cy".to_string(),
                author_avatar_url: Some("https://pps.whatsapp.net/cy.jpg".to_string()),
                content: content.to_string(),
            }),
            ..msg
        }
    }

    fn kinds(h: &Harness, message_id: i64, platform: Platform) -> Vec<PlatformMessageType> {
        h.ctx
            .store
            .platform_messages_for(message_id)
            .unwrap()
            .into_iter()
            .filter(|pm| pm.platform == platform)
            .map(|pm| pm.kind)
            .collect()
    }

    fn last_message_id(h: &Harness) -> i64 {
        h.ctx
            .store
            .with_conn(|conn| Ok(conn.query_row("SELECT MAX(id) FROM messages", [], |row| row.get(0))?))
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_message() {
        let h = harness();
        bridge_to_discord(&h.ctx, inbound("w1", "*hi* ~there~ @everyone")).await.unwrap();

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].request.text.as_deref(),
            Some("**hi** ~~there~~ @\u{200B}everyone")
        );
        assert_eq!(sent[0].request.display_name.as_deref(), Some("Bo"));
        assert_eq!(
            sent[0].request.avatar_url.as_deref(),
            Some("https://pps.whatsapp.net/bo.jpg")
        );
        assert_eq!(*h.whatsapp.marked_read.lock().unwrap(), vec![h.channel.id]);

        let id = last_message_id(&h);
        assert_eq!(kinds(&h, id, Platform::WhatsApp), vec![PlatformMessageType::Message]);
        assert_eq!(kinds(&h, id, Platform::Discord), vec![PlatformMessageType::Message]);
    }

    #[tokio::test]
    async fn test_self_and_unbridged_ignored() {
        let h = harness();
        let own = InboundMessage {
            from_self: true,
            ..inbound("w1", "echo")
        };
        bridge_to_discord(&h.ctx, own).await.unwrap();

        let elsewhere = InboundMessage {
            channel_native_id: "999@g.us".to_string(),
            ..inbound("w2", "elsewhere")
        };
        bridge_to_discord(&h.ctx, elsewhere).await.unwrap();

        assert!(h.discord.sent().is_empty());
        assert_eq!(h.ctx.store.count_messages_by_platform(Platform::WhatsApp).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_bridged_once() {
        let h = harness();
        assert_ok!(bridge_to_discord(&h.ctx, inbound("w1", "once")).await);
        assert_ok!(bridge_to_discord(&h.ctx, inbound("w1", "once")).await);

        assert_eq!(h.discord.sent().len(), 1);
        assert_eq!(h.ctx.store.count_messages_by_platform(Platform::WhatsApp).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_long_message_split() {
        let h = harness();
        bridge_to_discord(&h.ctx, inbound("w1", &"a".repeat(4001))).await.unwrap();

        let sent = h.discord.sent();
        let lengths: Vec<usize> = sent
            .iter()
            .map(|s| s.request.text.as_deref().unwrap().chars().count())
            .collect();
        assert_eq!(lengths, vec![2000, 2000, 1]);
        assert_eq!(
            kinds(&h, last_message_id(&h), Platform::Discord),
            vec![
                PlatformMessageType::Message,
                PlatformMessageType::SplitMessage,
                PlatformMessageType::SplitMessage,
            ]
        );
    }

    #[tokio::test]
    async fn test_image_uploaded_after_text() {
        let h = harness();
        bridge_to_discord(&h.ctx, with_media(inbound("w1", ""), "image/jpeg", b"jpeg"))
            .await
            .unwrap();

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].request.text.as_deref(), Some("🖼️ [no content]"));
        let attachment = sent[1].request.attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "file.jpeg");
        assert!(sent[1].request.text.is_none());

        let id = last_message_id(&h);
        assert_eq!(
            kinds(&h, id, Platform::Discord),
            vec![PlatformMessageType::Message, PlatformMessageType::Attachment]
        );
        let stored = h.ctx.store.find_message(id).unwrap().unwrap();
        assert_eq!(stored.attachment_kind, Some(AttachmentKind::Image));
        assert_eq!(stored.attachment_size, Some(4));
        assert_eq!(h.ctx.store.sum_attachment_sizes().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_oversized_attachment_notice() {
        let mut h = harness();
        h.ctx.settings.limits.discord_attachment_bytes = 3;
        bridge_to_discord(&h.ctx, with_media(inbound("w1", "doc"), "application/pdf", b"pdfdata"))
            .await
            .unwrap();

        let sent = h.discord.sent();
        assert_eq!(sent[0].request.text.as_deref(), Some("📄 doc"));
        assert_eq!(
            sent[1].request.text.as_deref(),
            Some(":x: Message attachment is too large.")
        );
        assert!(sent[1].request.attachment.is_none());
        assert_eq!(
            kinds(&h, last_message_id(&h), Platform::Discord),
            vec![PlatformMessageType::Message, PlatformMessageType::Attachment]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_retried_as_notice() {
        let h = harness();
        *h.discord.reject_attachments.lock().unwrap() = true;
        bridge_to_discord(&h.ctx, with_media(inbound("w1", "clip"), "video/mp4", b"mp4"))
            .await
            .unwrap();

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].request.text.as_deref(), Some("🎞️ clip"));
        assert!(sent[1].request.attachment.is_none());
        assert_eq!(sent[1].request.text.as_deref(), Some("❌ Attachment upload failed"));
        assert_eq!(
            kinds(&h, last_message_id(&h), Platform::Discord),
            vec![PlatformMessageType::Message, PlatformMessageType::Attachment]
        );
    }

    #[tokio::test]
    async fn test_reply_to_bridged_message_is_native() {
        let h = harness();
        bridge_to_discord(&h.ctx, inbound("w1", "question")).await.unwrap();
        let target_id = last_message_id(&h);

        bridge_to_discord(&h.ctx, quoting(inbound("w2", "answer"), "w1", "question"))
            .await
            .unwrap();
        let reply_id = last_message_id(&h);

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].request.text.as_deref(),
            Some("↪ <https://discord.com/channels/1/100/d1>\nanswer")
        );
        assert!(sent[1].request.reply_target.is_none());
        assert!(sent[1].request.embed.is_none());
        assert_eq!(
            h.ctx.store.find_message(reply_id).unwrap().unwrap().reply_to_id,
            Some(target_id)
        );
    }

    #[tokio::test]
    async fn test_long_reply_chunks_fit_with_jump_link() {
        let h = harness();
        bridge_to_discord(&h.ctx, inbound("w1", "question")).await.unwrap();
        bridge_to_discord(&h.ctx, quoting(inbound("w2", &"z".repeat(2500)), "w1", "question"))
            .await
            .unwrap();
        let reply_id = last_message_id(&h);

        let sent = h.discord.sent();
        let chunks: Vec<&str> = sent[1..]
            .iter()
            .map(|s| s.request.text.as_deref().unwrap())
            .collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("↪ <https://discord.com/channels/1/100/d1>\n"));
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 2000));
        assert_eq!(chunks.concat().matches('z').count(), 2500);
        assert_eq!(
            kinds(&h, reply_id, Platform::Discord),
            vec![PlatformMessageType::Message, PlatformMessageType::SplitMessage]
        );
    }

    #[tokio::test]
    async fn test_reply_to_unknown_message_sends_quote_embed() {
        let h = harness();
        bridge_to_discord(
            &h.ctx,
            quoting(inbound("w2", "answer"), "w-old", &format!("*bold* {}", "x".repeat(60))),
        )
        .await
        .unwrap();
        let reply_id = last_message_id(&h);

        let sent = h.discord.sent();
        assert_eq!(sent.len(), 2);
        let embed = sent[0].request.embed.as_ref().unwrap();
        assert_eq!(embed.author_name, "Cy");
        assert_eq!(embed.colour, WHATSAPP_COLOUR);
        assert_eq!(embed.author_icon_url.as_deref(), Some("https://pps.whatsapp.net/cy.jpg"));
        assert_eq!(embed.url, None);
        assert_eq!(
            embed.description,
            format!("**bold** {}...", "x".repeat(41))
        );
        assert_eq!(sent[0].request.display_name.as_deref(), Some("Bo"));
        assert!(sent[1].request.reply_target.is_none());
        assert_eq!(
            kinds(&h, reply_id, Platform::Discord),
            vec![PlatformMessageType::ReplyIndicator, PlatformMessageType::Message]
        );
    }

    #[tokio::test]
    async fn test_quote_of_discord_message_without_canonical_copy() {
        let h = harness();
        let discord_author = h
            .ctx
            .store
            .find_or_create_author(
                &AuthorKey::new(Platform::Discord, "42"),
                &AuthorDefaults {
                    display_name: "Ann".to_string(),
                    flags: 0,
                },
            )
            .unwrap();
        // A pin notification: SYSTEM on Discord, only a reply indicator on WhatsApp.
        let target = h
            .ctx
            .store
            .create_message(&NewMessage {
                author_id: discord_author.id,
                channel_id: h.channel.id,
                original_platform: Platform::Discord,
                attachment_kind: None,
                attachment_size: None,
                content: "**pinned** text".to_string(),
            })
            .unwrap();
        for (platform, native_id, kind) in [
            (Platform::Discord, "d-pin", PlatformMessageType::System),
            (Platform::WhatsApp, "w-ind", PlatformMessageType::ReplyIndicator),
        ] {
            h.ctx
                .store
                .create_platform_message(&NewPlatformMessage {
                    message_id: target.id,
                    platform,
                    native_id: native_id.to_string(),
                    kind,
                })
                .unwrap();
        }

        bridge_to_discord(&h.ctx, quoting(inbound("w2", "seen"), "w-ind", "ignored"))
            .await
            .unwrap();

        let sent = h.discord.sent();
        let embed = sent[0].request.embed.as_ref().unwrap();
        assert_eq!(embed.author_name, "Ann");
        assert_eq!(embed.colour, DISCORD_COLOUR);
        assert_eq!(embed.author_icon_url.as_deref(), Some("https://cdn.example/avatars/42.png"));
        assert_eq!(embed.url.as_deref(), Some("https://discord.com/channels/1/100/d-pin"));
        assert_eq!(embed.description, "**pinned** text");
    }

    #[tokio::test]
    async fn test_mentions_and_disambiguation() {
        let mut h = harness();
        h.ctx.settings.disambiguate_usernames = true;
        h.ctx
            .store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO authors (discord_id, whatsapp_id, display_name) VALUES ('42', '317', 'Ann')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let msg = InboundMessage {
            mentions: vec![
                Mention {
                    native_id: "317".to_string(),
                    display_name: "ann".to_string(),
                },
                Mention {
                    native_id: "318".to_string(),
                    display_name: "Dee".to_string(),
                },
            ],
            ..inbound("w1", "@317 meet @318")
        };
        bridge_to_discord(&h.ctx, msg).await.unwrap();

        let sent = h.discord.sent();
        assert_eq!(sent[0].request.text.as_deref(), Some("<@42> meet **@Dee**"));
        assert_eq!(sent[0].request.mention_allow_list, vec!["42".to_string()]);

        let author = h
            .ctx
            .store
            .find_author_by_native_id(Platform::WhatsApp, "316")
            .unwrap()
            .unwrap();
        let name = sent[0].request.display_name.as_deref().unwrap();
        assert!(name.starts_with("Bo"));
        assert_eq!(username::decode(name), Some(author.id));
    }
}

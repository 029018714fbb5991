//! Event listener for incoming WhatsApp messages.
//!
//! Long-polls the sidecar's `/events/poll` endpoint and hands messages to
//! the [`WhatsAppAdapter`]. When the sidecar reports a fresh connection,
//! unread messages are fetched and replayed oldest first.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::adapter::WhatsAppAdapter;
use super::client::WhatsAppSender;
use crate::common::{
    AttachmentSource, InboundAttachment, InboundAuthor, InboundKind, InboundMessage, Mention,
    Platform, QuotedMessage,
};

/// Long-poll timeout for the HTTP client (seconds).
const POLL_TIMEOUT_SECS: u64 = 60;

/// Maximum reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// An incoming event from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhatsAppEvent {
    /// A new message was received (or sent by us).
    Message(WhatsAppMessage),
    /// WhatsApp connection established.
    Connected,
    /// WhatsApp connection lost.
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// A WhatsApp message as the sidecar reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    /// Serialized message id.
    pub id: String,
    /// Chat JID.
    pub chat_id: String,
    /// Sender JID.
    pub author: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// `chat`, `image`, `sticker`, ...
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub quoted: Option<WhatsAppQuote>,
    #[serde(default)]
    pub mentions: Vec<WhatsAppContact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppQuote {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppContact {
    /// Contact JID or bare phone number.
    pub id: String,
    #[serde(default)]
    pub push_name: Option<String>,
}

/// Phone number part of a JID (`31600000000@c.us` -> `31600000000`).
pub fn phone_number(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Convert a sidecar message into a bridge event.
pub fn to_inbound(message: &WhatsAppMessage, base_url: &str) -> InboundMessage {
    let number = phone_number(&message.author);

    let attachment = message.has_media.then(|| InboundAttachment {
        mime_type: message.mime_type.clone(),
        filename: message.filename.clone(),
        size: None,
        source: AttachmentSource::Remote(format!("{}/media/{}", base_url, message.id)),
        is_sticker: message.message_type == "sticker",
    });

    let quoted = message.quoted.as_ref().map(|quote| QuotedMessage {
        native_id: quote.id.clone(),
        author_name: quote
            .push_name
            .clone()
            .unwrap_or_else(|| phone_number(&quote.author).to_string()),
        author_avatar_url: quote.avatar_url.clone(),
        content: quote.body.clone(),
    });

    let mentions = message
        .mentions
        .iter()
        .map(|contact| {
            let number = phone_number(&contact.id);
            Mention {
                native_id: number.to_string(),
                display_name: contact.push_name.clone().unwrap_or_else(|| number.to_string()),
            }
        })
        .collect();

    InboundMessage {
        platform: Platform::WhatsApp,
        native_id: message.id.clone(),
        channel_native_id: message.chat_id.clone(),
        author: InboundAuthor {
            native_id: number.to_string(),
            display_name: message.push_name.clone().unwrap_or_else(|| number.to_string()),
            is_bot: false,
            avatar_url: message.avatar_url.clone(),
        },
        content: message.body.clone(),
        kind: if quoted.is_some() {
            InboundKind::Reply
        } else {
            InboundKind::Regular
        },
        attachment,
        sticker: None,
        quoted,
        mentions,
        embed_description: None,
        webhook_id: None,
        from_self: message.from_me,
    }
}

fn oldest_first(mut messages: Vec<WhatsAppMessage>) -> Vec<WhatsAppMessage> {
    messages.sort_by_key(|message| message.timestamp);
    messages
}

/// 1s initial, 30s max, with jitter, unlimited retries.
fn poll_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(MAX_BACKOFF)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Feeds sidecar events into the WhatsApp queue until shutdown.
pub struct WhatsAppListener {
    sender: Arc<WhatsAppSender>,
    adapter: WhatsAppAdapter,
    shutdown_rx: watch::Receiver<bool>,
}

impl WhatsAppListener {
    pub fn new(
        sender: Arc<WhatsAppSender>,
        adapter: WhatsAppAdapter,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sender,
            adapter,
            shutdown_rx,
        }
    }

    pub async fn run(self) {
        let poll_url = format!("{}/events/poll", self.sender.base_url());
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut backoff = poll_backoff();

        loop {
            info!(url = %poll_url, "Connecting to WhatsApp event stream");

            let mut received = false;
            let result = tokio::select! {
                result = self.poll_events(&poll_url, &mut received) => result,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if received {
                backoff = poll_backoff();
            }
            if let Err(e) = result {
                let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                warn!(error = %e, "WhatsApp event stream error, reconnecting in {:.1}s", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
        }
        info!("WhatsApp task ended");
    }

    /// Poll in a loop. Returns on non-timeout network errors so the caller
    /// can reconnect with backoff.
    async fn poll_events(&self, poll_url: &str, received: &mut bool) -> anyhow::Result<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
            .build()?;

        loop {
            match client.get(poll_url).send().await {
                Ok(response) if response.status().is_success() => {
                    let events = response.json::<Vec<WhatsAppEvent>>().await?;
                    *received = true;
                    for event in events {
                        self.dispatch(event).await;
                    }
                }
                Ok(response) => {
                    debug!(status = %response.status(), "Event poll returned non-200");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                // Long-poll timeout expired, poll again.
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn dispatch(&self, event: WhatsAppEvent) {
        match event {
            WhatsAppEvent::Message(message) => {
                debug!(message_id = %message.id, chat = %message.chat_id, "Received WhatsApp message");
                self.adapter
                    .handle(to_inbound(&message, self.sender.base_url()));
            }
            WhatsAppEvent::Connected => {
                info!("WhatsApp connected");
                self.catch_up().await;
            }
            WhatsAppEvent::Disconnected { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "WhatsApp disconnected");
            }
        }
    }

    async fn catch_up(&self) {
        let messages = match self.sender.unread().await {
            Ok(messages) => oldest_first(messages),
            Err(e) => {
                warn!("Failed to fetch unread messages: {}", e);
                return;
            }
        };
        if !messages.is_empty() {
            info!("Catching up on {} unread message(s)", messages.len());
        }
        for message in &messages {
            self.adapter
                .handle(to_inbound(message, self.sender.base_url()));
        }
    }
}

//! Bridging engine shared by both platform adapters.
//!
//! ## Module Structure
//!
//! - `queue`: per-platform FIFO task runner
//! - `markup`: emphasis conversion between the two dialects
//! - `attachment`: MIME classification and attachment icons
//! - `mentions`: cross-platform mention rewriting
//! - `reply`: reply linkage and reply indicators
//! - `splitter`: length-limited chunking
//! - `username`: invisible author suffixes for webhook names

pub mod attachment;
pub mod markup;
pub mod mentions;
pub mod queue;
pub mod reply;
pub mod splitter;
pub mod username;

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::common::error::SendResult;
use crate::common::{AttachmentSource, Platform, PlatformMessageType, SendRequest};
use crate::config::types::{AttachmentIcons, Config, LimitsConfig};
use crate::store::{Channel, Database, NewPlatformMessage, PlatformMessage};

pub use queue::TaskQueue;

/// Text used when a message has nothing else to show.
pub const NO_CONTENT: &str = "[no content]";

/// Appended to a message whose attachment could not be delivered.
pub const ATTACHMENT_FAILED: &str = "❌ Attachment upload failed";

/// Outbound side of one platform.
#[async_trait]
pub trait PlatformSender: Send + Sync {
    /// Deliver one message into the channel's room on this platform and
    /// return the native id of what was created.
    async fn send(&self, channel: &Channel, request: &SendRequest) -> SendResult<String>;

    /// Resolve a stored native user id to the id this platform wants in a
    /// mention list. `None` when the user is unreachable.
    async fn resolve_contact(&self, native_id: &str) -> SendResult<Option<String>> {
        Ok(Some(native_id.to_string()))
    }

    /// Acknowledge everything in the room as read.
    async fn mark_read(&self, _channel: &Channel) -> SendResult<()> {
        Ok(())
    }

    /// A link that opens the given artifact.
    async fn permalink(&self, _channel: &Channel, _native_id: &str) -> Option<String> {
        None
    }

    /// Profile picture of a user on this platform.
    async fn avatar_url(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// Deployment settings the bridging tasks read.
#[derive(Debug, Clone, Default)]
pub struct BridgeSettings {
    pub icons: AttachmentIcons,
    pub limits: LimitsConfig,
    pub disambiguate_usernames: bool,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            icons: config.attachment_icons.clone(),
            limits: config.limits.clone(),
            disambiguate_usernames: config.discord.disambiguate_usernames,
        }
    }
}

/// Everything a bridging task needs: the store and both senders.
pub struct BridgeContext {
    pub store: Arc<Database>,
    pub discord: Arc<dyn PlatformSender>,
    pub whatsapp: Arc<dyn PlatformSender>,
    pub settings: BridgeSettings,
    http: reqwest::Client,
}

impl BridgeContext {
    pub fn new(
        store: Arc<Database>,
        discord: Arc<dyn PlatformSender>,
        whatsapp: Arc<dyn PlatformSender>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            store,
            discord,
            whatsapp,
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub fn sender_for(&self, platform: Platform) -> &dyn PlatformSender {
        match platform {
            Platform::Discord => self.discord.as_ref(),
            Platform::WhatsApp => self.whatsapp.as_ref(),
        }
    }

    /// Record one platform artifact of a logical message.
    pub fn record(
        &self,
        message_id: i64,
        platform: Platform,
        native_id: &str,
        kind: PlatformMessageType,
    ) -> anyhow::Result<PlatformMessage> {
        let record = self
            .store
            .create_platform_message(&NewPlatformMessage {
                message_id,
                platform,
                native_id: native_id.to_string(),
                kind,
            })
            .with_context(|| format!("recording {} {} {}", platform, kind.as_str(), native_id))?;
        Ok(record)
    }

    /// Send through `platform`, retrying once when the first attempt fails.
    /// A retried attachment or sticker is stripped and replaced by a failure
    /// notice; a text-only request is retried as is.
    pub async fn send_with_fallback(
        &self,
        platform: Platform,
        channel: &Channel,
        request: SendRequest,
    ) -> anyhow::Result<String> {
        let sender = self.sender_for(platform);
        match sender.send(channel, &request).await {
            Ok(native_id) => Ok(native_id),
            Err(e) => {
                warn!(%platform, channel = channel.id, "Send failed, retrying without attachment: {}", e);
                let retry = without_attachment(request);
                let native_id = sender
                    .send(channel, &retry)
                    .await
                    .with_context(|| format!("sending to {} without attachment", platform))?;
                Ok(native_id)
            }
        }
    }

    /// Fetch attachment bytes.
    pub async fn download(&self, source: &AttachmentSource) -> anyhow::Result<Bytes> {
        match source {
            AttachmentSource::Inline(data) => Ok(data.clone()),
            AttachmentSource::Remote(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("downloading {}", url))?
                    .error_for_status()?;
                Ok(response.bytes().await?)
            }
        }
    }
}

fn without_attachment(mut request: SendRequest) -> SendRequest {
    if request.attachment.is_none() && request.sticker.is_none() {
        return request;
    }
    request.attachment = None;
    request.sticker = None;
    request.text = Some(match request.text.take() {
        Some(text) => format!("{}\n\n{}", text, ATTACHMENT_FAILED),
        None => ATTACHMENT_FAILED.to_string(),
    });
    request
}

/// Break `@everyone` and `@here` so they cannot ping.
pub fn neutralize_mass_mentions(text: &str) -> String {
    text.replace("@everyone", "@\u{200B}everyone")
        .replace("@here", "@\u{200B}here")
}


#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_neutralize_mass_mentions() {
        assert_eq!(
            neutralize_mass_mentions("hey @everyone and @here"),
            "hey @\u{200B}everyone and @\u{200B}here"
        );
        assert_eq!(neutralize_mass_mentions("@someone"), "@someone");
    }

    #[test]
    fn test_without_attachment_annotates() {
        let mut request = SendRequest::text("hello");
        request.attachment = Some(crate::common::OutboundAttachment {
            filename: "a.png".to_string(),
            mime_type: Some("image/png".to_string()),
            source: AttachmentSource::Inline(Bytes::from_static(b"png")),
        });
        let retry = without_attachment(request);
        assert!(retry.attachment.is_none());
        assert_eq!(retry.text.as_deref(), Some("hello\n\n❌ Attachment upload failed"));

        let bare = without_attachment(SendRequest {
            attachment: Some(crate::common::OutboundAttachment {
                filename: "a.png".to_string(),
                mime_type: None,
                source: AttachmentSource::Inline(Bytes::from_static(b"png")),
            }),
            ..SendRequest::default()
        });
        assert_eq!(bare.text.as_deref(), Some("❌ Attachment upload failed"));
    }

    #[test]
    fn test_text_only_retry_is_unchanged() {
        let retry = without_attachment(SendRequest::text("hello"));
        assert_eq!(retry.text.as_deref(), Some("hello"));
        assert!(retry.attachment.is_none());
    }

    #[tokio::test]
    async fn test_send_with_fallback_retries_once() {
        let h = testing::harness();
        h.whatsapp.fail_next(1);
        let native_id = assert_ok!(
            h.ctx
                .send_with_fallback(Platform::WhatsApp, &h.channel, SendRequest::text("hi"))
                .await
        );
        assert_eq!(native_id, "w1");
        assert_eq!(h.whatsapp.sent()[0].request.text.as_deref(), Some("hi"));

        h.whatsapp.fail_next(2);
        assert_err!(
            h.ctx
                .send_with_fallback(Platform::WhatsApp, &h.channel, SendRequest::text("hi"))
                .await
        );
    }

    #[tokio::test]
    async fn test_download_inline() {
        let h = testing::harness();
        let data = h
            .ctx
            .download(&AttachmentSource::Inline(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        assert_eq!(&data[..], b"abc");
    }
}

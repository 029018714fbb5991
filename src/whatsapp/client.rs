//! HTTP client for the WhatsApp sidecar.
//!
//! The sidecar owns the WhatsApp Web session. Every outbound operation is a
//! JSON request against it, answered with a `{ success, data, error }`
//! envelope.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::events::WhatsAppMessage;
use crate::bridge::PlatformSender;
use crate::common::error::{SendError, SendResult};
use crate::common::{AttachmentSource, SendRequest};
use crate::store::Channel;

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout. Media uploads go through the same client.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Response envelope from the sidecar HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: String,
}

#[derive(Deserialize)]
struct ContactInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quoted_message_id: Option<&'a str>,
    mentions: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sticker: Option<StickerBody<'a>>,
}

#[derive(Debug, Serialize)]
struct MediaBody<'a> {
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    /// Base64 payload for bytes we already hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    /// Location the sidecar downloads itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StickerBody<'a> {
    name: &'a str,
    author: &'a str,
    animated_as_gif: bool,
}

fn send_body<'a>(chat_id: &'a str, request: &'a SendRequest) -> SendBody<'a> {
    let media = request.attachment.as_ref().map(|attachment| {
        let (data, url) = match &attachment.source {
            AttachmentSource::Inline(bytes) => {
                (Some(base64::engine::general_purpose::STANDARD.encode(bytes)), None)
            }
            AttachmentSource::Remote(url) => (None, Some(url.as_str())),
        };
        MediaBody {
            filename: &attachment.filename,
            mime_type: attachment.mime_type.as_deref(),
            data,
            url,
        }
    });

    SendBody {
        chat_id,
        text: request.text.as_deref(),
        quoted_message_id: request.reply_target.as_deref(),
        mentions: &request.mention_allow_list,
        media,
        sticker: request.sticker.as_ref().map(|sticker| StickerBody {
            name: &sticker.name,
            author: &sticker.author,
            animated_as_gif: sticker.animated_as_gif,
        }),
    }
}

/// Unwrap the sidecar envelope, turning failures into [`SendError::Rejected`].
async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> SendResult<Option<T>> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<BridgeResponse<serde_json::Value>>(&text)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or(text);
        return Err(SendError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let body: BridgeResponse<T> = response.json().await?;
    if !body.success {
        return Err(SendError::Rejected {
            status: status.as_u16(),
            message: body.error.unwrap_or_else(|| "request failed".to_string()),
        });
    }
    Ok(body.data)
}

/// Client for the WhatsApp sidecar.
pub struct WhatsAppSender {
    client: reqwest::Client,
    base_url: String,
}

impl WhatsAppSender {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Messages that arrived while the bridge was away.
    pub async fn unread(&self) -> SendResult<Vec<WhatsAppMessage>> {
        let url = format!("{}/unread", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(read_response(response).await?.unwrap_or_default())
    }
}

#[async_trait]
impl PlatformSender for WhatsAppSender {
    async fn send(&self, channel: &Channel, request: &SendRequest) -> SendResult<String> {
        let url = format!("{}/send", self.base_url);
        let body = send_body(&channel.whatsapp_id, request);
        let response = self.client.post(&url).json(&body).send().await?;

        let sent: SentMessage = read_response(response)
            .await?
            .ok_or(SendError::MissingMessageId)?;

        info!(
            chat = %channel.whatsapp_id,
            message_id = %sent.message_id,
            "Sent message to WhatsApp"
        );
        Ok(sent.message_id)
    }

    async fn resolve_contact(&self, native_id: &str) -> SendResult<Option<String>> {
        let url = format!("{}/contacts/{}", self.base_url, native_id);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(number = native_id, "Contact not found");
            return Ok(None);
        }
        let contact: Option<ContactInfo> = read_response(response).await?;
        Ok(contact.map(|contact| contact.id))
    }

    async fn mark_read(&self, channel: &Channel) -> SendResult<()> {
        let url = format!("{}/mark-read", self.base_url);
        let body = serde_json::json!({ "chat_id": channel.whatsapp_id });
        let response = self.client.post(&url).json(&body).send().await?;
        read_response::<serde_json::Value>(response).await?;
        Ok(())
    }
}

//! Evolution API types for webhook payloads and outbound requests.
//!
//! Reference: https://doc.evolution-api.com/v1/api-reference

use serde::{Deserialize, Serialize};

/// Root webhook payload posted by Evolution API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    /// Event name, e.g. `messages.upsert` (v1) or `MESSAGES_UPSERT` (v2).
    #[serde(default)]
    pub event: Option<String>,
    /// Instance that received the event.
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<MessageData>,
}

impl WebhookEnvelope {
    /// Whether this envelope carries a new inbound message.
    ///
    /// A missing event name is treated as an upsert; some proxies strip it.
    pub fn is_message_upsert(&self) -> bool {
        match self.event.as_deref() {
            None => true,
            Some(event) => event.replace('_', ".").eq_ignore_ascii_case("messages.upsert"),
        }
    }
}

/// The `data` object of a `messages.upsert` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub key: Option<MessageKey>,
    /// Display name the sender set in WhatsApp.
    pub push_name: Option<String>,
    pub message: Option<MessageContent>,
    /// e.g. `conversation`, `audioMessage`, `imageMessage`.
    pub message_type: Option<String>,
    pub message_timestamp: Option<i64>,
}

/// Identifies a message and its chat.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat JID, e.g. `5581999999999@s.whatsapp.net` or `...@g.us`.
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    pub id: Option<String>,
    /// Sender inside a group chat.
    pub participant: Option<String>,
}

/// Message body. Exactly one of the content fields is normally set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text_message: Option<ExtendedTextMessage>,
    pub image_message: Option<ImageMessage>,
    pub audio_message: Option<AudioMessage>,
    /// Decrypted media, present when the instance has `webhook_base64` enabled.
    pub base64: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedTextMessage {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageMessage {
    pub url: Option<String>,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioMessage {
    pub url: Option<String>,
    pub mimetype: Option<String>,
    pub seconds: Option<u32>,
    /// Voice note (push-to-talk) rather than an audio file.
    #[serde(default)]
    pub ptt: bool,
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Delivery options shared by every send endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SendOptions {
    /// Milliseconds the transport shows `presence` before sending.
    pub delay: u64,
    pub presence: &'static str,
}

impl SendOptions {
    pub fn composing(delay: u64) -> Self {
        Self {
            delay,
            presence: "composing",
        }
    }
}

/// Body for `POST /message/sendText/{instance}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    pub number: String,
    pub options: SendOptions,
    pub text_message: TextMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextMessage {
    pub text: String,
}

impl SendTextRequest {
    pub fn new(number: impl Into<String>, text: impl Into<String>, delay: u64) -> Self {
        Self {
            number: number.into(),
            options: SendOptions::composing(delay),
            text_message: TextMessage { text: text.into() },
        }
    }
}

/// Body for `POST /message/sendMedia/{instance}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    pub number: String,
    pub options: SendOptions,
    pub media_message: MediaMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaMessage {
    /// `image`, `video` or `document`.
    pub mediatype: &'static str,
    /// Public URL of the media.
    pub media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Body for `POST /instance/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub instance_name: String,
    pub qrcode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

//! Turn Evolution webhook envelopes into customer messages.

use crate::types::{MessageContent, WebhookEnvelope};

const USER_JID_SUFFIX: &str = "@s.whatsapp.net";
const GROUP_JID_SUFFIX: &str = "@g.us";

/// What the customer sent, before any media understanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    Image {
        caption: Option<String>,
        /// Base64 image bytes, when the instance forwards media inline.
        data: Option<String>,
        url: Option<String>,
        mime_type: String,
    },
    Audio {
        data: Option<String>,
        url: Option<String>,
        mime_type: String,
    },
}

/// A message from a customer, addressed by phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub customer_id: String,
    pub push_name: Option<String>,
    pub message_id: Option<String>,
    pub content: InboundContent,
}

/// Why a well-formed webhook produced nothing to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAnUpsert,
    FromMe,
    Group,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAnUpsert => "event is not messages.upsert",
            Self::FromMe => "message sent by this instance",
            Self::Group => "group messages are not handled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Message(InboundMessage),
    Ignored(IgnoreReason),
}

/// A webhook that cannot be turned into a customer message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("invalid webhook payload: missing data.key or data.message")]
    MissingFields,
    #[error("unsupported message type: {0}")]
    Unsupported(String),
    #[error("message has no text")]
    EmptyText,
}

/// Classify a webhook envelope.
pub fn parse_webhook(envelope: WebhookEnvelope) -> Result<WebhookOutcome, WebhookError> {
    if !envelope.is_message_upsert() {
        return Ok(WebhookOutcome::Ignored(IgnoreReason::NotAnUpsert));
    }

    let data = envelope.data.ok_or(WebhookError::MissingFields)?;
    let (Some(key), Some(message)) = (data.key, data.message) else {
        return Err(WebhookError::MissingFields);
    };

    if key.from_me {
        return Ok(WebhookOutcome::Ignored(IgnoreReason::FromMe));
    }
    if key.remote_jid.ends_with(GROUP_JID_SUFFIX) {
        return Ok(WebhookOutcome::Ignored(IgnoreReason::Group));
    }

    let customer_id = customer_id_from_jid(&key.remote_jid);
    if customer_id.is_empty() {
        return Err(WebhookError::MissingFields);
    }

    let content = classify(message, data.message_type.as_deref())?;

    Ok(WebhookOutcome::Message(InboundMessage {
        customer_id,
        push_name: data.push_name.filter(|n| !n.trim().is_empty()),
        message_id: key.id,
        content,
    }))
}

/// Strip the JID server part and any device suffix: `5581...:12@s.whatsapp.net` → `5581...`.
pub fn customer_id_from_jid(jid: &str) -> String {
    let user = jid.strip_suffix(USER_JID_SUFFIX).unwrap_or(jid);
    let user = user.split('@').next().unwrap_or(user);
    user.split(':').next().unwrap_or(user).trim().to_string()
}

fn classify(message: MessageContent, message_type: Option<&str>) -> Result<InboundContent, WebhookError> {
    if let Some(audio) = message.audio_message {
        return Ok(InboundContent::Audio {
            data: message.base64,
            url: audio.url,
            mime_type: audio.mimetype.unwrap_or_else(|| "audio/ogg".into()),
        });
    }

    if let Some(image) = message.image_message {
        return Ok(InboundContent::Image {
            caption: image.caption.filter(|c| !c.trim().is_empty()),
            data: message.base64,
            url: image.url,
            mime_type: image.mimetype.unwrap_or_else(|| "image/jpeg".into()),
        });
    }

    let text = message
        .conversation
        .or_else(|| message.extended_text_message.and_then(|m| m.text));

    match text {
        Some(text) if !text.trim().is_empty() => Ok(InboundContent::Text(text)),
        Some(_) => Err(WebhookError::EmptyText),
        None => Err(WebhookError::Unsupported(
            message_type.unwrap_or("unknown").to_string(),
        )),
    }
}

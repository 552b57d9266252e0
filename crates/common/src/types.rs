use serde::{Deserialize, Serialize};

/// Kind of content a customer message originally carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    /// Parse a stored label, defaulting to text for anything unknown.
    pub fn from_label(label: &str) -> Self {
        match label {
            "image" => Self::Image,
            "audio" => Self::Audio,
            _ => Self::Text,
        }
    }
}

/// A customer message after transport-specific normalization.
///
/// `text` already contains the transcription (audio) or the description and
/// caption (image); the debounce layer only ever sees plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Phone-number-derived customer id (no `@s.whatsapp.net` suffix).
    pub customer_id: String,
    /// Display name the customer set in WhatsApp, if any.
    pub push_name: Option<String>,
    pub text: String,
    pub kind: MediaKind,
}

/// Media attached to an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub mime_type: String,
}

impl MediaAttachment {
    /// Build an attachment from a URL, guessing the MIME type from its extension.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let extension = url
            .rsplit('.')
            .next()
            .map(|e| e.split(['?', '#']).next().unwrap_or(e).to_lowercase())
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "mp4" => "video/mp4",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            "webm" => "video/webm",
            "pdf" => "application/pdf",
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => "application/octet-stream",
            _ => "image/jpeg",
        };
        Self {
            url,
            mime_type: mime_type.to_string(),
        }
    }
}

/// A reply ready for delivery through a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPayload {
    pub text: String,
    pub media: Option<MediaAttachment>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }
}

//! Turn normalized WhatsApp content into the plain text the reply pipeline
//! consumes.

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    tracing::debug,
};

use {
    barista_agents::MediaUnderstanding, barista_common::types::MediaKind,
    barista_whatsapp::InboundContent,
};

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    /// Nothing in the message can be turned into text.
    #[error("{0}")]
    NoText(&'static str),

    #[error("media processing failed: {0:#}")]
    Media(anyhow::Error),
}

/// Extract text from a customer message, transcribing audio and describing
/// images when `media` is available.
pub async fn resolve_text(
    content: InboundContent,
    media: Option<&dyn MediaUnderstanding>,
) -> Result<(String, MediaKind), InboundError> {
    match content {
        InboundContent::Text(text) => Ok((text, MediaKind::Text)),
        InboundContent::Audio {
            data, mime_type, ..
        } => {
            let media = media.ok_or(InboundError::NoText("audio messages are not supported"))?;
            let data = data.ok_or(InboundError::NoText("audio message without base64 data"))?;
            let bytes = STANDARD
                .decode(data.trim())
                .map_err(|_| InboundError::NoText("audio base64 data is invalid"))?;
            debug!(bytes = bytes.len(), %mime_type, "transcribing audio");
            let text = media
                .transcribe_audio(bytes, &mime_type)
                .await
                .map_err(InboundError::Media)?;
            if text.trim().is_empty() {
                return Err(InboundError::NoText("audio transcription is empty"));
            }
            Ok((text, MediaKind::Audio))
        },
        InboundContent::Image {
            caption,
            data,
            mime_type,
            ..
        } => {
            let description = match (media, data) {
                (Some(media), Some(data)) => Some(
                    media
                        .describe_image(data.trim(), &mime_type)
                        .await
                        .map_err(InboundError::Media)?,
                ),
                _ => None,
            };
            let text = match (caption, description) {
                (Some(caption), Some(description)) => {
                    format!("{caption}\n[Imagem: {}]", description.trim())
                },
                (Some(caption), None) => caption,
                (None, Some(description)) => format!("[Imagem: {}]", description.trim()),
                (None, None) => return Err(InboundError::NoText("image without caption")),
            };
            Ok((text, MediaKind::Image))
        },
    }
}

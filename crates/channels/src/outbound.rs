use {anyhow::Result, async_trait::async_trait};

use barista_common::types::ReplyPayload;

/// Send messages to a chat counterpart.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Send a plain text message to `to` (a customer id / phone number).
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Send a media message; the payload text becomes the caption.
    ///
    /// Payloads without media fall back to a text message.
    async fn send_media(&self, to: &str, payload: &ReplyPayload) -> Result<()>;

    /// Deliver a reply, picking media or text based on its content.
    async fn deliver(&self, to: &str, payload: &ReplyPayload) -> Result<()> {
        if payload.media.is_some() {
            self.send_media(to, payload).await
        } else if !payload.text.is_empty() {
            self.send_text(to, &payload.text).await
        } else {
            Ok(())
        }
    }
}

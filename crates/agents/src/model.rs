use {async_trait::async_trait, serde::Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single chat turn sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Text completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn id(&self) -> &str;

    /// Complete a conversation and return the assistant text.
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Turns non-text customer media into text the reply pipeline can use.
#[async_trait]
pub trait MediaUnderstanding: Send + Sync {
    /// Transcribe raw audio bytes.
    async fn transcribe_audio(&self, audio: Vec<u8>, mime_type: &str) -> anyhow::Result<String>;

    /// Describe a base64-encoded image.
    async fn describe_image(&self, image_base64: &str, mime_type: &str) -> anyhow::Result<String>;
}

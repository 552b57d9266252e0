//! Configuration schema.

use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BaristaConfig {
    pub server: ServerConfig,
    pub debounce: DebounceConfig,
    pub evolution: EvolutionConfig,
    pub openai: OpenAiConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
}

impl BaristaConfig {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.debounce.quiet_window_ms == 0 {
            anyhow::bail!("debounce.quiet_window_ms must be greater than zero");
        }
        if self.debounce.handler_timeout_ms == 0 {
            anyhow::bail!("debounce.handler_timeout_ms must be greater than zero");
        }
        if self.agent.history_limit == 0 {
            anyhow::bail!("agent.history_limit must be greater than zero");
        }
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Message coalescing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet window after the latest message before a batch is flushed.
    pub quiet_window_ms: u64,
    /// Upper bound for one downstream reply pass.
    pub handler_timeout_ms: u64,
}

impl DebounceConfig {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: 10_000,
            handler_timeout_ms: 60_000,
        }
    }
}

/// Evolution API (WhatsApp transport) settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Base URL of the Evolution API server.
    pub api_url: String,

    /// Global API key sent in the `apikey` header.
    pub api_key: Secret<String>,

    /// Instance name used in every message endpoint.
    pub instance: String,

    /// Phone number registered on instance creation.
    pub number: Option<String>,

    /// Delay the transport waits (showing "composing") before sending.
    pub send_delay_ms: u64,
}

impl EvolutionConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.instance.is_empty()
    }
}

impl std::fmt::Debug for EvolutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("instance", &self.instance)
            .field("number", &self.number)
            .finish_non_exhaustive()
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: Secret::new(String::new()),
            instance: String::new(),
            number: None,
            send_delay_ms: 1200,
        }
    }
}

/// OpenAI settings for chat, transcription and vision.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub transcription_model: String,
    /// ISO-639-1 language hint for transcription.
    pub language: String,
}

impl OpenAiConfig {
    /// The API key, if one is set and non-empty.
    pub fn key(&self) -> Option<&Secret<String>> {
        self.api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("transcription_model", &self.transcription_model)
            .finish_non_exhaustive()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            vision_model: "gpt-4o-mini".into(),
            transcription_model: "whisper-1".into(),
            language: "pt".into(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://barista.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// How customer messages are mapped to intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentMode {
    #[default]
    Keywords,
    Llm,
}

/// Sales agent behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub persona_name: String,
    pub company: String,
    pub intent_mode: IntentMode,
    /// Conversation messages passed to the LLM as context.
    pub history_limit: u32,
    /// Apology sent when a reply pass fails.
    pub fallback_message: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona_name: "Júlia".into(),
            company: "Grupo Souza Café".into(),
            intent_mode: IntentMode::default(),
            history_limit: 10,
            fallback_message: "Desculpe, tive um problema ao processar sua mensagem. Por favor, \
                               tente novamente em alguns instantes."
                .into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = BaristaConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.debounce.quiet_window(), Duration::from_secs(10));
        assert_eq!(cfg.debounce.handler_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.agent.intent_mode, IntentMode::Keywords);
        assert_eq!(cfg.agent.history_limit, 10);
        assert!(!cfg.evolution.is_configured());
        assert!(cfg.openai.key().is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut cfg = BaristaConfig::default();
        cfg.debounce.quiet_window_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn blank_openai_key_counts_as_missing() {
        let cfg = OpenAiConfig {
            api_key: Some(Secret::new("  ".into())),
            ..Default::default()
        };
        assert!(cfg.key().is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = EvolutionConfig {
            api_key: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("[REDACTED]"));
    }
}

use {
    async_trait::async_trait,
    reqwest::multipart::{Form, Part},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::{debug, trace},
};

use barista_config::OpenAiConfig;

use crate::model::{ChatMessage, LlmProvider, MediaUnderstanding};

const IMAGE_PROMPT: &str = "Descreva esta imagem em detalhes, focando em aspectos relevantes para \
                            uma máquina de café ou produtos relacionados. Se não houver relação \
                            com café ou máquinas, apenas descreva o conteúdo principal da imagem.";

const IMAGE_MAX_TOKENS: u32 = 500;

/// OpenAI chat completions, Whisper transcription and vision.
pub struct OpenAiProvider {
    api_key: Secret<String>,
    model: String,
    vision_model: String,
    transcription_model: String,
    language: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: Secret<String>, model: String, base_url: String) -> Self {
        Self {
            api_key,
            vision_model: model.clone(),
            model,
            transcription_model: "whisper-1".into(),
            language: "pt".into(),
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Build a provider from config; `None` when no API key is set.
    pub fn from_config(config: &OpenAiConfig) -> Option<Self> {
        let key = config.key()?;
        Some(Self {
            api_key: key.clone(),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            transcription_model: config.transcription_model.clone(),
            language: config.language.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn chat(&self, body: serde_json::Value) -> anyhow::Result<String> {
        trace!(body = %body, "openai request body");

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error HTTP {status}: {body_text}");
        }

        let resp: ChatCompletionResponse = http_resp.json().await?;
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("OpenAI returned no completion text"))?;

        if let Some(usage) = resp.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "openai completion"
            );
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// File name Whisper uses to detect the container format.
fn audio_file_name(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "audio.mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "audio.m4a",
        "audio/wav" | "audio/x-wav" => "audio.wav",
        "audio/webm" => "audio.webm",
        _ => "audio.ogg",
    }
}

/// `audio/ogg; codecs=opus` → `audio/ogg`
fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        debug!(model = %self.model, messages_count = messages.len(), "openai complete request");
        self.chat(serde_json::json!({
            "model": self.model,
            "messages": messages,
        }))
        .await
    }
}

#[async_trait]
impl MediaUnderstanding for OpenAiProvider {
    async fn transcribe_audio(&self, audio: Vec<u8>, mime_type: &str) -> anyhow::Result<String> {
        let mime = essence(mime_type);
        debug!(model = %self.transcription_model, bytes = audio.len(), mime, "openai transcription request");

        let file = Part::bytes(audio)
            .file_name(audio_file_name(mime))
            .mime_str(mime)?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.transcription_model.clone())
            .text("language", self.language.clone());

        let http_resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI transcription error HTTP {status}: {body_text}");
        }

        let resp: TranscriptionResponse = http_resp.json().await?;
        Ok(resp.text.trim().to_string())
    }

    async fn describe_image(&self, image_base64: &str, mime_type: &str) -> anyhow::Result<String> {
        debug!(model = %self.vision_model, mime_type, "openai vision request");
        let data_uri = format!("data:{};base64,{image_base64}", essence(mime_type));
        self.chat(serde_json::json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": IMAGE_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_uri}},
                ],
            }],
            "max_tokens": IMAGE_MAX_TOKENS,
        }))
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use super::*;

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(
            Secret::new("sk-test".into()),
            "gpt-4o-mini".into(),
            server.uri(),
        )
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }))
    }

    #[test]
    fn from_config_requires_key() {
        assert!(OpenAiProvider::from_config(&OpenAiConfig::default()).is_none());
        let cfg = OpenAiConfig {
            api_key: Some(Secret::new("sk".into())),
            base_url: "https://api.openai.com/v1/".into(),
            ..Default::default()
        };
        let p = OpenAiProvider::from_config(&cfg).unwrap();
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.id(), "gpt-4o-mini");
    }

    #[test]
    fn audio_names_follow_mime() {
        assert_eq!(audio_file_name(essence("audio/ogg; codecs=opus")), "audio.ogg");
        assert_eq!(audio_file_name("audio/mpeg"), "audio.mp3");
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "system", "content": "persona"}, {"role": "user", "content": "oi"}]
            })))
            .respond_with(completion("  Olá! Como posso ajudar?  "))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server)
            .complete(&[ChatMessage::system("persona"), ChatMessage::user("oi")])
            .await
            .unwrap();
        assert_eq!(text, "Olá! Como posso ajudar?");
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[ChatMessage::user("oi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("   "))
            .mount(&server)
            .await;

        assert!(provider(&server).complete(&[ChatMessage::user("oi")]).await.is_err());
    }

    #[tokio::test]
    async fn transcribe_posts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "quero alugar uma máquina\n"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server)
            .transcribe_audio(b"OggS".to_vec(), "audio/ogg; codecs=opus")
            .await
            .unwrap();
        assert_eq!(text, "quero alugar uma máquina");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("whisper-1"));
        assert!(body.contains("filename=\"audio.ogg\""));
    }

    #[tokio::test]
    async fn describe_image_sends_data_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 500})))
            .respond_with(completion("Uma máquina de café expresso."))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server)
            .describe_image("aGVsbG8=", "image/png")
            .await
            .unwrap();
        assert_eq!(text, "Uma máquina de café expresso.");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("data:image/png;base64,aGVsbG8="));
    }
}

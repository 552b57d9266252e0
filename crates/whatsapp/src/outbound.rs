//! Outbound message sending through Evolution API.

use {
    anyhow::Result,
    async_trait::async_trait,
    reqwest::{Response, StatusCode},
    secrecy::ExposeSecret,
    serde::Serialize,
    tracing::{debug, info, warn},
};

use {
    barista_channels::ChannelOutbound, barista_common::types::ReplyPayload,
    barista_config::EvolutionConfig,
};

use crate::types::{
    CreateInstanceRequest, MediaMessage, SendMediaRequest, SendOptions, SendTextRequest,
};

/// WhatsApp message length limit (approximately 4096 characters).
const WHATSAPP_MAX_MESSAGE_LEN: usize = 4096;

/// Client for one Evolution API instance.
pub struct EvolutionClient {
    config: EvolutionConfig,
    http: reqwest::Client,
}

impl EvolutionClient {
    pub fn new(config: EvolutionConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: EvolutionConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn instance(&self) -> &str {
        &self.config.instance
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .header("apikey", self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await?)
    }

    /// Create the instance, or connect it when it already exists.
    pub async fn init_instance(&self) -> Result<()> {
        let instance = self.instance();
        let request = CreateInstanceRequest {
            instance_name: instance.to_string(),
            qrcode: true,
            number: self.config.number.clone(),
        };

        let response = self
            .post_json(&self.endpoint("instance/create"), &request)
            .await?;
        let status = response.status();

        if status.is_success() {
            info!(instance, "evolution instance created");
            return Ok(());
        }

        // v1 answers 403 "name already in use", v2 answers 409.
        if status == StatusCode::CONFLICT || status == StatusCode::FORBIDDEN {
            debug!(instance, %status, "instance already exists, connecting");
            return self.connect_instance().await;
        }

        let body = response.text().await.unwrap_or_default();
        warn!(instance, %status, "Evolution API error creating instance: {body}");
        Err(anyhow::anyhow!("Evolution API error creating instance: {status}"))
    }

    /// Connect an existing instance.
    pub async fn connect_instance(&self) -> Result<()> {
        let instance = self.instance();
        let response = self
            .http
            .get(self.endpoint(&format!("instance/connect/{instance}")))
            .header("apikey", self.config.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(instance, %status, "Evolution API error connecting instance: {body}");
            return Err(anyhow::anyhow!(
                "Evolution API error connecting instance: {status}"
            ));
        }

        info!(instance, "evolution instance connected");
        Ok(())
    }

    /// POST to a message endpoint; a 404 means the instance is gone, so
    /// re-initialise it and retry once.
    async fn send_with_reinit<T: Serialize>(&self, path: &str, to: &str, body: &T) -> Result<()> {
        let url = self.endpoint(path);
        let response = self.post_json(&url, body).await?;

        let response = if response.status() == StatusCode::NOT_FOUND {
            warn!(instance = self.instance(), to, "instance not found, re-initialising");
            self.init_instance().await?;
            self.post_json(&url, body).await?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(instance = self.instance(), to, %status, "Evolution API error: {body}");
            return Err(anyhow::anyhow!("Evolution API error: {status}"));
        }
        Ok(())
    }

    /// Send a text message, chunking if necessary.
    pub async fn send_text_message(&self, to: &str, text: &str) -> Result<()> {
        let path = format!("message/sendText/{}", self.instance());
        for chunk in chunk_message(text, WHATSAPP_MAX_MESSAGE_LEN) {
            let request = SendTextRequest::new(to, chunk, self.config.send_delay_ms);
            self.send_with_reinit(&path, to, &request).await?;
            debug!(to, "message sent successfully");
        }
        Ok(())
    }

    /// Send media by URL with an optional caption.
    pub async fn send_media_message(
        &self,
        to: &str,
        media_url: &str,
        mime_type: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let path = format!("message/sendMedia/{}", self.instance());
        let request = SendMediaRequest {
            number: to.to_string(),
            options: SendOptions::composing(self.config.send_delay_ms),
            media_message: MediaMessage {
                mediatype: media_type_for_mime(mime_type),
                media: media_url.to_string(),
                caption: caption.filter(|c| !c.is_empty()).map(String::from),
            },
        };
        self.send_with_reinit(&path, to, &request).await?;
        debug!(to, media_url, "media message sent successfully");
        Ok(())
    }
}

#[async_trait]
impl ChannelOutbound for EvolutionClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.send_text_message(to, text).await
    }

    async fn send_media(&self, to: &str, payload: &ReplyPayload) -> Result<()> {
        match payload.media {
            Some(ref media) => {
                self.send_media_message(to, &media.url, &media.mime_type, Some(&payload.text))
                    .await
            },
            None if !payload.text.is_empty() => self.send_text_message(to, &payload.text).await,
            None => Ok(()),
        }
    }
}

/// Evolution `mediatype` for a MIME type; anything unknown is sent as an image.
fn media_type_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        t if t.starts_with("video/") => "video",
        t if t.starts_with("application/") => "document",
        _ => "image",
    }
}

/// Split a message into chunks that fit within the WhatsApp message limit.
fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let chunk_end = find_break_point(remaining, max_len);
        chunks.push(remaining[..chunk_end].to_string());
        remaining = remaining[chunk_end..].trim_start();
    }

    chunks
}

/// Prefer a newline, then a space; never split inside a UTF-8 character.
fn find_break_point(text: &str, max_len: usize) -> usize {
    let mut limit = max_len;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    let search_range = &text[..limit];

    if let Some(pos) = search_range.rfind('\n') {
        return pos + 1;
    }
    if let Some(pos) = search_range.rfind(' ') {
        return pos + 1;
    }
    if limit == 0 {
        // max_len smaller than the first character
        return text.chars().next().map_or(text.len(), char::len_utf8);
    }
    limit
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        barista_common::types::MediaAttachment,
        secrecy::Secret,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_partial_json, header, method, path},
        },
    };

    use super::*;

    fn client_for(server: &MockServer) -> EvolutionClient {
        EvolutionClient::new(EvolutionConfig {
            api_url: server.uri(),
            api_key: Secret::new("evo-key".into()),
            instance: "souza".into(),
            number: None,
            send_delay_ms: 1200,
        })
    }

    #[test]
    fn chunk_short_message() {
        assert_eq!(chunk_message("Olá!", 100), vec!["Olá!"]);
    }

    #[test]
    fn chunk_prefers_newlines_then_spaces() {
        let chunks = chunk_message("line1\nline2\nline3", 8);
        assert_eq!(chunks, vec!["line1\n", "line2\n", "line3"]);

        let chunks = chunk_message("hello world this is a test", 12);
        assert_eq!(chunks, vec!["hello world ", "this is a ", "test"]);
    }

    #[test]
    fn chunk_respects_char_boundaries() {
        let text = "çççççç";
        let chunks = chunk_message(text, 3);
        assert!(chunks.iter().all(|c| c == "ç"));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn media_types() {
        assert_eq!(media_type_for_mime("image/png"), "image");
        assert_eq!(media_type_for_mime("video/mp4"), "video");
        assert_eq!(media_type_for_mime("application/pdf"), "document");
        assert_eq!(media_type_for_mime("whatever"), "image");
    }

    #[tokio::test]
    async fn send_text_posts_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/souza"))
            .and(header("apikey", "evo-key"))
            .and(body_partial_json(serde_json::json!({
                "number": "5581999999999",
                "options": {"delay": 1200, "presence": "composing"},
                "textMessage": {"text": "Olá!"}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .send_text("5581999999999", "Olá!")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_instance_is_reinitialised_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/souza"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/souza"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/instance/create"))
            .and(body_partial_json(serde_json::json!({"instanceName": "souza"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).send_text("5581", "oi").await.unwrap();
    }

    #[tokio::test]
    async fn existing_instance_is_connected() {
        // v2 answers 409, v1 answers 403; connect is a GET in both.
        for status in [409, 403] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/instance/create"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/instance/connect/souza"))
                .and(header("apikey", "evo-key"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "open"})),
                )
                .expect(1)
                .mount(&server)
                .await;

            client_for(&server).init_instance().await.unwrap();
        }
    }

    #[tokio::test]
    async fn api_error_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/souza"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).send_text("5581", "oi").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn send_media_uses_caption_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendMedia/souza"))
            .and(body_partial_json(serde_json::json!({
                "number": "5581",
                "mediaMessage": {
                    "mediatype": "video",
                    "media": "https://cdn.example/rubi.mp4",
                    "caption": "Rubi em ação"
                }
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ReplyPayload::text("Rubi em ação")
            .with_media(MediaAttachment::from_url("https://cdn.example/rubi.mp4"));
        client_for(&server).deliver("5581", &payload).await.unwrap();
    }
}

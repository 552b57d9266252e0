//! HTTP routes: health, WhatsApp webhook, spreadsheet webhook.

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{DefaultBodyLimit, State},
        http::{Method, StatusCode, Uri},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Serialize,
    serde_json::{Value, json},
    tower_http::trace::TraceLayer,
    tracing::{debug, error, info, warn},
};

use {
    barista_catalog::ingest,
    barista_sessions::Role,
    barista_whatsapp::{WebhookEnvelope, WebhookError, WebhookOutcome, parse_webhook},
};

use crate::{
    inbound::{InboundError, resolve_text},
    server::AppState,
};

/// Webhooks may carry base64 media inline.
const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Registered routes, as reported by `GET /api/routes`.
pub const ROUTES: &[(&str, &str)] = &[
    ("/api/health", "get"),
    ("/api/webhook/coffee", "post"),
    ("/api/webhook/spreadsheet", "post"),
    ("/api/routes", "get"),
];

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/webhook/coffee", post(coffee_webhook))
        .route("/api/webhook/spreadsheet", post(spreadsheet_webhook))
        .route("/api/routes", get(list_routes))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Serialize)]
struct RouteInfo {
    path: &'static str,
    methods: Vec<&'static str>,
}

async fn list_routes() -> Json<Vec<RouteInfo>> {
    Json(
        ROUTES
            .iter()
            .map(|&(path, method)| RouteInfo {
                path,
                methods: vec![method],
            })
            .collect(),
    )
}

async fn not_found(method: Method, uri: Uri) -> Response {
    debug!(%method, %uri, "route not found");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": format!("Route {method}:{uri} not found"),
            "error": "Not Found",
            "statusCode": 404,
        })),
    )
        .into_response()
}

/// Evolution API webhook: normalize, record, and queue for the debouncer.
async fn coffee_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "invalid webhook payload");
            return error_response(StatusCode::BAD_REQUEST, "Invalid webhook payload");
        },
    };

    let message = match parse_webhook(envelope) {
        Ok(WebhookOutcome::Message(message)) => message,
        Ok(WebhookOutcome::Ignored(reason)) => {
            debug!(reason = reason.as_str(), "webhook ignored");
            return Json(json!({ "message": "Event ignored", "reason": reason.as_str() }))
                .into_response();
        },
        Err(e) => {
            warn!(error = %e, "rejected webhook");
            let message = match e {
                WebhookError::MissingFields => "Missing required fields",
                WebhookError::Unsupported(_) | WebhookError::EmptyText => {
                    "Unsupported message format"
                },
            };
            return error_response(StatusCode::BAD_REQUEST, message);
        },
    };

    let customer_id = message.customer_id;
    let (text, kind) = match resolve_text(message.content, state.media.as_deref()).await {
        Ok(resolved) => resolved,
        Err(InboundError::NoText(reason)) => {
            warn!(%customer_id, reason, "no usable text in message");
            return error_response(StatusCode::BAD_REQUEST, "Unsupported message format");
        },
        Err(e @ InboundError::Media(_)) => {
            error!(%customer_id, error = %e, "media processing failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        },
    };

    if let Err(e) = state
        .sessions
        .find_or_create(&customer_id, message.push_name.as_deref())
        .await
    {
        error!(%customer_id, error = %e, "failed to load customer");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    }
    if let Err(e) = state
        .sessions
        .append_message(&customer_id, Role::User, &text, kind)
        .await
    {
        error!(%customer_id, error = %e, "failed to record message");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    }

    if !state.debouncer.submit(&customer_id, &text) {
        return error_response(StatusCode::BAD_REQUEST, "Unsupported message format");
    }
    info!(%customer_id, kind = kind.as_str(), "message queued");
    Json(json!({ "message": "Message queued for processing" })).into_response()
}

/// One spreadsheet row per call; the `Planilha` key names the sheet.
async fn spreadsheet_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let row = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(row)) => row,
        _ => {
            return spreadsheet_error(StatusCode::BAD_REQUEST, "Bad Request", "Invalid data format");
        },
    };

    match ingest::ingest_row(state.catalog.as_ref(), &row).await {
        Ok(report) => {
            info!(sheet = %report.sheet, outcome = ?report.outcome, "spreadsheet row processed");
            Json(json!({
                "message": "Data processed successfully",
                "spreadsheet": report.sheet,
            }))
            .into_response()
        },
        Err(e) if e.is_client_error() => {
            warn!(error = %e, "spreadsheet row rejected");
            spreadsheet_error(StatusCode::BAD_REQUEST, "Bad Request", &e.to_string())
        },
        Err(e) => {
            error!(error = %e, "spreadsheet ingestion failed");
            spreadsheet_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &e.to_string(),
            )
        },
    }
}

fn spreadsheet_error(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({ "error": error, "message": message }))).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use {
        async_trait::async_trait,
        axum::{body::Body, http::Request},
        barista_agents::MediaUnderstanding,
        barista_auto_reply::{BatchHandler, DebounceSettings, Debouncer},
        barista_catalog::{CatalogStore, SqliteCatalog},
        barista_channels::ChannelOutbound,
        barista_common::types::{MediaKind, ReplyPayload},
        barista_sessions::{SessionStore, SqliteSessionStore},
        sqlx::sqlite::SqlitePoolOptions,
        tower::ServiceExt,
    };

    use {super::*, crate::inbound::tests::FakeMedia};

    #[derive(Default)]
    struct Recorder {
        handled: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BatchHandler for Recorder {
        async fn handle(&self, customer_id: &str, text: &str) -> anyhow::Result<()> {
            self.handled
                .lock()
                .unwrap()
                .push((customer_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Silent;

    #[async_trait]
    impl ChannelOutbound for Silent {
        async fn send_text(&self, _to: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_media(&self, _to: &str, _payload: &ReplyPayload) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct TestApp {
        router: Router,
        state: AppState,
        handler: Arc<Recorder>,
    }

    async fn app(media: Option<Arc<dyn MediaUnderstanding>>) -> TestApp {
        app_with_window(media, Duration::from_secs(10)).await
    }

    async fn app_with_window(
        media: Option<Arc<dyn MediaUnderstanding>>,
        quiet_window: Duration,
    ) -> TestApp {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let catalog = Arc::new(SqliteCatalog::init(pool.clone()).await.unwrap());
        let sessions = Arc::new(SqliteSessionStore::init(pool).await.unwrap());
        let handler = Arc::new(Recorder::default());
        let debouncer = Debouncer::new(
            DebounceSettings {
                quiet_window,
                handler_timeout: Duration::from_secs(60),
                fallback_message: "Desculpe".into(),
            },
            Arc::clone(&handler) as Arc<dyn BatchHandler>,
            Arc::new(Silent),
        );
        let state = AppState {
            debouncer,
            sessions: sessions as Arc<dyn SessionStore>,
            catalog: catalog as Arc<dyn CatalogStore>,
            media,
        };
        TestApp {
            router: build_router(state.clone()),
            state,
            handler,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn upsert(message: Value) -> Value {
        json!({
            "event": "messages.upsert",
            "instance": "barista",
            "data": {
                "key": {"remoteJid": "5581999999999@s.whatsapp.net", "fromMe": false, "id": "ABC"},
                "pushName": "Maria",
                "message": message,
            }
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let t = app(None).await;
        let (status, body) = send(&t.router, "GET", "/api/health", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let t = app(None).await;
        let (status, body) = send(&t.router, "GET", "/nope", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Route GET:/nope not found");
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["statusCode"], 404);
    }

    #[tokio::test]
    async fn routes_are_listed() {
        let t = app(None).await;
        let (_, body) = send(&t.router, "GET", "/api/routes", Value::Null).await;
        let routes = body.as_array().unwrap();
        assert_eq!(routes.len(), ROUTES.len());
        assert_eq!(routes[1]["path"], "/api/webhook/coffee");
        assert_eq!(routes[1]["methods"], json!(["post"]));
    }

    // Real time: a paused clock would fire the pool's acquire timeout while
    // SQLite works on its own thread.
    #[tokio::test]
    async fn text_message_is_recorded_and_queued() {
        let t = app_with_window(None, Duration::from_millis(200)).await;
        let (status, body) = send(
            &t.router,
            "POST",
            "/api/webhook/coffee",
            upsert(json!({"conversation": "oi"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Message queued for processing");

        let customer = t.state.sessions.get("5581999999999").await.unwrap().unwrap();
        assert_eq!(customer.name, "Maria");
        let history = t.state.sessions.recent_messages("5581999999999", 10).await.unwrap();
        assert_eq!(history[0].content, "oi");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(t.state.debouncer.pending_count(), 1);

        send(
            &t.router,
            "POST",
            "/api/webhook/coffee",
            upsert(json!({"extendedTextMessage": {"text": "quanto custa a máquina?"}})),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*t.handler.handled.lock().unwrap(), vec![(
            "5581999999999".to_string(),
            "oi\nquanto custa a máquina?".to_string()
        )]);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let t = app(None).await;
        let (status, body) = send(
            &t.router,
            "POST",
            "/api/webhook/coffee",
            json!({"event": "messages.upsert", "data": {"pushName": "x"}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(t.state.debouncer.pending_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_message_is_rejected() {
        let t = app(None).await;
        let (status, _) = send(
            &t.router,
            "POST",
            "/api/webhook/coffee",
            upsert(json!({"stickerMessage": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn own_and_other_events_are_acknowledged() {
        let t = app(None).await;
        let mut own = upsert(json!({"conversation": "resposta"}));
        own["data"]["key"]["fromMe"] = json!(true);
        let (status, body) = send(&t.router, "POST", "/api/webhook/coffee", own).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Event ignored");

        let (status, _) = send(
            &t.router,
            "POST",
            "/api/webhook/coffee",
            json!({"event": "connection.update", "data": {"state": "open"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(t.state.debouncer.pending_count(), 0);
    }

    #[tokio::test]
    async fn image_caption_and_description_are_queued() {
        let t = app(Some(Arc::new(FakeMedia))).await;
        let mut payload = upsert(json!({
            "imageMessage": {"caption": "tem essa?", "mimetype": "image/png"},
            "base64": "aGVsbG8=",
        }));
        payload["data"]["messageType"] = json!("imageMessage");
        let (status, _) = send(&t.router, "POST", "/api/webhook/coffee", payload).await;
        assert_eq!(status, StatusCode::OK);

        let history = t.state.sessions.recent_messages("5581999999999", 1).await.unwrap();
        assert_eq!(history[0].content, "tem essa?\n[Imagem: foto 8]");
        assert_eq!(history[0].media_kind, MediaKind::Image);
    }

    #[tokio::test]
    async fn spreadsheet_row_is_ingested() {
        let t = app(None).await;
        let (status, body) = send(
            &t.router,
            "POST",
            "/api/webhook/spreadsheet",
            json!({
                "Planilha": "MÁQUINAS ALUGAR",
                "MÁQUINA": "Rubi",
                "DISPONÍVEL PARA ALUGUEL": "SIM",
                "ESTOQUE": "3",
                "LOCAÇÃO": "1290",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Data processed successfully");
        assert_eq!(body["spreadsheet"], "MÁQUINAS ALUGAR");
        assert!(t.state.catalog.find_machine("rubi").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn spreadsheet_without_sheet_name_is_bad_request() {
        let t = app(None).await;
        let (status, body) =
            send(&t.router, "POST", "/api/webhook/spreadsheet", json!({"MÁQUINA": "Rubi"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid data format");

        let (status, _) = send(&t.router, "POST", "/api/webhook/spreadsheet", json!([1, 2])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_machine_row_lists_errors() {
        let t = app(None).await;
        let (status, body) = send(
            &t.router,
            "POST",
            "/api/webhook/spreadsheet",
            json!({"Planilha": "MÁQUINAS ALUGAR", "MÁQUINA": "Rubi"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad Request");
        assert!(body["message"].as_str().unwrap().starts_with("Erros de validação"));
    }
}

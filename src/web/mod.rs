// src/web/mod.rs - Webhook ingress and operator API

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::bot::ModerationBot;
use crate::config::EngineSettings;

#[derive(Clone)]
pub struct WebhookState {
    bot: Arc<ModerationBot>,
    admin_token: Option<Arc<str>>,
    webhook_url: Option<Arc<str>>,
    login_chat_id: Option<Arc<str>>,
}

/// HTTP ingress for Telegram webhook deliveries plus a small operator API
pub struct WebhookServer {
    state: WebhookState,
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    user_id: Option<String>,
}

impl WebhookServer {
    pub fn new(bot: Arc<ModerationBot>, settings: &EngineSettings) -> Self {
        Self {
            state: WebhookState {
                bot,
                admin_token: settings.admin_token.as_deref().map(Arc::from),
                webhook_url: settings.webhook_url.as_deref().map(Arc::from),
                login_chat_id: settings.login_chat_id.as_deref().map(Arc::from),
            },
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, port: u16, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
            .await
            .with_context(|| format!("Failed to bind webhook port {}", port))?;
        info!("Webhook endpoint listening on http://0.0.0.0:{}/webhook", port);
        if self.state.admin_token.is_none() {
            warn!("ADMIN_TOKEN not set; /admin routes are unauthenticated");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Webhook server failed")?;
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/webhook", post(receive_update))
            .route("/health", get(health))
            .route("/login", get(login))
            .route("/api/status", get(get_status))
            .route("/admin/reload", post(reload_rules))
            .route("/admin/setwebhook", post(register_webhook))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }
}

async fn receive_update(State(state): State<WebhookState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let bot = Arc::clone(&state.bot);
    // A panic inside the engine stays inside the task
    let outcome = tokio::spawn(async move { bot.handle_update(&body).await }).await;

    match outcome {
        // Side effects keep running in their own task
        Ok(Ok(_handled)) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Ok(Err(e)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": e.to_string() })),
        ),
        Err(e) => {
            error!("Update handling aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "internal error" })),
            )
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn login(State(state): State<WebhookState>, Query(params): Query<LoginParams>) -> (StatusCode, Json<Value>) {
    let Some(user_id) = params.user_id.filter(|id| !id.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No user ID provided" })));
    };

    let Some(chat_id) = &state.login_chat_id else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "Login is not configured" })),
        );
    };

    match state.bot.transport().member_status(chat_id, user_id.trim()).await {
        Ok(status) if status.is_member() => (
            StatusCode::OK,
            Json(json!({ "status": "success", "message": "User is authorized" })),
        ),
        Ok(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "status": "error", "message": "User is not a member of the supergroup" })),
        ),
        Err(e) => {
            error!("Membership check for {} failed: {}", user_id, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "status": "error", "message": "Membership could not be checked" })),
            )
        }
    }
}

async fn get_status(State(state): State<WebhookState>) -> Json<Value> {
    let snapshot = state.bot.config().snapshot().await;
    Json(json!({
        "success": true,
        "data": {
            "version": crate::VERSION,
            "generation": snapshot.generation,
            "reloads": snapshot.generation.saturating_sub(1),
            "loaded_at": snapshot.loaded_at,
            "skipped_rules": snapshot.skipped_rules.len(),
            "stats": state.bot.stats().snapshot(),
        }
    }))
}

fn unauthorized(state: &WebhookState, headers: &HeaderMap) -> Option<(StatusCode, Json<Value>)> {
    let expected = state.admin_token.as_ref()?;
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if presented == Some(&**expected) {
        return None;
    }

    warn!("Rejected unauthenticated admin request");
    Some((
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "unauthorized" })),
    ))
}

async fn reload_rules(State(state): State<WebhookState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = unauthorized(&state, &headers) {
        return rejection;
    }

    match state.bot.reload_config().await {
        Ok(generation) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": { "generation": generation } })),
        ),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

async fn register_webhook(State(state): State<WebhookState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = unauthorized(&state, &headers) {
        return rejection;
    }

    let Some(url) = &state.webhook_url else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "WEBHOOK_URL is not set" })),
        );
    };

    match state.bot.transport().set_webhook(url).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": { "url": url.to_string() } })),
        ),
        Err(e) => {
            error!("Failed to register webhook {}: {}", url, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::extraction::UnconfiguredExtractor;
    use crate::config::{ConfigurationManager, BANNED_TOPICS_FILE};
    use crate::platforms::{DryRunTransport, Transport, TransportOperation};
    use crate::types::{CollaboratorError, MemberStatus};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    /// Accepts every call and never answers a reply
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send_reply(
            &self,
            _chat_id: &str,
            _text: &str,
            _thread_id: Option<&str>,
            _reply_to: Option<&str>,
        ) -> Result<(), CollaboratorError> {
            std::future::pending().await
        }

        async fn delete_message(&self, _chat_id: &str, _message_id: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn chat_member_count(&self, _chat_id: &str) -> Result<u64, CollaboratorError> {
            Ok(0)
        }

        async fn member_status(&self, _chat_id: &str, _user_id: &str) -> Result<MemberStatus, CollaboratorError> {
            Ok(MemberStatus::Left)
        }

        async fn set_webhook(&self, _url: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }

        fn platform_name(&self) -> &str {
            "stalled"
        }
    }

    async fn server_with(
        vars: &[(&str, &str)],
        transport: Arc<dyn Transport>,
    ) -> (WebhookServer, Arc<ModerationBot>, TempDir) {
        let temp_dir = tempdir().unwrap();
        let config = ConfigurationManager::new(temp_dir.path().join("config"));
        config.initialize().await.unwrap();

        let mut vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        vars.insert("MODERATED_CHATS".to_string(), "-1001".to_string());
        let settings = EngineSettings::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let bot = Arc::new(ModerationBot::new(&settings, config, transport, Arc::new(UnconfiguredExtractor)));
        (WebhookServer::new(Arc::clone(&bot), &settings), bot, temp_dir)
    }

    async fn server(vars: &[(&str, &str)]) -> (WebhookServer, Arc<DryRunTransport>, TempDir) {
        let transport = Arc::new(DryRunTransport::recording());
        let (server, _, temp_dir) = server_with(vars, transport.clone()).await;
        (server, transport, temp_dir)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn banned_topic_update() -> String {
        json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "chat": {"id": -1001},
                "from": {"id": 42, "username": "sam"},
                "text": "where can I buy botox"
            }
        })
        .to_string()
    }

    async fn wait_for_replies(transport: &DryRunTransport, count: usize) -> Vec<String> {
        for _ in 0..100 {
            let replies = transport.replies().await;
            if replies.len() >= count {
                return replies;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        transport.replies().await
    }

    #[test_log::test(tokio::test)]
    async fn test_webhook_accepts_update() {
        let (server, transport, _dir) = server(&[]).await;

        let response = server
            .router()
            .oneshot(post("/webhook", banned_topic_update()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
        assert_eq!(wait_for_replies(&transport, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_answers_before_slow_transport() {
        let (server, _, _dir) = server_with(&[], Arc::new(StalledTransport)).await;

        let response = tokio::time::timeout(
            Duration::from_secs(3),
            server.router().oneshot(post("/webhook", banned_topic_update())),
        )
        .await
        .expect("webhook waited on the transport")
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_ok_when_nothing_to_do() {
        let (server, transport, _dir) = server(&[]).await;

        let response = server
            .router()
            .oneshot(post("/webhook", r#"{"update_id": 2, "poll": {}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(transport.operations().await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_webhook_rejects_malformed_body() {
        let (server, _, _dir) = server(&[]).await;

        let response = server.router().oneshot(post("/webhook", "{nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], json!(false));
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let (server, _, _dir) = server(&[]).await;

        let response = server.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = server.router().oneshot(get("/api/status")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["generation"], json!(1));
        assert_eq!(body["data"]["reloads"], json!(0));
        assert_eq!(body["data"]["version"], json!(crate::VERSION));
        assert_eq!(body["data"]["stats"]["events"], json!(0));
    }

    #[tokio::test]
    async fn test_status_counts_reloads_from_any_source() {
        let transport = Arc::new(DryRunTransport::recording());
        let (server, bot, _dir) = server_with(&[], transport).await;

        // Same path the file watcher takes
        bot.config().reload().await.unwrap();
        server.router().oneshot(post("/admin/reload", "")).await.unwrap();

        let response = server.router().oneshot(get("/api/status")).await.unwrap();
        assert_eq!(body_json(response).await["data"]["reloads"], json!(2));
    }

    #[tokio::test]
    async fn test_reload_requires_token_when_configured() {
        let (server, _, _dir) = server(&[("ADMIN_TOKEN", "s3cret")]).await;

        let response = server.router().oneshot(post("/admin/reload", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/admin/reload")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["generation"], json!(2));
    }

    #[tokio::test]
    async fn test_reload_reports_broken_documents() {
        let (server, _, dir) = server(&[]).await;
        std::fs::write(dir.path().join("config").join(BANNED_TOPICS_FILE), "dnp: [unclosed").unwrap();

        let response = server.router().oneshot(post("/admin/reload", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = server.router().oneshot(get("/api/status")).await.unwrap();
        assert_eq!(body_json(response).await["data"]["generation"], json!(1));
    }

    #[tokio::test]
    async fn test_setwebhook_registers_configured_url() {
        let (server, transport, _dir) = server(&[
            ("ADMIN_TOKEN", "s3cret"),
            ("WEBHOOK_URL", "https://bot.example/webhook"),
        ])
        .await;

        let response = server.router().oneshot(post("/admin/setwebhook", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/admin/setwebhook")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            transport.operations().await,
            vec![TransportOperation::SetWebhook {
                url: "https://bot.example/webhook".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_setwebhook_without_url() {
        let (server, _, _dir) = server(&[]).await;

        let response = server.router().oneshot(post("/admin/setwebhook", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_login_checks_membership() {
        let transport = Arc::new(
            DryRunTransport::recording()
                .with_member("-1001", "42", MemberStatus::Member)
                .with_member("-1001", "43", MemberStatus::Kicked),
        );
        let (server, _, _dir) = server_with(&[("LOGIN_CHAT_ID", "-1001")], transport).await;

        let response = server.router().oneshot(get("/login?user_id=42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], json!("success"));

        let response = server.router().oneshot(get("/login?user_id=43")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = server.router().oneshot(get("/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_not_configured() {
        let (server, _, _dir) = server(&[]).await;

        let response = server.router().oneshot(get("/login?user_id=42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

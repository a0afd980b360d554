use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use teloxide::types::Update;
use teloxide::utils::html;
use tracing::{error, info, warn};

use crate::config::Secret;
use crate::platform::{WebhookRegistry, ALLOWED_UPDATES};
use crate::relay::Relay;

const SERVICE_NAME: &str = "postrelay";
const HIDDEN: &str = "***HIDDEN***";

// ── Shared state ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub relay: Arc<Relay>,
    pub webhooks: Arc<dyn WebhookRegistry>,
    /// Full webhook URL; contains the bot token and is never rendered.
    pub webhook_url: Url,
    pub button_url: Url,
    pub admin_secret: Option<Secret>,
    pub webhook_calls: AtomicU64,
}

#[derive(Deserialize)]
struct AdminQuery {
    secret: Option<String>,
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook_info", get(webhook_info))
        .route("/set_webhook", get(set_webhook))
        .route(webhook_path, post(receive_update))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(router: Router, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Register the webhook once at startup. Failure is logged; the admin can
/// retry through `/set_webhook`.
pub async fn register_on_startup(state: &AppState) {
    info!("Registering webhook...");
    match state.webhooks.register(state.webhook_url.clone()).await {
        Ok(status) => info!(
            "Webhook registered ({} pending update(s)), allowed updates: {}",
            status.pending_updates,
            ALLOWED_UPDATES.join(", ")
        ),
        Err(e) => error!("Failed to register webhook at startup: {:#}", e),
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let channel = html::escape(&state.relay.settings().channel.to_string());
    let catalog = html::escape(state.button_url.as_str());
    let calls = state.webhook_calls.load(Ordering::Relaxed);
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Post Relay</title>
    <style>
        body {{ font-family: 'Segoe UI', Arial, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        .status {{ color: #2e7d32; font-weight: bold; }}
        .footer {{ font-size: 0.9em; opacity: 0.7; margin-top: 20px; text-align: center; }}
    </style>
</head>
<body>
    <h1>Post Relay</h1>
    <p class="status">✅ Бот работает</p>
    <p><strong>📢 Канал:</strong> {channel}</p>
    <p><strong>📱 Каталог:</strong> <a href="{catalog}" target="_blank">Открыть</a></p>
    <p><strong>📊 Webhook вызовов:</strong> {calls}</p>
    <p><a href="/health">Health Check</a></p>
    <p class="footer">🔒 Все служебные эндпоинты защищены</p>
</body>
</html>
"#
    ))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "webhook_calls": state.webhook_calls.load(Ordering::Relaxed),
        "service": SERVICE_NAME,
    }))
}

fn check_admin_access(state: &AppState, query: &AdminQuery) -> bool {
    let granted = match (&state.admin_secret, query.secret.as_deref()) {
        (Some(expected), Some(given)) => expected.expose() == given,
        _ => false,
    };
    if !granted {
        warn!("Rejected request to an admin endpoint");
    }
    granted
}

fn access_denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Access denied" })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error" })),
    )
        .into_response()
}

async fn webhook_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Response {
    if !check_admin_access(&state, &query) {
        return access_denied();
    }
    match state.webhooks.status().await {
        Ok(status) => Json(json!({
            "url": HIDDEN,
            "pending_updates": status.pending_updates,
            "last_error_date": status.last_error_date,
            "last_error_message": status.last_error_message,
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to fetch webhook info: {:#}", e);
            internal_error()
        }
    }
}

async fn set_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Response {
    if !check_admin_access(&state, &query) {
        return access_denied();
    }
    match state.webhooks.register(state.webhook_url.clone()).await {
        Ok(_) => {
            info!("Webhook registered on request");
            Json(json!({
                "status": "success",
                "webhook_url": HIDDEN,
                "allowed_updates": ALLOWED_UPDATES,
            }))
            .into_response()
        }
        Err(e) => {
            error!("Failed to register webhook: {:#}", e);
            internal_error()
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

async fn receive_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = state.webhook_calls.fetch_add(1, Ordering::Relaxed) + 1;

    if !is_json(&headers) {
        warn!("Webhook request with wrong content type");
        return (StatusCode::FORBIDDEN, "Invalid content type").into_response();
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Undecodable webhook payload: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!("Webhook #{} received", call);
    state.relay.handle_update(update).await;
    info!("Webhook #{} processed", call);
    StatusCode::OK.into_response()
}

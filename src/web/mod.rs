use crate::channels::line::signature::{verify_signature, SIGNATURE_HEADER};
use crate::channels::line::webhook::WebhookPayload;
use crate::conductor::Conductor;
use crate::config::Config;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::Instrument;

/// Shared application state for all web handlers.
#[derive(Clone)]
pub struct AppState {
    pub conductor: Arc<Conductor>,
    pub channel_secret: Arc<str>,
}

/// Build the axum router: health check plus the webhook on `/` and `webhook_path`.
pub fn build_router(state: AppState, webhook_path: &str) -> Router {
    let mut router = Router::new().route("/", get(health).post(webhook));
    if webhook_path != "/" {
        router = router.route(webhook_path, post(webhook));
    }
    router
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "LINE bot server is running",
        "status": "OK",
    }))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&state.channel_secret, signature, &body) {
        tracing::warn!("Rejected webhook with invalid signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Malformed webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    tracing::debug!("Webhook with {} event(s)", payload.events.len());
    for event in payload.events {
        let conductor = state.conductor.clone();
        let span = tracing::info_span!(
            "event",
            request_id = %uuid::Uuid::new_v4(),
            event_id = event.event_id().unwrap_or("-"),
        );
        tokio::spawn(async move { conductor.handle_event(event).await }.instrument(span));
    }

    (StatusCode::OK, "OK")
}

/// Run the webhook server until Ctrl+C.
pub async fn start_server(config: &Config, conductor: Arc<Conductor>) -> Result<(), anyhow::Error> {
    let addr = config.bind_addr();
    let state = AppState {
        conductor,
        channel_secret: Arc::from(config.line.channel_secret.as_str()),
    };
    let app = build_router(state, &config.server.webhook_path);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Listening on http://{} (webhook: {})",
        addr,
        config.server.webhook_path
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    tracing::info!("Shutting down...");
}

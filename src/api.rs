//! HTTP surface: `POST /chat` and `GET /health`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::agent::ChatService;
use crate::error::ChatError;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Conversation to continue; the server's default session when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_initialized: bool,
}

/// Build the router. CORS is open; the browser front-end runs on another
/// origin.
pub fn chat_routes(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(service): State<Arc<ChatService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        agent_initialized: service.is_initialized(),
    })
}

// ── Chat ────────────────────────────────────────────────────────────────

async fn chat(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    match service.chat(req.session_id.as_deref(), &req.message).await {
        Ok(outcome) => Json(ChatResponse {
            response: outcome.text,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::Init(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Turn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &ChatError) -> Response {
    let status = status_for(err);
    warn!(status = status.as_u16(), category = err.category(), error = %err, "Chat request failed");
    (
        status,
        Json(serde_json::json!({
            "error": {
                "category": err.category(),
                "detail": err.to_string(),
            }
        })),
    )
        .into_response()
}

//! REST API Server for the Policy Intake Advisor
//!
//! Exposes the intake engine via HTTP endpoints. The transport-specific
//! concerns (webhook signature verification, rich menus) stay in the
//! messaging gateway in front of this service.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::intake::IntakeEngine;
use crate::models::OutboundMessage;

/// =============================
/// Request Models
/// =============================

/// One validated inbound text event from the messaging gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub events: Vec<InboundEvent>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Reply for one processed event. `reply` is absent for the silent
/// no-op case.
#[derive(Debug, Serialize)]
pub struct EventReply {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<IntakeEngine>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Webhook Endpoint
/// =============================

/// Events are processed in arrival order; the engine's per-user lock
/// keeps same-user messages serialized while cross-request traffic for
/// other users proceeds in parallel.
async fn webhook(
    State(state): State<ApiState>,
    Json(req): Json<WebhookRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(event_count = req.events.len(), "Received webhook batch");

    let mut replies = Vec::with_capacity(req.events.len());
    for event in &req.events {
        let outbound = state.engine.advance(&event.user_id, &event.text).await;
        replies.push(EventReply {
            user_id: event.user_id.clone(),
            reply: match outbound {
                OutboundMessage::Text(body) => Some(body),
                OutboundMessage::Silent => None,
            },
        });
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "replies": replies,
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<IntakeEngine>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/webhook", post(webhook))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    engine: Arc<IntakeEngine>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_wraps_data() {
        let response = ApiResponse::success(serde_json::json!({"ok": true}));
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());

        let response = ApiResponse::error("boom".to_string());
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn event_reply_omits_silent_replies() {
        let reply = EventReply {
            user_id: "u1".to_string(),
            reply: None,
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("reply"));
    }
}

//! REST API for the agent brain
//!
//! Exposes the full pipeline and the individual tools over HTTP

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::BrainError;
use crate::intent::Intent;
use crate::models::{AgentOutcome, BrainRequest, DeviceAlarmsRequest, MemoryScope, UserManualRequest};
use crate::pipeline::Brain;
use crate::tools::ToolRequest;

pub const ERROR_DETAIL: &str = "There was an error processing your query. Please try again later.";

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub brain: Arc<Brain>,
}

/// =============================
/// Error Response
/// =============================

/// Any pipeline failure; the caller only sees a generic detail
pub struct ApiError(BrainError);

impl From<BrainError> for ApiError {
    fn from(err: BrainError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": ERROR_DETAIL })),
        )
            .into_response()
    }
}

type ApiResult = std::result::Result<Json<AgentOutcome>, ApiError>;

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Brain Endpoint
/// =============================

async fn agent_ai_brain(State(state): State<ApiState>, Json(req): Json<BrainRequest>) -> ApiResult {
    let outcome = state.brain.handle(&req).await?;
    Ok(Json(outcome))
}

/// =============================
/// Tool Endpoints
/// =============================

async fn user_manual(
    State(state): State<ApiState>,
    Json(req): Json<UserManualRequest>,
) -> ApiResult {
    info!(user_id = %req.user_id, "User manual request");

    let request = ToolRequest::new(
        MemoryScope::new(req.user_id, req.session_id),
        req.client_hash,
        req.message,
    )
    .with_context(req.context);

    let outcome = state.brain.run_tool(Intent::UserManual, &request).await?;
    Ok(Json(outcome))
}

async fn device_alarms(
    State(state): State<ApiState>,
    Json(req): Json<DeviceAlarmsRequest>,
) -> ApiResult {
    info!(user_id = %req.user_id, "Device alarms request");

    let request = ToolRequest::new(
        MemoryScope::new(req.user_id, req.session_id),
        req.client_hash,
        req.message,
    );

    let outcome = state.brain.run_tool(Intent::DeviceAlarms, &request).await?;
    Ok(Json(outcome))
}

/// =============================
/// Router
/// =============================

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(brain: Arc<Brain>, cors_origins: &[String]) -> Router {
    let state = ApiState { brain };

    Router::new()
        .route("/health", get(health))
        .route("/v1/agent_ai_brain", post(agent_ai_brain))
        .route("/v1/user_manual", post(user_manual))
        .route("/v1/device_alarms", post(device_alarms))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    brain: Arc<Brain>,
    port: u16,
    cors_origins: &[String],
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(brain, cors_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, alarm, MockChatModel};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn router(chat: MockChatModel) -> Router {
        let brain = testing::brain(chat, vec![alarm("WTG-01", "Gearbox")]);
        create_router(Arc::new(brain), &["*".to_string()])
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(MockChatModel::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_brain_endpoint() {
        let chat = MockChatModel::new()
            .reply("input_guardrail", "ALLOWED")
            .reply("rewriter", "turbine output today")
            .reply("intent_classifier", r#"{"intent": "energy_only"}"#)
            .reply("energy_only", "About 2 MW.");

        let (status, body) = post_json(
            router(chat),
            "/v1/agent_ai_brain",
            json!({ "user_id": "u1", "session_id": "s1", "client_hash": "c", "message": "output?" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "About 2 MW.");
        assert!(body["tokens_total"].as_u64().unwrap() > 0);
        assert!(body["cost_usd"].as_f64().unwrap() > 0.0);
        assert!(body.get("tokens_prompt").is_some());
        assert!(body.get("tokens_completion").is_some());
    }

    #[tokio::test]
    async fn test_pipeline_error_is_generic_500() {
        // No scripted guardrail reply
        let (status, body) = post_json(
            router(MockChatModel::new()),
            "/v1/agent_ai_brain",
            json!({ "user_id": "u1", "session_id": "s1", "client_hash": "c", "message": "hi" }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "detail": ERROR_DETAIL }));
    }

    #[tokio::test]
    async fn test_user_manual_endpoint() {
        let chat = MockChatModel::new().reply("user_manual", "Hold the reset button.");

        let (status, body) = post_json(
            router(chat),
            "/v1/user_manual",
            json!({
                "user_id": "u1", "session_id": "s1", "client_hash": "c",
                "context": "Reset: hold 5 seconds", "message": "how to reset?"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Hold the reset button.");
        assert_eq!(body["tokens_total"], 15);
    }

    #[tokio::test]
    async fn test_device_alarms_endpoint() {
        let chat = MockChatModel::new().reply(
            "device_alarms",
            r#"{"device_name": "WTG-01", "end_time": "2024-05-01"}"#,
        );

        let (status, body) = post_json(
            router(chat),
            "/v1/device_alarms",
            json!({ "user_id": "u1", "session_id": "s1", "client_hash": "c", "message": "alarms WTG-01" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["response"].as_str().unwrap().contains("Component: Gearbox"));
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected() {
        let (status, _) = post_json(
            router(MockChatModel::new()),
            "/v1/agent_ai_brain",
            json!({ "user_id": "u1", "message": "hi" }),
        )
        .await;

        assert!(status.is_client_error());
    }

    #[test]
    fn test_cors_layer_accepts_lists() {
        // Invalid origins are skipped rather than failing startup
        let _ = cors_layer(&["http://a.example".to_string(), "bad\norigin".to_string()]);
        let _ = cors_layer(&[]);
    }
}

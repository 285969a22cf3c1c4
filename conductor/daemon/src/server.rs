//! HTTP Server
//!
//! Routes for the RPC gateway and the chat surface. Both sides share the one
//! orchestrator held by [`AppState`].
//!
//! ```text
//!   POST /mcp                 ──▶ RpcGateway::handle_raw
//!   GET  /mcp/capabilities    ──▶ RpcGateway::capabilities
//!   GET  /mcp/health
//!   POST /assistant/messages  ──▶ Assistant::handle
//!   GET  /sessions            ──▶ SessionOrchestrator::list_sessions
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use rdp_conductor_core::rpc::PARSE_ERROR;
use rdp_conductor_core::{Assistant, ConversationId, RpcGateway, SessionOrchestrator};

/// Everything the handlers need
#[derive(Clone, Debug)]
pub struct AppState {
    /// JSON-RPC front end
    pub gateway: Arc<RpcGateway>,
    /// Chat surface
    pub assistant: Assistant,
    /// The process-wide session registry
    pub orchestrator: SessionOrchestrator,
}

type SharedState = Arc<AppState>;

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(rpc))
        .route("/mcp/capabilities", get(capabilities))
        .route("/mcp/health", get(health))
        .route("/assistant/messages", post(assistant_message))
        .route("/sessions", get(sessions))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn rpc(State(state): State<SharedState>, body: String) -> Response {
    match state.gateway.handle_raw(&body).await {
        Some(response) => {
            let status = if response.error_code() == Some(PARSE_ERROR) {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            (status, Json(response)).into_response()
        }
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn capabilities(State(state): State<SharedState>) -> Json<Value> {
    Json(state.gateway.capabilities())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    conversation_id: Option<String>,
}

async fn assistant_message(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let conversation_id = match request.conversation_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(
            raw.parse::<ConversationId>()
                .map_err(|e| AppError::BadRequest(format!("invalid conversationId: {e}")))?,
        ),
        _ => None,
    };

    debug!(chars = request.message.len(), "Chat message received");
    let reply = state.assistant.handle(&request.message, conversation_id).await;
    Ok(Json(reply).into_response())
}

async fn sessions(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "sessions": state.orchestrator.list_sessions() }))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use rdp_conductor_core::{
        AssistantConfig, CommandDispatcher, ConversationStore, IntentParser, MemoryProfileStore,
        OrchestratorConfig,
    };

    use super::*;

    fn test_router() -> (Router, SessionOrchestrator) {
        let orchestrator =
            SessionOrchestrator::simulated(Duration::from_millis(10), OrchestratorConfig::default());
        let profiles = Arc::new(MemoryProfileStore::new());
        let assistant = Assistant::new(
            IntentParser::rules_only(),
            CommandDispatcher::new(orchestrator.clone(), profiles.clone()),
            Arc::new(ConversationStore::new()),
            AssistantConfig {
                chain_step_delay: Duration::ZERO,
                ..AssistantConfig::default()
            },
        );
        let gateway = Arc::new(RpcGateway::for_orchestrator(&orchestrator, profiles));
        let state = AppState {
            gateway,
            assistant,
            orchestrator: orchestrator.clone(),
        };
        (router(state), orchestrator)
    }

    async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = test_router();
        let (status, body) = get_json(&router, "/mcp/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_capabilities_lists_tools() {
        let (router, _) = test_router();
        let (status, body) = get_json(&router, "/mcp/capabilities").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["protocolVersion"], "2024-11-05");
        assert_eq!(body["capabilities"]["prompts"], false);
        assert_eq!(body["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_malformed_rpc_body_is_bad_request() {
        let (router, _) = test_router();
        let (status, body) = post_json(&router, "/mcp", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let (router, _) = test_router();
        let (status, body) = post_json(
            &router,
            "/mcp",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_rpc_connect_shows_in_sessions() {
        let (router, orchestrator) = test_router();
        let (_, init) = post_json(
            &router,
            "/mcp",
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(init["result"]["serverInfo"]["name"], "RetroRDP MCP Server");

        let (status, call) = post_json(
            &router,
            "/mcp",
            r#"{"jsonrpc":"2.0","id":"c1","method":"tools/call","params":{"name":"connect_rdp","arguments":{"host":"10.0.0.5","username":"admin"}}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(call["id"], "c1");
        assert_eq!(call["result"]["isError"], false);
        assert_eq!(orchestrator.session_count(), 1);

        let (_, listing) = get_json(&router, "/sessions").await;
        assert_eq!(listing["sessions"][0]["host"], "10.0.0.5");
    }

    #[tokio::test]
    async fn test_chat_message_round_trip() {
        let (router, orchestrator) = test_router();
        let (status, reply) = post_json(
            &router,
            "/assistant/messages",
            r#"{"message":"connect to server1.example.com as admin"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["success"], true);
        assert_eq!(orchestrator.session_count(), 1);

        let id = reply["conversationId"].as_str().unwrap().to_string();
        let (_, second) = post_json(
            &router,
            "/assistant/messages",
            &json!({"message": "list sessions", "conversationId": id}).to_string(),
        )
        .await;
        assert_eq!(second["conversationId"], id.as_str());
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_conversation_id() {
        let (router, _) = test_router();
        let (status, body) = post_json(
            &router,
            "/assistant/messages",
            r#"{"message":"hi","conversationId":"not-a-uuid"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("conversationId"));
    }
}

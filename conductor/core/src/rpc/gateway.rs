//! JSON-RPC request dispatch
//!
//! ```text
//!   body ─▶ decode ──fail──▶ -32700
//!             │
//!             ▼
//!   notifications/* ─▶ (no response)
//!   no method or non-string method ─▶ -32601
//!   initialize      ─▶ server info, marks ready
//!   ping            ─▶ {}
//!   not ready       ─▶ -32002
//!   tools/list | tools/call | resources/list | resources/read
//!   anything else   ─▶ -32601
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::envelope::{RpcError, RpcRequest, RpcResponse, METHOD_NOT_FOUND};
use super::rdp_tools::register_rdp_tools;
use super::resources::ResourceCatalog;
use super::tools::ToolRegistry;
use crate::orchestrator::{PerformanceMonitor, SessionOrchestrator};
use crate::profiles::ProfileStore;

/// Protocol revision announced by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name announced by `initialize`
pub const SERVER_NAME: &str = "RetroRDP MCP Server";
/// Server version announced by `initialize`
pub const SERVER_VERSION: &str = "1.0.0";

/// Capability flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Tools are offered
    pub tools: bool,
    /// Resources are offered
    pub resources: bool,
    /// Prompts are offered
    pub prompts: bool,
    /// Logging is offered
    pub logging: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            tools: true,
            resources: true,
            prompts: false,
            logging: true,
        }
    }
}

/// JSON-RPC front end over the tool registry and resources
#[derive(Debug)]
pub struct RpcGateway {
    tools: ToolRegistry,
    resources: ResourceCatalog,
    capabilities: Capabilities,
    initialized: AtomicBool,
}

impl RpcGateway {
    /// Create a gateway
    pub fn new(tools: ToolRegistry, resources: ResourceCatalog) -> Self {
        Self {
            tools,
            resources,
            capabilities: Capabilities::default(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Gateway with the RDP tools and resources over shared collaborators
    pub fn for_orchestrator(
        orchestrator: &SessionOrchestrator,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self::build(orchestrator, profiles, None)
    }

    /// Like [`RpcGateway::for_orchestrator`], with session metrics from `monitor`
    pub fn with_monitor(
        orchestrator: &SessionOrchestrator,
        profiles: Arc<dyn ProfileStore>,
        monitor: PerformanceMonitor,
    ) -> Self {
        Self::build(orchestrator, profiles, Some(monitor))
    }

    fn build(
        orchestrator: &SessionOrchestrator,
        profiles: Arc<dyn ProfileStore>,
        monitor: Option<PerformanceMonitor>,
    ) -> Self {
        let monitored = monitor.is_some();
        let mut tools = ToolRegistry::new();
        register_rdp_tools(&mut tools, orchestrator, monitor);
        info!(tools = tools.len(), monitored, "RPC gateway ready for initialize");
        Self::new(tools, ResourceCatalog::new(orchestrator.clone(), profiles))
    }

    /// Whether `initialize` has been called
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Registered tools
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Capabilities document for the read-only endpoint
    #[must_use]
    pub fn capabilities(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
            "capabilities": self.capabilities,
            "tools": self.tools.descriptors(),
            "resources": self.resources.list(),
        })
    }

    /// Handle a raw request body
    ///
    /// Returns `None` when no response is due (notifications).
    pub async fn handle_raw(&self, body: &str) -> Option<RpcResponse> {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                debug!(error = %e, "Unparseable RPC body");
                Some(RpcResponse::failure(None, RpcError::parse_error(e.to_string())))
            }
        }
    }

    /// Handle a decoded JSON value
    ///
    /// Fields are read one by one, so a `method` of the wrong type is reported
    /// as a missing method against the caller's id.
    pub async fn handle_value(&self, value: Value) -> Option<RpcResponse> {
        let Value::Object(mut fields) = value else {
            return Some(RpcResponse::failure(
                None,
                RpcError::parse_error("Request must be a JSON object"),
            ));
        };
        let text = |v: Value| match v {
            Value::String(s) => Some(s),
            _ => None,
        };
        let request = RpcRequest {
            jsonrpc: fields.remove("jsonrpc").and_then(text),
            id: fields.remove("id").filter(|id| !id.is_null()),
            method: fields.remove("method").and_then(text),
            params: fields.remove("params").filter(|p| !p.is_null()),
        };
        self.handle(request).await
    }

    /// Handle one request
    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        if request.is_notification() {
            debug!(method = ?request.method_name(), "Notification received");
            return None;
        }

        let id = request.id.clone();
        let result = self.dispatch(&request).await;
        if let Err(error) = &result {
            debug!(method = ?request.method_name(), code = error.code, message = %error.message, "RPC call failed");
        }
        Some(match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(error) => RpcResponse::failure(id, error),
        })
    }

    async fn dispatch(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let Some(method) = request.method_name() else {
            return Err(RpcError::method_not_found(None));
        };
        debug!(method, "Handling RPC request");

        match method {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            _ if !self.is_initialized() => Err(RpcError::not_initialized()),
            "tools/list" => Ok(json!({ "tools": self.tools.descriptors() })),
            "tools/call" => self.call_tool(request.params.as_ref()).await,
            "resources/list" => Ok(json!({ "resources": self.resources.list() })),
            "resources/read" => self.read_resource(request.params.as_ref()).await,
            other => Err(RpcError::method_not_found(Some(other))),
        }
    }

    fn initialize(&self) -> Value {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!("RPC client initialized");
        }
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
            "capabilities": self.capabilities,
        })
    }

    async fn call_tool(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let params = params
            .and_then(Value::as_object)
            .ok_or_else(|| RpcError::invalid_params("Invalid params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Invalid tool call params: name is required"))?;
        let empty = Map::new();
        let args = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(args)) => args,
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "Invalid tool call params: arguments must be an object",
                ))
            }
        };

        match self.tools.call(name, args).await {
            None => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Tool not found: {name}"),
            )),
            Some(Ok(output)) => {
                info!(tool = name, is_error = output.is_error, "Tool call finished");
                serde_json::to_value(output)
                    .map_err(|e| RpcError::internal("Tool execution error", e.to_string()))
            }
            Some(Err(e)) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                Err(RpcError::internal("Tool execution error", e.to_string()))
            }
        }
    }

    async fn read_resource(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let uri = params
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Invalid params: uri is required"))?;

        match self.resources.read(uri).await {
            Ok(Some(content)) => Ok(json!({ "contents": [content] })),
            Ok(None) => Err(RpcError::invalid_params(format!("Unknown resource: {uri}"))),
            Err(e) => Err(RpcError::internal("Resource read error", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use crate::profiles::MemoryProfileStore;
    use crate::rpc::envelope::{INTERNAL_ERROR, INVALID_PARAMS, NOT_INITIALIZED, PARSE_ERROR};

    fn gateway() -> (SessionOrchestrator, RpcGateway) {
        let orchestrator =
            SessionOrchestrator::simulated(Duration::from_millis(5), OrchestratorConfig::default());
        let gateway =
            RpcGateway::for_orchestrator(&orchestrator, Arc::new(MemoryProfileStore::new()));
        (orchestrator, gateway)
    }

    async fn ready() -> (SessionOrchestrator, RpcGateway) {
        let (orchestrator, gateway) = gateway();
        gateway
            .handle(RpcRequest::new(0, "initialize", None))
            .await
            .unwrap();
        (orchestrator, gateway)
    }

    async fn call(gateway: &RpcGateway, method: &str, params: Value) -> RpcResponse {
        gateway
            .handle(RpcRequest::new("t", method, Some(params)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_parse_errors() {
        let (_, g) = gateway();
        let bad = g.handle_raw("{not json").await.unwrap();
        assert_eq!(bad.error_code(), Some(PARSE_ERROR));
        assert_eq!(bad.id, Value::Null);

        let array = g.handle_raw("[1, 2]").await.unwrap();
        assert_eq!(array.error_code(), Some(PARSE_ERROR));
    }

    #[tokio::test]
    async fn test_missing_method() {
        let (_, g) = gateway();
        let response = g.handle_raw(r#"{"jsonrpc":"2.0","id":7}"#).await.unwrap();
        assert_eq!(response.error_code(), Some(METHOD_NOT_FOUND));
        assert_eq!(response.id, json!(7));
    }

    #[tokio::test]
    async fn test_non_string_method_keeps_id() {
        let (_, g) = gateway();
        for body in [
            r#"{"jsonrpc":"2.0","id":1,"method":5}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":null}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":{"name":"tools/list"}}"#,
        ] {
            let response = g.handle_raw(body).await.unwrap();
            assert_eq!(response.error_code(), Some(METHOD_NOT_FOUND), "{body}");
            assert_eq!(response.id, json!(1), "{body}");
        }
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let (_, g) = gateway();
        for method in ["tools/list", "tools/call", "resources/list", "resources/read", "bogus"] {
            let response = call(&g, method, json!({})).await;
            assert_eq!(response.error_code(), Some(NOT_INITIALIZED), "{method}");
        }

        let ping = call(&g, "ping", json!({})).await;
        assert_eq!(ping.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_initialize_result() {
        let (_, g) = gateway();
        let response = call(&g, "initialize", json!({})).await;
        let result = response.result.unwrap();

        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(
            result["capabilities"],
            json!({"tools": true, "resources": true, "prompts": false, "logging": true})
        );
        assert!(g.is_initialized());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (_, g) = gateway();
        let none = g
            .handle_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_after_initialize() {
        let (_, g) = ready().await;
        let response = call(&g, "prompts/list", json!({})).await;
        assert_eq!(response.error_code(), Some(METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (_, g) = ready().await;
        let result = call(&g, "tools/list", json!({})).await.result.unwrap();
        assert_eq!(result["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tool_call_errors() {
        let (orchestrator, g) = ready().await;

        let unknown = call(&g, "tools/call", json!({"name": "nope", "arguments": {}})).await;
        assert_eq!(unknown.error_code(), Some(METHOD_NOT_FOUND));

        let no_name = call(&g, "tools/call", json!({"arguments": {}})).await;
        assert_eq!(no_name.error_code(), Some(INVALID_PARAMS));

        let not_object = call(&g, "tools/call", json!("connect_rdp")).await;
        assert_eq!(not_object.error_code(), Some(INVALID_PARAMS));

        let missing_arg = call(
            &g,
            "tools/call",
            json!({"name": "connect_rdp", "arguments": {"host": "a.example.com"}}),
        )
        .await;
        assert_eq!(missing_arg.result.unwrap()["isError"], true);
        assert_eq!(orchestrator.session_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_call_success() {
        let (orchestrator, g) = ready().await;
        let response = call(
            &g,
            "tools/call",
            json!({"name": "connect_rdp", "arguments": {"host": "a.example.com", "username": "u"}}),
        )
        .await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(orchestrator.session_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_internal_failure_maps_to_internal_error() {
        use crate::orchestrator::{ConnectionRequest, ScreenCapture, SessionRecord, SimulatedConnector};
        use crate::command::ScreenshotMode;
        use async_trait::async_trait;

        struct BrokenCapture;

        #[async_trait]
        impl ScreenCapture for BrokenCapture {
            async fn capture(
                &self,
                _session: Option<&SessionRecord>,
                _mode: ScreenshotMode,
            ) -> anyhow::Result<std::path::PathBuf> {
                anyhow::bail!("display unavailable")
            }
        }

        let orchestrator = SessionOrchestrator::new(
            Arc::new(SimulatedConnector::new(Duration::from_millis(5))),
            Arc::new(BrokenCapture),
            OrchestratorConfig::default(),
        );
        orchestrator
            .start_session(ConnectionRequest::new("a.example.com"))
            .unwrap();
        let g = RpcGateway::for_orchestrator(&orchestrator, Arc::new(MemoryProfileStore::new()));
        call(&g, "initialize", json!({})).await;

        let response = call(
            &g,
            "tools/call",
            json!({"name": "capture_screenshot", "arguments": {"sessionId": "1"}}),
        )
        .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "Tool execution error");
        assert_eq!(error.data, Some(json!("display unavailable")));
    }

    #[tokio::test]
    async fn test_capture_of_failed_session_is_result_not_error() {
        use crate::orchestrator::{ConnectionRequest, SessionStatus, SimulatedCapture, SimulatedConnector};

        let orchestrator = SessionOrchestrator::new(
            Arc::new(
                SimulatedConnector::new(Duration::from_millis(5))
                    .with_unreachable_host("down.example.com"),
            ),
            Arc::new(SimulatedCapture::new("/tmp/rdp-conductor-tests")),
            OrchestratorConfig::default(),
        );
        let mut events = orchestrator.subscribe();
        let id = orchestrator
            .start_session(ConnectionRequest::new("down.example.com"))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Ok(change) = events.recv().await {
                if change.session_id == id && change.new_status == SessionStatus::Failed {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let g = RpcGateway::for_orchestrator(&orchestrator, Arc::new(MemoryProfileStore::new()));
        call(&g, "initialize", json!({})).await;
        let response = call(
            &g,
            "tools/call",
            json!({"name": "capture_screenshot", "arguments": {"sessionId": id.to_string()}}),
        )
        .await;

        assert!(response.error.is_none(), "{:?}", response.error);
        assert_eq!(response.id, json!("t"));
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("is Failed"));
    }

    #[tokio::test]
    async fn test_resources() {
        let (_, g) = ready().await;
        let listed = call(&g, "resources/list", json!({})).await.result.unwrap();
        assert_eq!(listed["resources"].as_array().unwrap().len(), 2);

        let read = call(&g, "resources/read", json!({"uri": "rdp://sessions"})).await;
        assert_eq!(read.result.unwrap()["contents"][0]["uri"], "rdp://sessions");

        let unknown = call(&g, "resources/read", json!({"uri": "rdp://other"})).await;
        assert_eq!(unknown.error_code(), Some(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_capabilities_document() {
        let (_, g) = gateway();
        let doc = g.capabilities();
        assert_eq!(doc["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(doc["tools"].as_array().unwrap().len(), 5);
        assert_eq!(doc["resources"].as_array().unwrap().len(), 2);
    }
}

//! Remote desktop tools
//!
//! The five tools the gateway publishes. Each one reads already-validated
//! arguments and delegates to the shared [`SessionOrchestrator`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::schema::{SchemaProperty, ToolSchema};
use super::tools::{Tool, ToolOutput, ToolRegistry};
use crate::command::ScreenshotMode;
use crate::orchestrator::{
    ConnectionRequest, DisplaySettings, PerformanceMonitor, PerformancePreset, SessionError,
    SessionOrchestrator, SessionRecord, COLOR_DEPTHS,
};

const PRESETS: [&str; 3] = ["Performance", "Balanced", "Quality"];
const MODES: [&str; 3] = ["session", "application", "fullscreen"];

/// Register every RDP tool against `orchestrator`
///
/// With a `monitor`, `list_rdp_sessions` reports its counters alongside each
/// session's metrics.
pub fn register_rdp_tools(
    registry: &mut ToolRegistry,
    orchestrator: &SessionOrchestrator,
    monitor: Option<PerformanceMonitor>,
) {
    let tools: [Arc<dyn Tool>; 5] = [
        Arc::new(ConnectTool::new(orchestrator.clone())),
        Arc::new(ListSessionsTool::new(orchestrator.clone(), monitor)),
        Arc::new(DisconnectTool::new(orchestrator.clone())),
        Arc::new(CaptureScreenshotTool::new(orchestrator.clone())),
        Arc::new(ConfigureSessionTool::new(orchestrator.clone())),
    ];
    for tool in tools {
        if let Err(e) = registry.register(tool) {
            tracing::warn!(error = %e, "Skipping tool");
        }
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn int_arg<T: TryFrom<i64>>(args: &Map<String, Value>, key: &str) -> Option<T> {
    args.get(key)
        .and_then(Value::as_i64)
        .and_then(|i| T::try_from(i).ok())
}

fn bool_arg(args: &Map<String, Value>, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// Overlay display-related arguments on `base`
fn display_from(args: &Map<String, Value>, mut base: DisplaySettings) -> DisplaySettings {
    if let Some(preset) = str_arg(args, "preset").and_then(PerformancePreset::parse) {
        base.preset = preset;
    }
    if let Some(width) = int_arg(args, "width") {
        base.width = width;
    }
    if let Some(height) = int_arg(args, "height") {
        base.height = height;
    }
    if let Some(depth) = int_arg(args, "colorDepth") {
        base.color_depth = depth;
    }
    if let Some(full) = bool_arg(args, "fullScreen") {
        base.full_screen = full;
    }
    base
}

fn display_properties(schema: ToolSchema) -> ToolSchema {
    schema
        .property(
            "width",
            SchemaProperty::integer("Screen resolution width (default: 1920)").between(800, 7680),
        )
        .property(
            "height",
            SchemaProperty::integer("Screen resolution height (default: 1080)").between(600, 4320),
        )
        .property(
            "colorDepth",
            SchemaProperty::integer("Color depth in bits (8, 15, 16, 24, 32)").one_of(&COLOR_DEPTHS),
        )
        .property(
            "fullScreen",
            SchemaProperty::boolean("Use full screen mode (default: false)"),
        )
        .property(
            "preset",
            SchemaProperty::string("Performance preset").one_of(&PRESETS),
        )
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

// ============================================================================
// connect_rdp
// ============================================================================

/// Starts a session
pub struct ConnectTool {
    orchestrator: SessionOrchestrator,
}

impl ConnectTool {
    /// Create the tool
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for ConnectTool {
    fn name(&self) -> &'static str {
        "connect_rdp"
    }

    fn description(&self) -> &'static str {
        "Connect to a remote desktop server with configurable resolution and performance settings"
    }

    fn schema(&self) -> ToolSchema {
        display_properties(
            ToolSchema::object()
                .required(
                    "host",
                    SchemaProperty::string("Remote desktop server hostname or IP address"),
                )
                .required("username", SchemaProperty::string("Username for authentication"))
                .property(
                    "password",
                    SchemaProperty::string("Password for authentication (optional)"),
                )
                .property(
                    "port",
                    SchemaProperty::integer("RDP port (default: 3389)").between(1, 65535),
                )
                .property(
                    "sessionName",
                    SchemaProperty::string("Custom name for the session"),
                ),
        )
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let host = str_arg(args, "host").unwrap_or_default();
        let username = str_arg(args, "username").unwrap_or_default();

        let mut request = ConnectionRequest::new(host)
            .with_username(username)
            .with_display(display_from(args, DisplaySettings::default()));
        if let Some(port) = int_arg(args, "port") {
            request = request.with_port(port);
        }
        if let Some(password) = args.get("password").and_then(Value::as_str) {
            request = request.with_password(password);
        }
        if let Some(name) = str_arg(args, "sessionName") {
            request = request.with_session_name(name);
        }

        match self.orchestrator.start_session(request) {
            Ok(id) => {
                info!(session_id = %id, %host, "Session started over RPC");
                let details = self
                    .orchestrator
                    .get_session(id)
                    .map(|r| pretty(&r))
                    .unwrap_or_default();
                Ok(ToolOutput::text(format!(
                    "Successfully initiated RDP connection to {host}. Session details:\n\n```json\n{details}\n```"
                )))
            }
            Err(e) => Ok(ToolOutput::error(format!("Error connecting to RDP: {e}"))),
        }
    }
}

// ============================================================================
// list_rdp_sessions
// ============================================================================

/// Lists sessions
pub struct ListSessionsTool {
    orchestrator: SessionOrchestrator,
    monitor: Option<PerformanceMonitor>,
}

impl ListSessionsTool {
    /// Create the tool
    pub fn new(orchestrator: SessionOrchestrator, monitor: Option<PerformanceMonitor>) -> Self {
        Self {
            orchestrator,
            monitor,
        }
    }

    fn session_metrics(&self, record: &SessionRecord) -> Value {
        let now = Utc::now();
        let uptime = record
            .connected_at
            .map(|at| (now - at).num_seconds().max(0));
        let monitoring = self
            .monitor
            .as_ref()
            .and_then(|m| m.metrics(record.id))
            .map(|m| {
                json!({
                    "monitoredSeconds": m.monitored_seconds(now),
                    "connectAttempts": m.connect_attempts,
                    "connectLatencyMs": m.connect_latency_ms,
                    "statusChanges": m.status_changes,
                    "lastChange": m.last_change,
                })
            });
        json!({
            "status": record.status,
            "uptimeSeconds": uptime,
            "preset": record.display.preset,
            "options": record.display.preset.options(),
            "monitoring": monitoring,
        })
    }
}

#[async_trait]
impl Tool for ListSessionsTool {
    fn name(&self) -> &'static str {
        "list_rdp_sessions"
    }

    fn description(&self) -> &'static str {
        "List all RDP sessions with their status and, optionally, performance metrics"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::object().property(
            "includeMetrics",
            SchemaProperty::boolean("Include performance metrics for each session"),
        )
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let include_metrics = bool_arg(args, "includeMetrics").unwrap_or(false);
        let sessions = self.orchestrator.list_sessions();

        let mut text = String::from("## Active RDP Sessions\n\n");
        if sessions.is_empty() {
            text.push_str("No active RDP sessions found.");
        }
        for (i, record) in sessions.iter().enumerate() {
            text.push_str(&format!(
                "### Session {}\n```json\n{}\n```\n\n",
                i + 1,
                pretty(record)
            ));
            if include_metrics {
                text.push_str(&format!(
                    "**Performance Metrics:**\n```json\n{}\n```\n\n",
                    pretty(&self.session_metrics(record))
                ));
            }
        }
        Ok(ToolOutput::text(text))
    }
}

// ============================================================================
// disconnect_rdp
// ============================================================================

/// Ends a session
pub struct DisconnectTool {
    orchestrator: SessionOrchestrator,
}

impl DisconnectTool {
    /// Create the tool
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for DisconnectTool {
    fn name(&self) -> &'static str {
        "disconnect_rdp"
    }

    fn description(&self) -> &'static str {
        "Disconnect an RDP session by id, index, name or host"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::object().required(
            "sessionId",
            SchemaProperty::string("ID of the RDP session to disconnect"),
        )
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let reference = str_arg(args, "sessionId").unwrap_or_default();
        let Some(id) = self.orchestrator.resolve(reference) else {
            return Ok(ToolOutput::error(format!("No session matches '{reference}'")));
        };

        if self.orchestrator.end_session(id).await {
            Ok(ToolOutput::text(format!("Disconnected session {id}")))
        } else {
            Ok(ToolOutput::error(format!("Session {id} is already disconnecting")))
        }
    }
}

// ============================================================================
// capture_screenshot
// ============================================================================

/// Captures a screenshot of a session
pub struct CaptureScreenshotTool {
    orchestrator: SessionOrchestrator,
}

impl CaptureScreenshotTool {
    /// Create the tool
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for CaptureScreenshotTool {
    fn name(&self) -> &'static str {
        "capture_screenshot"
    }

    fn description(&self) -> &'static str {
        "Capture a screenshot of a session, the client application or the full screen"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::object()
            .required(
                "sessionId",
                SchemaProperty::string("ID of the RDP session to capture"),
            )
            .property(
                "mode",
                SchemaProperty::string("Capture mode (default: session)").one_of(&MODES),
            )
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let reference = str_arg(args, "sessionId").unwrap_or_default();
        let mode = str_arg(args, "mode")
            .and_then(ScreenshotMode::parse)
            .unwrap_or_default();

        let Some(id) = self.orchestrator.resolve(reference) else {
            return Ok(ToolOutput::error(format!("No session matches '{reference}'")));
        };

        match self.orchestrator.capture_screenshot(Some(id), mode).await {
            Ok(path) => Ok(ToolOutput::text(format!(
                "Screenshot saved to {}",
                path.display()
            ))),
            Err(e) => match e.downcast_ref::<SessionError>() {
                Some(refused) => {
                    debug!(session_id = %id, reason = %refused, "Screenshot refused");
                    Ok(ToolOutput::error(format!("Cannot capture screenshot: {refused}")))
                }
                None => Err(e),
            },
        }
    }
}

// ============================================================================
// configure_rdp_session
// ============================================================================

/// Changes display and performance settings of a session
pub struct ConfigureSessionTool {
    orchestrator: SessionOrchestrator,
}

impl ConfigureSessionTool {
    /// Create the tool
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for ConfigureSessionTool {
    fn name(&self) -> &'static str {
        "configure_rdp_session"
    }

    fn description(&self) -> &'static str {
        "Configure resolution, color depth and performance preset of an existing RDP session"
    }

    fn schema(&self) -> ToolSchema {
        display_properties(ToolSchema::object().required(
            "sessionId",
            SchemaProperty::string("ID of the RDP session to configure"),
        ))
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let reference = str_arg(args, "sessionId").unwrap_or_default();
        let Some(record) = self
            .orchestrator
            .resolve(reference)
            .and_then(|id| self.orchestrator.get_session(id))
        else {
            return Ok(ToolOutput::error(format!("No session matches '{reference}'")));
        };

        let display = display_from(args, record.display.clone());
        if self.orchestrator.configure(record.id, display.clone()) {
            Ok(ToolOutput::text(format!(
                "Successfully applied settings to session {}:\n\n```json\n{}\n```",
                record.id,
                pretty(&display)
            )))
        } else {
            Ok(ToolOutput::error(format!(
                "Failed to apply settings to session {}",
                record.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::orchestrator::{
        OrchestratorConfig, SessionStatus, SimulatedCapture, SimulatedConnector,
    };

    fn setup() -> (SessionOrchestrator, ToolRegistry) {
        let orchestrator =
            SessionOrchestrator::simulated(Duration::from_millis(5), OrchestratorConfig::default());
        let mut registry = ToolRegistry::new();
        register_rdp_tools(&mut registry, &orchestrator, None);
        (orchestrator, registry)
    }

    async fn settle(orchestrator: &SessionOrchestrator, status: SessionStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if orchestrator.list_sessions().iter().all(|r| r.status == status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sessions never reached {status}");
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn call(registry: &ToolRegistry, name: &str, value: Value) -> ToolOutput {
        registry.call(name, &args(value)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_all_tools_registered() {
        let (_, registry) = setup();
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "connect_rdp",
                "list_rdp_sessions",
                "disconnect_rdp",
                "capture_screenshot",
                "configure_rdp_session"
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_requires_username() {
        let (orchestrator, registry) = setup();
        let out = call(&registry, "connect_rdp", json!({"host": "a.example.com"})).await;

        assert!(out.is_error);
        assert!(out.joined_text().contains("username is required"));
        assert_eq!(orchestrator.session_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_with_settings() {
        let (orchestrator, registry) = setup();
        let out = call(
            &registry,
            "connect_rdp",
            json!({
                "host": "a.example.com",
                "username": "admin",
                "password": "secret",
                "port": 3390,
                "width": 1280,
                "height": 720,
                "colorDepth": 16,
                "preset": "Performance",
                "sessionName": "build box"
            }),
        )
        .await;

        assert!(!out.is_error, "{}", out.joined_text());
        assert!(!out.joined_text().contains("secret"));
        let record = &orchestrator.list_sessions()[0];
        assert_eq!(record.port, 3390);
        assert_eq!(record.name.as_deref(), Some("build box"));
        assert_eq!(record.display.width, 1280);
        assert_eq!(record.display.color_depth, 16);
        assert_eq!(record.display.preset, PerformancePreset::Performance);
    }

    #[tokio::test]
    async fn test_out_of_range_port_is_rejected() {
        let (orchestrator, registry) = setup();
        let out = call(
            &registry,
            "connect_rdp",
            json!({"host": "a.example.com", "username": "u", "port": 0}),
        )
        .await;
        assert!(out.is_error);
        assert_eq!(orchestrator.session_count(), 0);
    }

    #[tokio::test]
    async fn test_list_disconnect_and_configure() {
        let (orchestrator, registry) = setup();
        let empty = call(&registry, "list_rdp_sessions", json!({})).await;
        assert!(empty.joined_text().contains("No active RDP sessions found."));

        call(&registry, "connect_rdp", json!({"host": "a.example.com", "username": "u"})).await;

        let listed = call(&registry, "list_rdp_sessions", json!({"includeMetrics": true})).await;
        assert!(listed.joined_text().contains("### Session 1"));
        assert!(listed.joined_text().contains("Performance Metrics"));

        let configured = call(
            &registry,
            "configure_rdp_session",
            json!({"sessionId": "1", "preset": "Quality", "fullScreen": true}),
        )
        .await;
        assert!(!configured.is_error);
        let record = &orchestrator.list_sessions()[0];
        assert_eq!(record.display.preset, PerformancePreset::Quality);
        assert!(record.display.full_screen);

        let gone = call(&registry, "disconnect_rdp", json!({"sessionId": "a.example.com"})).await;
        assert!(!gone.is_error);
        assert_eq!(orchestrator.session_count(), 0);

        let again = call(&registry, "disconnect_rdp", json!({"sessionId": "1"})).await;
        assert!(again.is_error);
    }

    #[tokio::test]
    async fn test_capture_screenshot() {
        let (_, registry) = setup();
        let missing = call(&registry, "capture_screenshot", json!({"sessionId": "last"})).await;
        assert!(missing.is_error);

        call(&registry, "connect_rdp", json!({"host": "a.example.com", "username": "u"})).await;
        let bad_mode = call(
            &registry,
            "capture_screenshot",
            json!({"sessionId": "last", "mode": "window"}),
        )
        .await;
        assert!(bad_mode.is_error);

        let ok = call(
            &registry,
            "capture_screenshot",
            json!({"sessionId": "last", "mode": "fullscreen"}),
        )
        .await;
        assert!(!ok.is_error, "{}", ok.joined_text());
        assert!(ok.joined_text().contains("Screenshot saved to"));
    }

    #[tokio::test]
    async fn test_capture_of_failed_session_is_tool_error() {
        let orchestrator = SessionOrchestrator::new(
            Arc::new(
                SimulatedConnector::new(Duration::from_millis(5))
                    .with_unreachable_host("down.example.com"),
            ),
            Arc::new(SimulatedCapture::new("/tmp/rdp-conductor-tests")),
            OrchestratorConfig::default(),
        );
        let mut registry = ToolRegistry::new();
        register_rdp_tools(&mut registry, &orchestrator, None);

        call(&registry, "connect_rdp", json!({"host": "down.example.com", "username": "u"})).await;
        settle(&orchestrator, SessionStatus::Failed).await;

        let output = registry
            .call("capture_screenshot", &args(json!({"sessionId": "down.example.com"})))
            .await
            .unwrap();
        let output = output.expect("state refusals are tool results, not failures");
        assert!(output.is_error);
        assert!(output.joined_text().contains("is Failed"), "{}", output.joined_text());
    }

    #[tokio::test]
    async fn test_non_session_modes_still_need_known_session() {
        let (_, registry) = setup();
        for mode in ["fullscreen", "application"] {
            let out = call(
                &registry,
                "capture_screenshot",
                json!({"sessionId": "ghost", "mode": mode}),
            )
            .await;
            assert!(out.is_error, "{mode}");
            assert!(out.joined_text().contains("No session matches 'ghost'"));
        }
    }

    #[tokio::test]
    async fn test_list_includes_monitor_counters() {
        let orchestrator =
            SessionOrchestrator::simulated(Duration::from_millis(5), OrchestratorConfig::default());
        let monitor = PerformanceMonitor::new();
        let task = monitor.spawn(&orchestrator);
        let mut registry = ToolRegistry::new();
        register_rdp_tools(&mut registry, &orchestrator, Some(monitor.clone()));

        call(&registry, "connect_rdp", json!({"host": "a.example.com", "username": "u"})).await;
        settle(&orchestrator, SessionStatus::Connected).await;
        let id = orchestrator.list_sessions()[0].id;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while monitor.metrics(id).and_then(|m| m.connect_latency_ms).is_none()
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let listed = call(&registry, "list_rdp_sessions", json!({"includeMetrics": true})).await;
        let text = listed.joined_text();
        assert!(text.contains("\"connectAttempts\": 1"), "{text}");
        assert!(text.contains("connectLatencyMs"));

        let plain = call(&registry, "list_rdp_sessions", json!({})).await;
        assert!(!plain.joined_text().contains("connectAttempts"));
        task.abort();
    }
}

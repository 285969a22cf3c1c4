//! Cross-component behavior tests
//!
//! Each test drives the public API the way the daemon does: one orchestrator
//! shared by the parser-driven chat path and the RPC gateway.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use rdp_conductor_core::command::{ActionKind, CommandAction, ScreenshotMode};
use rdp_conductor_core::{
    ChainExecutor, Command, CommandDispatcher, ConnectionRequest, ConversationStore,
    IntentParser, MemoryProfileStore, OrchestratorConfig, RpcGateway, SessionId,
    SessionOrchestrator, SessionStatus,
};

fn orchestrator(delay: Duration) -> SessionOrchestrator {
    SessionOrchestrator::simulated(delay, OrchestratorConfig::default())
}

async fn wait_until_settled(orchestrator: &SessionOrchestrator, id: SessionId) -> SessionStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = orchestrator
            .get_session(id)
            .map(|record| record.status)
            .expect("session should exist");
        if status != SessionStatus::Connecting || tokio::time::Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Intent parsing
// =============================================================================

#[tokio::test]
async fn test_disconnect_all_wins_in_any_case() {
    let parser = IntentParser::rules_only();
    for input in [
        "disconnect all",
        "Please DISCONNECT ALL sessions",
        "close all of them",
        "connect to a.example.com and then Close All",
        "save profile and disconnect all",
    ] {
        assert_eq!(
            parser.interpret(input).await.kind(),
            ActionKind::DisconnectAll,
            "input: {input}"
        );
    }
}

#[tokio::test]
async fn test_connect_host_strips_trailing_punctuation() {
    let parser = IntentParser::rules_only();
    for (input, host) in [
        ("connect to server1.example.com", "server1.example.com"),
        ("Connect to server1.example.com.", "server1.example.com"),
        ("rdp to 10.0.0.5!", "10.0.0.5"),
        ("please connect to db.internal.lan, thanks", "db.internal.lan"),
    ] {
        let command = parser.interpret(input).await;
        match command.action {
            CommandAction::Connect { host: Some(h), .. } => assert_eq!(h, host, "input: {input}"),
            other => panic!("input {input:?} parsed as {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_chained_input_splits_into_connect_then_screenshot() {
    let parser = IntentParser::rules_only();
    let command = parser
        .interpret("connect to server1.com as admin and take a screenshot")
        .await;

    assert_eq!(command.kind(), ActionKind::ChainedCommands);
    let kinds: Vec<ActionKind> = command.sub_commands().iter().map(Command::kind).collect();
    assert!(kinds.len() >= 2);
    assert_eq!(kinds[0], ActionKind::Connect);
    assert_eq!(kinds[1], ActionKind::Screenshot);
}

// =============================================================================
// Conversation store
// =============================================================================

#[test]
fn test_get_or_create_without_id_gives_fresh_contexts() {
    let store = ConversationStore::new();
    let first = store.get_or_create(None);
    let second = store.get_or_create(None);

    assert_ne!(first.id(), second.id());
    assert_eq!(first.message_count(), 0);
    assert_eq!(second.message_count(), 0);
    assert_eq!(store.len(), 2);
}

// =============================================================================
// Chain execution
// =============================================================================

#[tokio::test]
async fn test_chain_runs_in_priority_order_and_keeps_every_result() {
    let orchestrator = orchestrator(Duration::from_millis(5));
    let dispatcher = CommandDispatcher::new(orchestrator.clone(), Arc::new(MemoryProfileStore::new()));
    let executor = ChainExecutor::new(dispatcher, Duration::ZERO);
    let conversation = ConversationStore::new().get_or_create(None);

    let cmd_a = Command::connect("a.example.com", Some("admin".to_string())).with_priority(2);
    let cmd_b = Command::new(CommandAction::Disconnect { session: None }).with_priority(1);

    let results = executor.execute(&[cmd_a, cmd_b], &conversation).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].command.kind(), ActionKind::Disconnect);
    assert!(!results[0].success);
    assert_eq!(results[1].command.kind(), ActionKind::Connect);
    assert!(results[1].success);
    assert_eq!(orchestrator.session_count(), 1);
}

// =============================================================================
// Session orchestration
// =============================================================================

#[tokio::test]
async fn test_start_session_with_empty_host_creates_nothing() {
    let orchestrator = orchestrator(Duration::from_millis(5));
    assert!(orchestrator.start_session(ConnectionRequest::new("")).is_err());
    assert!(orchestrator.start_session(ConnectionRequest::new("   ")).is_err());
    assert_eq!(orchestrator.session_count(), 0);
    assert!(orchestrator.list_sessions().is_empty());
}

#[tokio::test]
async fn test_start_session_settles_after_connecting() {
    let orchestrator = orchestrator(Duration::from_millis(20));
    let id = orchestrator
        .start_session(
            ConnectionRequest::new("127.0.0.1")
                .with_username("u")
                .with_password("p"),
        )
        .unwrap();

    assert!(!id.to_string().is_empty());
    assert_eq!(
        orchestrator.get_session(id).unwrap().status,
        SessionStatus::Connecting
    );

    let settled = wait_until_settled(&orchestrator, id).await;
    assert!(matches!(
        settled,
        SessionStatus::Connected | SessionStatus::Failed
    ));
}

#[tokio::test]
async fn test_end_unknown_session_leaves_registry_alone() {
    let orchestrator = orchestrator(Duration::from_millis(5));
    let id = orchestrator
        .start_session(ConnectionRequest::new("keep.example.com"))
        .unwrap();
    wait_until_settled(&orchestrator, id).await;
    let before = orchestrator.get_session(id).unwrap();

    assert!(!orchestrator.end_session(SessionId::new()).await);

    let after = orchestrator.get_session(id).unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(orchestrator.session_count(), 1);
}

// =============================================================================
// Command wire shape
// =============================================================================

#[test]
fn test_every_action_kind_survives_json() {
    let commands = vec![
        Command::connect("server1.example.com", Some("admin".to_string())),
        Command::disconnect("2"),
        Command::disconnect_all(),
        Command::list_sessions(),
        Command::screenshot("last", ScreenshotMode::Fullscreen),
        Command::new(CommandAction::CreateProfile {
            name: Some("prod".to_string()),
            host: Some("prod.example.com".to_string()),
            username: None,
        }),
        Command::load_profile("prod"),
        Command::chained(vec![
            Command::connect("a.example.com", None).with_priority(1),
            Command::screenshot("last", ScreenshotMode::Application).with_priority(2),
        ]),
        Command::general_help("Try 'list sessions'"),
        Command::unknown().needing_more_info(vec!["What would you like to do?".to_string()]),
    ];

    let seen: Vec<ActionKind> = commands.iter().map(Command::kind).collect();
    assert_eq!(seen, ActionKind::ALL.to_vec());

    for command in commands {
        let json = serde_json::to_string(&command).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, command, "json: {json}");
    }
}

// =============================================================================
// RPC gateway
// =============================================================================

async fn initialized_gateway() -> (RpcGateway, SessionOrchestrator) {
    let orchestrator = orchestrator(Duration::from_millis(5));
    let gateway = RpcGateway::for_orchestrator(&orchestrator, Arc::new(MemoryProfileStore::new()));
    let init = gateway
        .handle_raw(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#)
        .await
        .unwrap();
    assert!(init.error.is_none());
    (gateway, orchestrator)
}

async fn call(gateway: &RpcGateway, params: Value) -> Value {
    let body = json!({"jsonrpc": "2.0", "id": "t", "method": "tools/call", "params": params});
    let response = gateway.handle_raw(&body.to_string()).await.unwrap();
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn test_tools_call_unknown_tool_is_method_not_found() {
    let (gateway, _) = initialized_gateway().await;
    let response = call(&gateway, json!({"name": "format_disk", "arguments": {}})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], "t");
}

#[tokio::test]
async fn test_tools_call_missing_argument_is_tool_error_without_mutation() {
    let (gateway, orchestrator) = initialized_gateway().await;
    let response = call(
        &gateway,
        json!({"name": "connect_rdp", "arguments": {"username": "admin"}}),
    )
    .await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("host"));
    assert_eq!(orchestrator.session_count(), 0);
}

#[tokio::test]
async fn test_chat_and_rpc_share_one_registry() {
    let (gateway, orchestrator) = initialized_gateway().await;
    let dispatcher =
        CommandDispatcher::new(orchestrator.clone(), Arc::new(MemoryProfileStore::new()));

    let parsed = IntentParser::rules_only()
        .interpret("connect to chat.example.com as admin")
        .await;
    assert!(dispatcher.execute(&parsed).await.success);

    let response = call(
        &gateway,
        json!({"name": "list_rdp_sessions", "arguments": {}}),
    )
    .await;
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("chat.example.com"));
}

#[tokio::test]
async fn test_screenshot_rule_matches_on_chat_and_rpc() {
    let (gateway, orchestrator) = initialized_gateway().await;
    let dispatcher =
        CommandDispatcher::new(orchestrator.clone(), Arc::new(MemoryProfileStore::new()));

    let chat = dispatcher
        .execute(&Command::screenshot("ghost", ScreenshotMode::Fullscreen))
        .await;
    let rpc = call(
        &gateway,
        json!({"name": "capture_screenshot", "arguments": {"sessionId": "ghost", "mode": "fullscreen"}}),
    )
    .await;
    assert!(!chat.success);
    assert_eq!(rpc["result"]["isError"], true);

    dispatcher
        .execute(&Command::connect("shot.example.com", Some("admin".to_string())))
        .await;
    let chat = dispatcher
        .execute(&Command::screenshot("shot.example.com", ScreenshotMode::Fullscreen))
        .await;
    let rpc = call(
        &gateway,
        json!({"name": "capture_screenshot", "arguments": {"sessionId": "shot.example.com", "mode": "fullscreen"}}),
    )
    .await;
    assert!(chat.success, "{}", chat.message);
    assert_eq!(rpc["result"]["isError"], false);
}

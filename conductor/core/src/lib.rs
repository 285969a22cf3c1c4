//! RDP Conductor Core - Command Interpretation and Session Orchestration
//!
//! This crate turns natural-language requests ("connect to server1.com as
//! admin") and JSON-RPC tool calls into actions on a single, process-wide
//! registry of remote desktop sessions. It carries no HTTP server code; the
//! daemon crate wires it to the network.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │        Chat surface          │      │       Programmatic caller    │
//! └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                │ text                                │ JSON-RPC 2.0
//! ┌──────────────▼───────────────┐      ┌──────────────▼───────────────┐
//! │          Assistant           │      │          RpcGateway          │
//! │  ConversationStore           │      │  ToolRegistry  (schemas)     │
//! │  IntentParser ── LlmBackend? │      │  ResourceCatalog             │
//! │  ChainExecutor               │      │                              │
//! │  CommandDispatcher ─ Profiles│      │                              │
//! └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                │                                     │
//!                └──────────────┬──────────────────────┘
//!                               ▼
//!                 ┌──────────────────────────────┐
//!                 │     SessionOrchestrator      │
//!                 │  registry, connect tasks,    │
//!                 │  status-change broadcast     │
//!                 └──────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Command`]: one interpreted action with its arguments and chaining data
//! - [`IntentParser`]: text to [`Command`], model-backed or rules-only
//! - [`ChainExecutor`]: runs chained commands in priority order
//! - [`SessionOrchestrator`]: the authoritative session registry
//! - [`RpcGateway`]: JSON-RPC envelope handling, tools and resources
//! - [`Assistant`]: the chat surface entry point
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rdp_conductor_core::{
//!     Assistant, AssistantConfig, CommandDispatcher, ConversationStore, IntentParser,
//!     MemoryProfileStore, OrchestratorConfig, RpcGateway, SessionOrchestrator,
//! };
//!
//! let orchestrator =
//!     SessionOrchestrator::simulated(Duration::from_secs(2), OrchestratorConfig::default());
//! let profiles = Arc::new(MemoryProfileStore::new());
//!
//! let assistant = Assistant::new(
//!     IntentParser::rules_only(),
//!     CommandDispatcher::new(orchestrator.clone(), profiles.clone()),
//!     Arc::new(ConversationStore::new()),
//!     AssistantConfig::default(),
//! );
//! let reply = assistant.handle("connect to server1.com as admin", None).await;
//!
//! let gateway = RpcGateway::for_orchestrator(&orchestrator, profiles);
//! let response = gateway.handle_raw(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
//! ```
//!
//! # Module Overview
//!
//! - [`command`]: the command model and its JSON wire shape
//! - [`conversation`]: per-conversation message history and key/value state
//! - [`intent`]: rule-based and model-backed intent parsing
//! - [`chain`]: ordered execution of chained commands with progress events
//! - [`dispatch`]: executing one command against the orchestrator
//! - [`orchestrator`]: session lifecycle, connect attempts, screenshots
//! - [`profiles`]: saved connection profiles
//! - [`rpc`]: the JSON-RPC gateway
//! - [`backend`]: optional external language model
//! - [`assistant`]: the chat facade
//! - [`config`]: TOML/env configuration loading

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assistant;
pub mod backend;
pub mod chain;
pub mod command;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod intent;
pub mod orchestrator;
pub mod profiles;
pub mod rpc;

// Re-exports for convenience
pub use assistant::{Assistant, AssistantConfig, AssistantReply};
pub use backend::{BackendConfig, ChatCompletionsBackend, LlmBackend, LlmRequest, LlmResponse};
pub use chain::{ChainExecutor, ChainReport, ProgressEvent};
pub use command::{ActionKind, Command, CommandAction, CommandDecodeError, ScreenshotMode};
pub use conversation::{
    ConversationHandle, ConversationId, ConversationMessage, ConversationStore, MessageRole,
};
pub use dispatch::{CommandDispatcher, StepResult};
pub use intent::IntentParser;
pub use orchestrator::{
    ConnectionRequest, DisplaySettings, OrchestratorConfig, PerformanceMonitor, PerformancePreset,
    SessionError, SessionId, SessionMetrics, SessionOrchestrator, SessionRecord, SessionStatus,
    SimulatedCapture, SimulatedConnector, StatusChange,
};
pub use profiles::{
    JsonFileProfileStore, MemoryProfileStore, ProfileError, ProfileStore, SessionProfile,
};
pub use rpc::{RpcGateway, RpcRequest, RpcResponse, ToolRegistry};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConductorToml,
    ConfigError, ConfigOverrides, ConfigSource,
};

//! RPC Gateway
//!
//! JSON-RPC 2.0 surface for programmatic callers. It drives the same
//! [`SessionOrchestrator`](crate::orchestrator::SessionOrchestrator) instance
//! as the chat surface.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │                 RpcGateway                   │
//!   │  envelope decode ─▶ handshake gate ─▶ method │
//!   └───────────┬───────────────────────┬──────────┘
//!               │                       │
//!        ┌──────▼──────┐         ┌──────▼─────────┐
//!        │ToolRegistry │         │ResourceCatalog │
//!        │ schema check│         │ rdp://sessions │
//!        │ RDP tools   │         │ rdp://profiles │
//!        └──────┬──────┘         └────────────────┘
//!               ▼
//!      SessionOrchestrator
//! ```
//!
//! Protocol errors are the only errors returned as JSON-RPC error objects.
//! Tool-level failures such as missing arguments come back as results with
//! `isError: true`.

pub mod envelope;
pub mod gateway;
pub mod rdp_tools;
pub mod resources;
pub mod schema;
pub mod tools;

pub use envelope::{
    RpcError, RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND,
    NOT_INITIALIZED, PARSE_ERROR,
};
pub use gateway::{Capabilities, RpcGateway, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};
pub use rdp_tools::register_rdp_tools;
pub use resources::{ResourceCatalog, ResourceContent, ResourceDescriptor, PROFILES_URI, SESSIONS_URI};
pub use schema::{PropertyType, SchemaProperty, ToolSchema, Violation};
pub use tools::{ContentBlock, RegistryError, Tool, ToolDescriptor, ToolOutput, ToolRegistry};

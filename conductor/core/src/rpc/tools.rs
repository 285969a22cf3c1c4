//! Tool trait and registry
//!
//! A tool is an RPC-addressable capability with a name, a description and an
//! argument schema. The registry checks arguments against the tool's own
//! schema before the tool runs, so a rejected call never reaches the
//! orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::schema::ToolSchema;

/// One block of tool output
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    /// Block type, always "text"
    #[serde(rename = "type")]
    pub kind: String,
    /// Block text
    pub text: String,
}

impl ContentBlock {
    /// Text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Result of a tool call
///
/// Expected failures (bad arguments, unknown session) are reported with
/// `is_error` set instead of as RPC errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Output blocks
    pub content: Vec<ContentBlock>,
    /// Whether the call failed
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output with one text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    /// Failed output with one text block
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
        }
    }

    /// All text joined by newlines
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Published description of a tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// Argument schema
    pub input_schema: ToolSchema,
}

/// An RPC-callable capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name
    fn name(&self) -> &'static str;

    /// One-line description
    fn description(&self) -> &'static str;

    /// Argument schema
    fn schema(&self) -> ToolSchema;

    /// Run with arguments that already passed the schema
    ///
    /// An `Err` is an internal failure and becomes an RPC error.
    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput>;

    /// Descriptor for listings
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.schema(),
        }
    }
}

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with the same name exists
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),
}

/// Registered tools, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.get(tool.name()).is_some() {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        debug!(tool = tool.name(), "Registered tool");
        self.tools.push(tool);
        Ok(())
    }

    /// Look up a tool by exact name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Descriptors of all tools
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Call a tool by name
    ///
    /// Returns `None` for an unknown name. Schema violations come back as an
    /// error output naming every offending field.
    pub async fn call(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Option<anyhow::Result<ToolOutput>> {
        let tool = self.get(name)?;

        if let Err(violations) = tool.schema().validate(args) {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(tool = name, %detail, "Rejected tool arguments");
            return Some(Ok(ToolOutput::error(format!("Invalid arguments: {detail}"))));
        }

        Some(tool.execute(args).await)
    }
}

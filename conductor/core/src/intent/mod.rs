//! Intent Parser
//!
//! Turns free text into a [`Command`]. Parsing never fails: anything the
//! parser cannot place becomes `GeneralHelp` with a reply.
//!
//! # Architecture
//!
//! ```text
//!   text ──▶ IntentParser::parse
//!              │
//!              ├─ backend configured? ──yes──▶ model (bounded by timeout)
//!              │                                  │
//!              │                     strip fences, cut the JSON object,
//!              │                     decode the command JSON shape
//!              │                                  │
//!              │        timeout / HTTP error / bad JSON / Unknown
//!              │                                  │
//!              ▼                                  ▼
//!         keyword rules ◀──────────────────── fallback
//! ```
//!
//! # Design Philosophy
//!
//! Fallback mode is a first-class mode, not an error state. A model reply is
//! only trusted after it decodes into the same command shape the rules
//! produce, and model errors are logged, never returned.

mod replies;
mod rules;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{LlmBackend, LlmRequest};
use crate::command::{ActionKind, Command};
use crate::conversation::{ConversationHandle, ConversationMessage};

pub use replies::{reply_for, ReplyTopic};
pub use rules::classify;

/// Number of recent messages sent to the model as context
const CONTEXT_MESSAGES: usize = 6;

/// System prompt for model-backed parsing
pub const COMMAND_PROMPT: &str = r#"You are AssistBot, an AI assistant for a retro-cyber Remote Desktop client.

Parse the user's request and reply with a single JSON object, nothing else.

Actions:
- Connect: "connect to [host] as [user]", "rdp to [server]"
- Disconnect: "disconnect session [number/name]", "close connection"
- DisconnectAll: "disconnect all", "close all sessions"
- ListSessions: "show sessions", "list connections"
- Screenshot: "screenshot session [number]", "capture full screen"
- CreateProfile: "save profile [name] for [host]"
- LoadProfile: "load profile [name]"
- ChainedCommands: several of the above joined by "and"/"then"
- GeneralHelp: any other question about RDP or the application

Fields:
- action: one of the action names above
- host, username, port (default 3389): for Connect and CreateProfile
- sessionId: session number, name, host or id, for Disconnect and Screenshot
- screenshotMode: "session", "application" or "fullscreen"
- profileName: for CreateProfile and LoadProfile
- chainedCommands: array of commands with "priority" 1, 2, ... for ChainedCommands
- explanation: what you understood, or your answer for GeneralHelp
- needsMoreInfo: true if required details are missing
- followUpQuestions: questions to ask when needsMoreInfo is true

Examples:
User: "connect to server.example.com as admin"
{"action": "Connect", "host": "server.example.com", "username": "admin", "port": 3389, "explanation": "Connecting to server.example.com as admin", "needsMoreInfo": false}

User: "disconnect session 1"
{"action": "Disconnect", "sessionId": "1", "explanation": "Disconnecting session 1", "needsMoreInfo": false}

User: "what is RDP?"
{"action": "GeneralHelp", "explanation": "RDP is Microsoft's Remote Desktop Protocol...", "needsMoreInfo": false}"#;

/// Why a model reply was rejected
#[derive(Debug, Error)]
pub enum ModelReplyError {
    /// No JSON object in the reply
    #[error("model reply contains no JSON object")]
    NoJson,

    /// JSON does not match the command shape
    #[error("model reply is not a valid command: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The model could not classify the request
    #[error("model reply has action Unknown")]
    Unknown,
}

/// Decode a model reply into a command
///
/// Code fences and any prose around the outermost JSON object are ignored.
///
/// # Errors
///
/// Fails when no object is present, the object does not decode into the
/// command shape, or the action is `Unknown`.
pub fn decode_model_reply(content: &str) -> Result<Command, ModelReplyError> {
    let body = strip_fences(content);
    let (start, end) = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(ModelReplyError::NoJson),
    };

    let command: Command = serde_json::from_str(&body[start..=end])?;
    if command.kind() == ActionKind::Unknown {
        return Err(ModelReplyError::Unknown);
    }
    Ok(command)
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Natural-language command interpreter
#[derive(Clone)]
pub struct IntentParser {
    backend: Option<Arc<dyn LlmBackend>>,
    model_timeout: Duration,
}

impl std::fmt::Debug for IntentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentParser")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::rules_only()
    }
}

impl IntentParser {
    /// Parser running on keyword rules alone
    #[must_use]
    pub fn rules_only() -> Self {
        Self {
            backend: None,
            model_timeout: Duration::from_secs(30),
        }
    }

    /// Parser that asks `backend` first
    #[must_use]
    pub fn with_backend(backend: Arc<dyn LlmBackend>, model_timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            model_timeout,
        }
    }

    /// Human-readable mode, e.g. "OpenAI (gpt-4o-mini)" or "Fallback Mode"
    #[must_use]
    pub fn mode(&self) -> String {
        match &self.backend {
            Some(backend) => format!("{} ({})", backend.name(), backend.model()),
            None => "Fallback Mode (No API Key)".to_string(),
        }
    }

    /// Whether a model backend is configured
    #[must_use]
    pub fn is_model_backed(&self) -> bool {
        self.backend.is_some()
    }

    /// Parse `text` within a conversation
    ///
    /// Appends the user's message, then the assistant's interpretation, to
    /// the conversation.
    pub async fn parse(&self, text: &str, conversation: &ConversationHandle) -> Command {
        let context = conversation.transcript(CONTEXT_MESSAGES);
        conversation.append(ConversationMessage::user(text));

        let command = self.resolve(text, Some(context)).await;

        let reply = command
            .explanation
            .clone()
            .unwrap_or_else(|| format!("Understood: {}", command.kind()));
        conversation.append(
            ConversationMessage::assistant(reply)
                .with_metadata("action", serde_json::json!(command.kind().as_str())),
        );

        info!(
            conversation_id = %conversation.id(),
            action = ?command.kind(),
            needs_more_info = command.needs_more_info,
            "Parsed user input"
        );
        command
    }

    /// Parse `text` without touching any conversation
    pub async fn interpret(&self, text: &str) -> Command {
        self.resolve(text, None).await
    }

    async fn resolve(&self, text: &str, context: Option<String>) -> Command {
        if let Some(backend) = &self.backend {
            if !text.trim().is_empty() {
                if let Some(command) = self.ask_model(backend.as_ref(), text, context).await {
                    return command;
                }
            }
        }
        rules::classify(text)
    }

    async fn ask_model(
        &self,
        backend: &dyn LlmBackend,
        text: &str,
        context: Option<String>,
    ) -> Option<Command> {
        let mut request = LlmRequest::new(text, backend.model()).with_system(COMMAND_PROMPT);
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            request = request.with_context(context);
        }

        let response = match tokio::time::timeout(self.model_timeout, backend.send(&request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "Model request failed, using keyword rules");
                return None;
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout = ?self.model_timeout,
                    "Model request timed out, using keyword rules"
                );
                return None;
            }
        };

        match decode_model_reply(&response.content) {
            Ok(command) => {
                debug!(
                    backend = backend.name(),
                    action = ?command.kind(),
                    duration_ms = ?response.duration_ms,
                    "Model reply accepted"
                );
                Some(rules::finish(command))
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Model reply rejected, using keyword rules");
                None
            }
        }
    }
}

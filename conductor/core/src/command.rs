//! Command Model
//!
//! A single actionable request, resolved from free text or from a structured
//! tool call. Every surface (chat, RPC, chain execution) speaks this type.
//!
//! # Design Philosophy
//!
//! The action is a tagged union: each variant carries only the fields that
//! action needs. Validity is a pure function of the command's own fields and
//! never consults the session registry, so the same command validates the
//! same way no matter which surface produced it.
//!
//! # JSON Shape
//!
//! Commands serialize to a flat object shared with the external model prompt:
//!
//! ```text
//! {"action": "Connect", "host": "srv.example.com", "username": "admin",
//!  "port": 3389, "explanation": "...", "needsMoreInfo": false}
//! ```
//!
//! Decoding goes through [`CommandWire`] so an unknown action or a malformed
//! field is rejected at the boundary instead of producing a half-built command.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default RDP port
pub const DEFAULT_RDP_PORT: u16 = 3389;

// ============================================================================
// Action Kinds
// ============================================================================

/// Discriminant of a [`CommandAction`], used for logging and matching
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Open a new remote session
    Connect,
    /// Close one session
    Disconnect,
    /// Close every session
    DisconnectAll,
    /// Show the session registry
    ListSessions,
    /// Capture a screenshot
    Screenshot,
    /// Save a connection profile
    CreateProfile,
    /// Open a session from a saved profile
    LoadProfile,
    /// Several commands executed in order
    ChainedCommands,
    /// Free-form help or conversation
    GeneralHelp,
    /// Nothing recognizable
    Unknown,
}

impl ActionKind {
    /// All action kinds, in declaration order
    pub const ALL: [ActionKind; 10] = [
        Self::Connect,
        Self::Disconnect,
        Self::DisconnectAll,
        Self::ListSessions,
        Self::Screenshot,
        Self::CreateProfile,
        Self::LoadProfile,
        Self::ChainedCommands,
        Self::GeneralHelp,
        Self::Unknown,
    ];

    /// Wire name of the action
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::Disconnect => "Disconnect",
            Self::DisconnectAll => "DisconnectAll",
            Self::ListSessions => "ListSessions",
            Self::Screenshot => "Screenshot",
            Self::CreateProfile => "CreateProfile",
            Self::LoadProfile => "LoadProfile",
            Self::ChainedCommands => "ChainedCommands",
            Self::GeneralHelp => "GeneralHelp",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a wire name (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a screenshot should capture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotMode {
    /// The remote session's framebuffer
    #[default]
    Session,
    /// The client application window
    Application,
    /// The whole local screen
    Fullscreen,
}

impl ScreenshotMode {
    /// Wire name of the mode
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Application => "application",
            Self::Fullscreen => "fullscreen",
        }
    }

    /// Parse a mode name (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "session" => Some(Self::Session),
            "application" | "app" => Some(Self::Application),
            "fullscreen" | "full screen" | "full" => Some(Self::Fullscreen),
            _ => None,
        }
    }
}

impl fmt::Display for ScreenshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Command
// ============================================================================

/// Action-specific payload of a [`Command`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandAction {
    /// Open a new remote session
    Connect {
        /// Target host
        host: Option<String>,
        /// Login name
        username: Option<String>,
        /// Target port
        port: u16,
    },
    /// Close the referenced session
    Disconnect {
        /// Session reference (id, index, name or host)
        session: Option<String>,
    },
    /// Close every session
    DisconnectAll,
    /// Show the session registry
    ListSessions,
    /// Capture a screenshot
    Screenshot {
        /// Session reference
        session: Option<String>,
        /// Capture mode
        mode: ScreenshotMode,
    },
    /// Save a connection profile
    CreateProfile {
        /// Profile name
        name: Option<String>,
        /// Host stored in the profile
        host: Option<String>,
        /// Username stored in the profile
        username: Option<String>,
    },
    /// Open a session from a saved profile
    LoadProfile {
        /// Profile name
        name: Option<String>,
    },
    /// Ordered sub-commands
    Chained(Vec<Command>),
    /// Help or conversation
    GeneralHelp,
    /// Nothing recognizable
    Unknown,
}

/// A resolved, possibly incomplete, user request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CommandWire", try_from = "CommandWire")]
pub struct Command {
    /// The action and its fields
    pub action: CommandAction,
    /// Execution priority inside a chain (lower runs first)
    pub priority: u32,
    /// What the interpreter understood, or the reply for help requests
    pub explanation: Option<String>,
    /// Whether the caller should be asked for more details
    pub needs_more_info: bool,
    /// Questions to ask when details are missing
    pub follow_up_questions: Vec<String>,
}

impl Command {
    /// Wrap an action with default metadata
    #[must_use]
    pub fn new(action: CommandAction) -> Self {
        Self {
            action,
            priority: 0,
            explanation: None,
            needs_more_info: false,
            follow_up_questions: Vec::new(),
        }
    }

    /// Connect to a host on the default port
    pub fn connect(host: impl Into<String>, username: Option<String>) -> Self {
        Self::new(CommandAction::Connect {
            host: Some(host.into()),
            username,
            port: DEFAULT_RDP_PORT,
        })
    }

    /// Disconnect a session
    pub fn disconnect(session: impl Into<String>) -> Self {
        Self::new(CommandAction::Disconnect {
            session: Some(session.into()),
        })
    }

    /// Disconnect every session
    #[must_use]
    pub fn disconnect_all() -> Self {
        Self::new(CommandAction::DisconnectAll)
    }

    /// List sessions
    #[must_use]
    pub fn list_sessions() -> Self {
        Self::new(CommandAction::ListSessions)
    }

    /// Capture a screenshot of a session
    pub fn screenshot(session: impl Into<String>, mode: ScreenshotMode) -> Self {
        Self::new(CommandAction::Screenshot {
            session: Some(session.into()),
            mode,
        })
    }

    /// Save a profile under a name
    pub fn create_profile(name: impl Into<String>) -> Self {
        Self::new(CommandAction::CreateProfile {
            name: Some(name.into()),
            host: None,
            username: None,
        })
    }

    /// Load a profile by name
    pub fn load_profile(name: impl Into<String>) -> Self {
        Self::new(CommandAction::LoadProfile {
            name: Some(name.into()),
        })
    }

    /// Several commands in order
    #[must_use]
    pub fn chained(commands: Vec<Command>) -> Self {
        Self::new(CommandAction::Chained(commands))
    }

    /// Help reply
    pub fn general_help(reply: impl Into<String>) -> Self {
        Self::new(CommandAction::GeneralHelp).with_explanation(reply)
    }

    /// Unrecognized input
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(CommandAction::Unknown)
    }

    /// Set chain priority
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the explanation
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Mark as needing more information, attaching follow-up questions
    #[must_use]
    pub fn needing_more_info(mut self, questions: Vec<String>) -> Self {
        self.needs_more_info = true;
        self.follow_up_questions = questions;
        self
    }

    /// Action discriminant
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match &self.action {
            CommandAction::Connect { .. } => ActionKind::Connect,
            CommandAction::Disconnect { .. } => ActionKind::Disconnect,
            CommandAction::DisconnectAll => ActionKind::DisconnectAll,
            CommandAction::ListSessions => ActionKind::ListSessions,
            CommandAction::Screenshot { .. } => ActionKind::Screenshot,
            CommandAction::CreateProfile { .. } => ActionKind::CreateProfile,
            CommandAction::LoadProfile { .. } => ActionKind::LoadProfile,
            CommandAction::Chained(_) => ActionKind::ChainedCommands,
            CommandAction::GeneralHelp => ActionKind::GeneralHelp,
            CommandAction::Unknown => ActionKind::Unknown,
        }
    }

    /// Session reference carried by the command, if any
    #[must_use]
    pub fn session_ref(&self) -> Option<&str> {
        match &self.action {
            CommandAction::Disconnect { session } | CommandAction::Screenshot { session, .. } => {
                session.as_deref()
            }
            _ => None,
        }
    }

    /// Sub-commands of a chain (empty for other actions)
    #[must_use]
    pub fn sub_commands(&self) -> &[Command] {
        match &self.action {
            CommandAction::Chained(commands) => commands,
            _ => &[],
        }
    }

    /// Whether every field the action requires is present
    #[must_use]
    pub fn validate(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of required fields that are absent or blank
    ///
    /// Field names match the JSON shape. `Unknown` always reports `action`.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.action {
            CommandAction::Connect { host, .. } => {
                if !present(host) {
                    missing.push("host");
                }
            }
            CommandAction::Disconnect { session } | CommandAction::Screenshot { session, .. } => {
                if !present(session) {
                    missing.push("sessionId");
                }
            }
            CommandAction::CreateProfile { name, .. } | CommandAction::LoadProfile { name } => {
                if !present(name) {
                    missing.push("profileName");
                }
            }
            CommandAction::Chained(commands) => {
                if commands.is_empty() {
                    missing.push("chainedCommands");
                }
            }
            CommandAction::DisconnectAll
            | CommandAction::ListSessions
            | CommandAction::GeneralHelp => {}
            CommandAction::Unknown => missing.push("action"),
        }
        missing
    }
}

/// Question to ask the user for a missing field
#[must_use]
pub fn follow_up_question(field: &str) -> &'static str {
    match field {
        "host" => "What server would you like to connect to?",
        "username" => "What username should I use?",
        "sessionId" => "Which session? You can use its number, name, host or id.",
        "profileName" => "What is the name of the profile?",
        "chainedCommands" => "Which actions should I run, and in what order?",
        _ => "Could you tell me what you would like to do?",
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

// ============================================================================
// Wire Format
// ============================================================================

/// Errors decoding the JSON command shape
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandDecodeError {
    /// The action name is not one of the known kinds
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A field carried a value outside its domain
    #[error("Invalid value for {field}: {value}")]
    InvalidField {
        /// JSON field name
        field: &'static str,
        /// Offending value
        value: String,
    },
}

/// Flat JSON representation of a [`Command`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandWire {
    /// Action name
    pub action: String,
    /// Target host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Login name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Session reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Target port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Screenshot mode name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_mode: Option<String>,
    /// Sub-commands of a chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chained_commands: Option<Vec<Command>>,
    /// Profile name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    /// Explanation or reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Whether more details are needed
    #[serde(default)]
    pub needs_more_info: bool,
    /// Follow-up questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_questions: Option<Vec<String>>,
    /// Chain priority
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl From<Command> for CommandWire {
    fn from(command: Command) -> Self {
        let mut wire = CommandWire {
            action: command.kind().as_str().to_string(),
            explanation: command.explanation,
            needs_more_info: command.needs_more_info,
            follow_up_questions: if command.follow_up_questions.is_empty() {
                None
            } else {
                Some(command.follow_up_questions)
            },
            priority: command.priority,
            ..Default::default()
        };

        match command.action {
            CommandAction::Connect {
                host,
                username,
                port,
            } => {
                wire.host = host;
                wire.username = username;
                wire.port = Some(port);
            }
            CommandAction::Disconnect { session } => wire.session_id = session,
            CommandAction::Screenshot { session, mode } => {
                wire.session_id = session;
                wire.screenshot_mode = Some(mode.as_str().to_string());
            }
            CommandAction::CreateProfile {
                name,
                host,
                username,
            } => {
                wire.profile_name = name;
                wire.host = host;
                wire.username = username;
            }
            CommandAction::LoadProfile { name } => wire.profile_name = name,
            CommandAction::Chained(commands) => wire.chained_commands = Some(commands),
            CommandAction::DisconnectAll
            | CommandAction::ListSessions
            | CommandAction::GeneralHelp
            | CommandAction::Unknown => {}
        }

        wire
    }
}

impl TryFrom<CommandWire> for Command {
    type Error = CommandDecodeError;

    fn try_from(wire: CommandWire) -> Result<Self, Self::Error> {
        let kind = ActionKind::parse(&wire.action)
            .ok_or_else(|| CommandDecodeError::UnknownAction(wire.action.clone()))?;

        let action = match kind {
            ActionKind::Connect => CommandAction::Connect {
                host: wire.host,
                username: wire.username,
                port: wire.port.unwrap_or(DEFAULT_RDP_PORT),
            },
            ActionKind::Disconnect => CommandAction::Disconnect {
                session: wire.session_id,
            },
            ActionKind::DisconnectAll => CommandAction::DisconnectAll,
            ActionKind::ListSessions => CommandAction::ListSessions,
            ActionKind::Screenshot => {
                let mode = match wire.screenshot_mode.as_deref() {
                    None => ScreenshotMode::default(),
                    Some(name) => ScreenshotMode::parse(name).ok_or_else(|| {
                        CommandDecodeError::InvalidField {
                            field: "screenshotMode",
                            value: name.to_string(),
                        }
                    })?,
                };
                CommandAction::Screenshot {
                    session: wire.session_id,
                    mode,
                }
            }
            ActionKind::CreateProfile => CommandAction::CreateProfile {
                name: wire.profile_name,
                host: wire.host,
                username: wire.username,
            },
            ActionKind::LoadProfile => CommandAction::LoadProfile {
                name: wire.profile_name,
            },
            ActionKind::ChainedCommands => {
                CommandAction::Chained(wire.chained_commands.unwrap_or_default())
            }
            ActionKind::GeneralHelp => CommandAction::GeneralHelp,
            ActionKind::Unknown => CommandAction::Unknown,
        };

        Ok(Command {
            action,
            priority: wire.priority,
            explanation: wire.explanation,
            needs_more_info: wire.needs_more_info,
            follow_up_questions: wire.follow_up_questions.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connect_requires_host() {
        let cmd = Command::new(CommandAction::Connect {
            host: None,
            username: Some("admin".to_string()),
            port: DEFAULT_RDP_PORT,
        });
        assert!(!cmd.validate());
        assert_eq!(cmd.missing_fields(), vec!["host"]);

        let cmd = Command::connect("server.example.com", None);
        assert!(cmd.validate());
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        let cmd = Command::connect("   ", None);
        assert_eq!(cmd.missing_fields(), vec!["host"]);

        let cmd = Command::disconnect("");
        assert_eq!(cmd.missing_fields(), vec!["sessionId"]);
    }

    #[test]
    fn test_session_actions_require_reference() {
        let cmd = Command::new(CommandAction::Screenshot {
            session: None,
            mode: ScreenshotMode::Fullscreen,
        });
        assert_eq!(cmd.missing_fields(), vec!["sessionId"]);
        assert!(Command::screenshot("1", ScreenshotMode::Session).validate());
    }

    #[test]
    fn test_profile_actions_require_name() {
        let cmd = Command::new(CommandAction::LoadProfile { name: None });
        assert_eq!(cmd.missing_fields(), vec!["profileName"]);
        assert!(Command::create_profile("work").validate());
    }

    #[test]
    fn test_chain_requires_commands() {
        assert_eq!(
            Command::chained(Vec::new()).missing_fields(),
            vec!["chainedCommands"]
        );
        assert!(Command::chained(vec![Command::list_sessions()]).validate());
    }

    #[test]
    fn test_fieldless_actions_always_valid() {
        assert!(Command::disconnect_all().validate());
        assert!(Command::list_sessions().validate());
        assert!(Command::general_help("hi").validate());
    }

    #[test]
    fn test_unknown_never_valid() {
        let cmd = Command::unknown();
        assert!(!cmd.validate());
        assert_eq!(cmd.missing_fields(), vec!["action"]);
    }

    #[test]
    fn test_action_kind_parse_is_case_insensitive() {
        assert_eq!(ActionKind::parse("disconnectall"), Some(ActionKind::DisconnectAll));
        assert_eq!(ActionKind::parse(" Connect "), Some(ActionKind::Connect));
        assert_eq!(ActionKind::parse("explode"), None);
    }

    #[test]
    fn test_json_shape_uses_camel_case() {
        let cmd = Command::screenshot("2", ScreenshotMode::Fullscreen)
            .with_explanation("Capturing session 2");
        let json = serde_json::to_value(&cmd).unwrap();

        assert_eq!(json["action"], "Screenshot");
        assert_eq!(json["sessionId"], "2");
        assert_eq!(json["screenshotMode"], "fullscreen");
        assert_eq!(json["needsMoreInfo"], false);
        assert!(json.get("host").is_none());
    }

    #[test]
    fn test_decode_model_output_with_nulls() {
        let raw = r#"{"action": "Connect", "host": "server.example.com", "username": null,
                      "sessionId": null, "port": 3390, "needsMoreInfo": false,
                      "followUpQuestions": null}"#;
        let cmd: Command = serde_json::from_str(raw).unwrap();

        assert_eq!(
            cmd.action,
            CommandAction::Connect {
                host: Some("server.example.com".to_string()),
                username: None,
                port: 3390,
            }
        );
        assert!(cmd.follow_up_questions.is_empty());
    }

    #[test]
    fn test_decode_defaults_port() {
        let cmd: Command = serde_json::from_str(r#"{"action":"Connect","host":"a.b"}"#).unwrap();
        assert!(matches!(
            cmd.action,
            CommandAction::Connect { port: DEFAULT_RDP_PORT, .. }
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let result: Result<Command, _> = serde_json::from_str(r#"{"action":"Launch"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_bad_screenshot_mode() {
        let result: Result<Command, _> =
            serde_json::from_str(r#"{"action":"Screenshot","screenshotMode":"panorama"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_chained_round_trip_preserves_nesting() {
        let cmd = Command::chained(vec![
            Command::connect("a.example.com", Some("admin".to_string())).with_priority(1),
            Command::screenshot("last", ScreenshotMode::Session).with_priority(2),
        ])
        .with_explanation("two steps");

        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}

//! Command Dispatch
//!
//! Executes one [`Command`] against the session orchestrator and the profile
//! store. Every outcome, including validation failures and unknown session
//! references, comes back as a [`StepResult`] rather than an error, so chat
//! and chain callers can branch on `success` alone.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandAction, ScreenshotMode};
use crate::intent::reply_for;
use crate::orchestrator::{ConnectionRequest, SessionId, SessionOrchestrator};
use crate::profiles::{ProfileStore, SessionProfile};

/// Outcome of executing one command
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// The command that ran
    pub command: Command,
    /// Whether it succeeded
    pub success: bool,
    /// What happened, for display
    pub message: String,
    /// Session the step started or acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl StepResult {
    /// Successful outcome
    pub fn ok(command: Command, message: impl Into<String>) -> Self {
        Self {
            command,
            success: true,
            message: message.into(),
            session_id: None,
        }
    }

    /// Failed outcome
    pub fn failed(command: Command, message: impl Into<String>) -> Self {
        Self {
            command,
            success: false,
            message: message.into(),
            session_id: None,
        }
    }

    /// Attach the session the step acted on
    #[must_use]
    pub fn with_session(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }
}

/// Message for a command missing required fields
#[must_use]
pub fn missing_fields_message(command: &Command) -> String {
    format!(
        "Cannot run {}: missing required fields: {}",
        command.kind(),
        command.missing_fields().join(", ")
    )
}

/// Executes single commands
#[derive(Clone)]
pub struct CommandDispatcher {
    orchestrator: SessionOrchestrator,
    profiles: Arc<dyn ProfileStore>,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    /// Create a dispatcher
    pub fn new(orchestrator: SessionOrchestrator, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            orchestrator,
            profiles,
        }
    }

    /// The orchestrator commands run against
    #[must_use]
    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    /// The profile store
    #[must_use]
    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Execute one command
    ///
    /// Chains are not expanded here; they run through the chain executor.
    pub async fn execute(&self, command: &Command) -> StepResult {
        if !command.validate() {
            debug!(action = ?command.kind(), missing = ?command.missing_fields(), "Rejected incomplete command");
            return StepResult::failed(command.clone(), missing_fields_message(command));
        }

        let result = match &command.action {
            CommandAction::Connect {
                host,
                username,
                port,
            } => self.connect(command, host.as_deref(), username.as_deref(), *port),
            CommandAction::Disconnect { session } => {
                self.disconnect(command, session.as_deref().unwrap_or_default())
                    .await
            }
            CommandAction::DisconnectAll => self.disconnect_all(command).await,
            CommandAction::ListSessions => StepResult::ok(command.clone(), self.session_listing()),
            CommandAction::Screenshot { session, mode } => {
                self.screenshot(command, session.as_deref(), *mode).await
            }
            CommandAction::CreateProfile {
                name,
                host,
                username,
            } => {
                self.create_profile(
                    command,
                    name.as_deref().unwrap_or_default(),
                    host.as_deref(),
                    username.as_deref(),
                )
                .await
            }
            CommandAction::LoadProfile { name } => {
                self.load_profile(command, name.as_deref().unwrap_or_default())
                    .await
            }
            CommandAction::Chained(_) => StepResult::failed(
                command.clone(),
                "Chained commands must run through the chain executor",
            ),
            CommandAction::GeneralHelp => {
                let reply = command.explanation.clone().unwrap_or_else(|| reply_for(""));
                StepResult::ok(command.clone(), reply)
            }
            CommandAction::Unknown => {
                StepResult::failed(command.clone(), "I couldn't understand that request")
            }
        };

        info!(action = ?command.kind(), success = result.success, "Command executed");
        result
    }

    fn connect(
        &self,
        command: &Command,
        host: Option<&str>,
        username: Option<&str>,
        port: u16,
    ) -> StepResult {
        let host = host.unwrap_or_default().trim();
        let mut request = ConnectionRequest::new(host).with_port(port);
        if let Some(username) = username {
            request = request.with_username(username);
        }

        match self.orchestrator.start_session(request) {
            Ok(id) => StepResult::ok(
                command.clone(),
                format!("Connecting to {host}:{port} (session {id})"),
            )
            .with_session(id),
            Err(e) => StepResult::failed(command.clone(), e.to_string()),
        }
    }

    async fn disconnect(&self, command: &Command, reference: &str) -> StepResult {
        let Some(id) = self.orchestrator.resolve(reference) else {
            return StepResult::failed(command.clone(), format!("No session matches '{reference}'"));
        };
        let name = self
            .orchestrator
            .get_session(id)
            .map(|r| r.display_name())
            .unwrap_or_else(|| id.to_string());

        if self.orchestrator.end_session(id).await {
            StepResult::ok(command.clone(), format!("Disconnected {name}")).with_session(id)
        } else {
            StepResult::failed(command.clone(), format!("Session {name} is already closing"))
                .with_session(id)
        }
    }

    async fn disconnect_all(&self, command: &Command) -> StepResult {
        let count = self.orchestrator.session_count();
        if count == 0 {
            return StepResult::ok(command.clone(), "No active sessions to disconnect");
        }
        if self.orchestrator.disconnect_all().await {
            StepResult::ok(command.clone(), format!("Disconnected {count} session(s)"))
        } else {
            StepResult::failed(command.clone(), "Some sessions could not be disconnected")
        }
    }

    /// Numbered session list for chat display
    #[must_use]
    pub fn session_listing(&self) -> String {
        let sessions = self.orchestrator.list_sessions();
        if sessions.is_empty() {
            return "No active sessions".to_string();
        }
        let mut out = format!("Active sessions ({}):", sessions.len());
        for (i, record) in sessions.iter().enumerate() {
            let _ = write!(out, "\n{}. {}", i + 1, record.summary());
        }
        out
    }

    /// Every mode needs a reference to a known session, as over RPC
    async fn screenshot(
        &self,
        command: &Command,
        reference: Option<&str>,
        mode: ScreenshotMode,
    ) -> StepResult {
        let reference = reference.unwrap_or_default();
        let Some(id) = self.orchestrator.resolve(reference) else {
            return StepResult::failed(command.clone(), format!("No session matches '{reference}'"));
        };

        match self.orchestrator.capture_screenshot(Some(id), mode).await {
            Ok(path) => StepResult::ok(
                command.clone(),
                format!("Screenshot saved to {}", path.display()),
            )
            .with_session(id),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Screenshot failed");
                StepResult::failed(command.clone(), format!("Screenshot failed: {e}"))
                    .with_session(id)
            }
        }
    }

    async fn create_profile(
        &self,
        command: &Command,
        name: &str,
        host: Option<&str>,
        username: Option<&str>,
    ) -> StepResult {
        let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) else {
            return StepResult::failed(
                command.clone(),
                format!("A host is required to save profile '{name}'"),
            );
        };

        let mut profile = SessionProfile::new(name.trim(), host).created_by("assistant");
        if let Some(username) = username {
            profile = profile.with_username(username);
        }
        match self.profiles.save(&profile).await {
            Ok(()) => StepResult::ok(
                command.clone(),
                format!("Saved profile '{}' for {host}", profile.name),
            ),
            Err(e) => StepResult::failed(command.clone(), e.to_string()),
        }
    }

    async fn load_profile(&self, command: &Command, name: &str) -> StepResult {
        let profile = match self.profiles.load(name).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return StepResult::failed(command.clone(), format!("Profile '{name}' not found"))
            }
            Err(e) => return StepResult::failed(command.clone(), e.to_string()),
        };

        match self.orchestrator.start_session(profile.to_request()) {
            Ok(id) => {
                if let Err(e) = self.profiles.record_usage(&profile.name).await {
                    warn!(profile = %profile.name, error = %e, "Failed to record profile usage");
                }
                StepResult::ok(
                    command.clone(),
                    format!(
                        "Loaded profile '{}': connecting to {} (session {id})",
                        profile.name, profile.host
                    ),
                )
                .with_session(id)
            }
            Err(e) => StepResult::failed(command.clone(), e.to_string()),
        }
    }
}

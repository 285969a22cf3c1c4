//! Session records and lifecycle status
//!
//! A session is a tracked remote-connection lifecycle, independent of the
//! transport that eventually carries it.
//!
//! ```text
//!  Disconnected ──start──▶ Connecting ──ok──▶ Connected ──end──▶ Disconnecting ──▶ (removed)
//!        ▲                     │  ▲               │
//!        │                     │  └─Reconnecting◀─┘ reconnect
//!        └──reconnect── Failed ◀┘ error / timeout (from any non-terminal state)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::performance::PerformancePreset;
use crate::command::DEFAULT_RDP_PORT;

/// Unique identifier for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle status of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Not connected
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected and usable
    Connected,
    /// Manual reconnect requested
    Reconnecting,
    /// Teardown in progress
    Disconnecting,
    /// Last attempt failed
    Failed,
}

impl SessionStatus {
    /// Whether the session is at rest (no attempt or teardown pending)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Whether a reconnect may start from this status
    #[must_use]
    pub fn can_reconnect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Connected)
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Disconnecting => "Disconnecting",
            Self::Failed => "Failed",
        }
    }

    /// Status icon (for chat display)
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Disconnected => "\u{26aa}",  // white circle
            Self::Connecting => "\u{1f7e1}",   // yellow circle
            Self::Connected => "\u{1f7e2}",    // green circle
            Self::Reconnecting => "\u{1f504}", // counterclockwise arrows
            Self::Disconnecting => "\u{1f7e0}", // orange circle
            Self::Failed => "\u{1f534}",       // red circle
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Screen and quality settings of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits per pixel
    pub color_depth: u8,
    /// Whether to run full screen
    pub full_screen: bool,
    /// Performance preset
    pub preset: PerformancePreset,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            color_depth: 32,
            full_screen: false,
            preset: PerformancePreset::Balanced,
        }
    }
}

/// Valid color depths
pub const COLOR_DEPTHS: [u8; 5] = [8, 15, 16, 24, 32];

/// Parameters for starting a session
#[derive(Clone, Default)]
pub struct ConnectionRequest {
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Login name
    pub username: Option<String>,
    /// Password (never logged or serialized)
    pub password: Option<String>,
    /// Friendly session name
    pub session_name: Option<String>,
    /// Screen settings
    pub display: DisplaySettings,
}

impl ConnectionRequest {
    /// Create a request for `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_RDP_PORT,
            ..Default::default()
        }
    }

    /// Set username
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set session name
    #[must_use]
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Set display settings
    #[must_use]
    pub fn with_display(mut self, display: DisplaySettings) -> Self {
        self.display = display;
        self
    }
}

impl fmt::Debug for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("session_name", &self.session_name)
            .field("display", &self.display)
            .finish()
    }
}

/// Snapshot of a tracked session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identifier
    pub id: SessionId,
    /// Friendly name
    pub name: Option<String>,
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Login name
    pub username: Option<String>,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,
    /// Last status change or use
    pub last_activity: DateTime<Utc>,
    /// Error from the last failed attempt
    pub error_message: Option<String>,
    /// Screen settings
    pub display: DisplaySettings,
}

impl SessionRecord {
    pub(crate) fn from_request(id: SessionId, request: &ConnectionRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: request.session_name.clone(),
            host: request.host.trim().to_string(),
            port: request.port,
            username: request.username.clone(),
            status: SessionStatus::Disconnected,
            created_at: now,
            connected_at: None,
            last_activity: now,
            error_message: None,
            display: request.display.clone(),
        }
    }

    /// Name for display: session name, else host, else "New Session"
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.name.as_deref(), self.host.as_str()) {
            (Some(name), _) if !name.trim().is_empty() => name.to_string(),
            (_, host) if !host.is_empty() => host.to_string(),
            _ => "New Session".to_string(),
        }
    }

    /// Icon and label, e.g. "🟢 Connected"
    #[must_use]
    pub fn status_display(&self) -> String {
        format!("{} {}", self.status.icon(), self.status.label())
    }

    /// One-line summary for chat and tool output
    #[must_use]
    pub fn summary(&self) -> String {
        let user = self
            .username
            .as_deref()
            .map(|u| format!("{u}@"))
            .unwrap_or_default();
        format!(
            "{} ({user}{}:{}) {}",
            self.display_name(),
            self.host,
            self.port,
            self.status_display()
        )
    }
}

/// Notification raised on every status update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Affected session
    pub session_id: SessionId,
    /// Status before the update
    pub old_status: SessionStatus,
    /// Status after the update
    pub new_status: SessionStatus,
    /// Error attached to the update
    pub error_message: Option<String>,
    /// When the update happened
    pub timestamp: DateTime<Utc>,
}

/// Reasons a session cannot be started or used
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The request had no host
    #[error("Host is required to start a session")]
    EmptyHost,

    /// Too many sessions are open
    #[error("Session limit reached ({max} sessions)")]
    LimitReached {
        /// Configured maximum
        max: usize,
    },

    /// No session matches the reference
    #[error("No session matches '{0}'")]
    UnknownSession(String),

    /// A session capture was requested without naming a session
    #[error("A session is required for session screenshots")]
    SessionRequired,

    /// The session cannot serve the request in its current status
    #[error("Session {id} is {status}")]
    Unavailable {
        /// Session identifier
        id: SessionId,
        /// Current status
        status: SessionStatus,
    },
}

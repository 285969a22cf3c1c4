//! Session Orchestrator
//!
//! Owns the authoritative session registry. Every connect, disconnect, list
//! and capture request from the chat surface or the RPC gateway lands here.
//!
//! # Architecture
//!
//! ```text
//!                         SessionOrchestrator (Clone, Arc inside)
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │  DashMap<SessionId, SessionEntry>      broadcast<StatusChange>    │
//!   │     record + request + cancel token        │                      │
//!   │                                            ▼                      │
//!   │  start_session ──spawn──▶ connect task ── update ──▶ subscribers  │
//!   │                           (timeout, cancel)                       │
//!   └───────────────┬─────────────────────────────────┬─────────────────┘
//!                   │                                 │
//!              dyn Connector                   dyn ScreenCapture
//! ```
//!
//! # Concurrency
//!
//! The registry is only reachable through methods; no caller holds a lock
//! across calls. Status updates mutate the entry and publish the change while
//! holding that entry's shard lock, so subscribers see each session's changes
//! in the order they were applied.
//!
//! Each connect attempt is numbered. A finishing attempt only applies its
//! result if it is still the current attempt and the session is still
//! `Connecting`, so a late completion can never overwrite a teardown or a
//! newer attempt.

mod capture;
mod connector;
mod monitor;
mod performance;
mod session;

pub use capture::{ScreenCapture, SimulatedCapture};
pub use connector::{Connector, SimulatedConnector};
pub use monitor::{PerformanceMonitor, SessionMetrics};
pub use performance::{AudioQuality, PerformanceOptions, PerformancePreset};
pub use session::{
    ConnectionRequest, DisplaySettings, SessionError, SessionId, SessionRecord, SessionStatus,
    StatusChange, COLOR_DEPTHS,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::ScreenshotMode;

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Maximum number of tracked sessions
    pub max_sessions: usize,
    /// Status event channel capacity
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_sessions: 5,
            event_capacity: 256,
        }
    }
}

struct SessionEntry {
    record: SessionRecord,
    request: ConnectionRequest,
    cancel: CancellationToken,
    attempt: u64,
}

struct Inner {
    sessions: DashMap<SessionId, SessionEntry>,
    start_gate: Mutex<()>,
    connector: Arc<dyn Connector>,
    capture: Arc<dyn ScreenCapture>,
    events: broadcast::Sender<StatusChange>,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

/// Process-wide session registry and lifecycle driver
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("sessions", &self.inner.sessions.len())
            .field("connector", &self.inner.connector.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

enum AttemptOutcome {
    Connected,
    Failed(String),
    Cancelled,
}

impl SessionOrchestrator {
    /// Create an orchestrator with explicit collaborators
    pub fn new(
        connector: Arc<dyn Connector>,
        capture: Arc<dyn ScreenCapture>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                start_gate: Mutex::new(()),
                connector,
                capture,
                events,
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Create an orchestrator backed by the simulated collaborators
    #[must_use]
    pub fn simulated(connect_delay: Duration, config: OrchestratorConfig) -> Self {
        Self::new(
            Arc::new(SimulatedConnector::new(connect_delay)),
            Arc::new(SimulatedCapture::default()),
            config,
        )
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Subscribe to status-change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a session and start connecting in the background
    ///
    /// The session is `Connecting` when this returns; the attempt ends in
    /// `Connected` or `Failed`. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Rejects an empty host and requests beyond the session limit. Nothing is
    /// registered on error.
    pub fn start_session(&self, request: ConnectionRequest) -> Result<SessionId, SessionError> {
        if request.host.trim().is_empty() {
            warn!("Rejected session start without host");
            return Err(SessionError::EmptyHost);
        }

        let id = SessionId::new();
        let cancel = self.inner.shutdown.child_token();
        {
            let _gate = self.inner.start_gate.lock();
            let max = self.inner.config.max_sessions;
            if max > 0 && self.inner.sessions.len() >= max {
                warn!(max, host = %request.host, "Session limit reached");
                return Err(SessionError::LimitReached { max });
            }
            self.inner.sessions.insert(
                id,
                SessionEntry {
                    record: SessionRecord::from_request(id, &request),
                    request: request.clone(),
                    cancel: cancel.clone(),
                    attempt: 1,
                },
            );
        }

        info!(
            session_id = %id,
            host = %request.host,
            port = request.port,
            connector = self.inner.connector.name(),
            "Starting session"
        );
        self.update_status(id, SessionStatus::Connecting, None);
        self.spawn_attempt(id, 1, request, cancel);
        Ok(id)
    }

    /// Tear down a session and remove it from the registry
    ///
    /// Returns false for an unknown id or a session already being torn down.
    pub async fn end_session(&self, id: SessionId) -> bool {
        let cancel = {
            let Some(mut entry) = self.inner.sessions.get_mut(&id) else {
                debug!(session_id = %id, "End requested for unknown session");
                return false;
            };
            if entry.record.status == SessionStatus::Disconnecting {
                return false;
            }
            self.apply(&mut entry, SessionStatus::Disconnecting, None);
            entry.cancel.clone()
        };
        cancel.cancel();

        if let Err(e) = self.inner.connector.disconnect(id).await {
            warn!(session_id = %id, error = %e, "Connector disconnect failed");
        }

        match self.inner.sessions.remove(&id) {
            Some((_, mut entry)) => {
                self.apply(&mut entry, SessionStatus::Disconnected, None);
                info!(session_id = %id, host = %entry.record.host, "Session ended");
                true
            }
            None => false,
        }
    }

    /// Retry the connection of an existing session
    ///
    /// Connected sessions pass through `Reconnecting`. Returns false for an
    /// unknown id or a session with an attempt or teardown in flight.
    pub fn reconnect_session(&self, id: SessionId) -> bool {
        let (attempt, request, cancel) = {
            let Some(mut entry) = self.inner.sessions.get_mut(&id) else {
                return false;
            };
            if !entry.record.status.can_reconnect() {
                debug!(session_id = %id, status = %entry.record.status, "Reconnect refused");
                return false;
            }
            if entry.record.status == SessionStatus::Connected {
                self.apply(&mut entry, SessionStatus::Reconnecting, None);
            }
            entry.cancel.cancel();
            entry.cancel = self.inner.shutdown.child_token();
            entry.attempt += 1;
            self.apply(&mut entry, SessionStatus::Connecting, None);
            (entry.attempt, entry.request.clone(), entry.cancel.clone())
        };

        info!(session_id = %id, attempt, "Reconnecting session");
        self.spawn_attempt(id, attempt, request, cancel);
        true
    }

    /// End every session
    ///
    /// Returns the logical AND of the individual results (true when empty).
    pub async fn disconnect_all(&self) -> bool {
        let ids: Vec<SessionId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        let results = futures::future::join_all(ids.iter().map(|id| self.end_session(*id))).await;
        info!(count = ids.len(), "Disconnected all sessions");
        results.into_iter().all(|ok| ok)
    }

    /// Set a session's status, publishing a change notification
    ///
    /// No-op for an unknown id. Reaching `Connected` stamps `connected_at`.
    pub fn update_status(&self, id: SessionId, status: SessionStatus, error: Option<String>) {
        if let Some(mut entry) = self.inner.sessions.get_mut(&id) {
            self.apply(&mut entry, status, error);
        }
    }

    /// Cancel pending attempts and stop accepting their results
    pub fn shutdown(&self) {
        info!("Cancelling in-flight connection attempts");
        self.inner.shutdown.cancel();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of one session
    #[must_use]
    pub fn get_session(&self, id: SessionId) -> Option<SessionRecord> {
        self.inner.sessions.get(&id).map(|e| e.record.clone())
    }

    /// Snapshots of all sessions in creation order
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self
            .inner
            .sessions
            .iter()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Number of tracked sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Resolve a user-facing session reference
    ///
    /// Tried in order: exact id, `last`/`latest`, 1-based index in creation
    /// order, then a case-insensitive name or host match.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<SessionId> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if let Ok(id) = reference.parse::<SessionId>() {
            if self.inner.sessions.contains_key(&id) {
                return Some(id);
            }
        }

        let records = self.list_sessions();
        let lowered = reference.to_lowercase();
        if lowered == "last" || lowered == "latest" {
            return records.last().map(|r| r.id);
        }
        if let Ok(index) = reference.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| records.get(i))
                .map(|r| r.id);
        }
        records
            .iter()
            .find(|r| {
                r.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(reference))
            })
            .or_else(|| records.iter().find(|r| r.host.eq_ignore_ascii_case(reference)))
            .map(|r| r.id)
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Change a session's display settings
    ///
    /// Returns false for an unknown id.
    pub fn configure(&self, id: SessionId, settings: DisplaySettings) -> bool {
        let Some(mut entry) = self.inner.sessions.get_mut(&id) else {
            return false;
        };
        let preset = settings.preset;
        debug!(
            session_id = %id,
            %preset,
            width = settings.width,
            height = settings.height,
            "Configuring session"
        );
        entry.request.display = settings.clone();
        entry.record.display = settings;
        entry.record.last_activity = Utc::now();
        true
    }

    /// Capture a screenshot
    ///
    /// Session captures need a session that has not failed or started
    /// teardown; application and fullscreen captures ignore `id`.
    ///
    /// # Errors
    ///
    /// Fails with a [`SessionError`] for a missing, unknown or unusable
    /// session, and with the collaborator's error when the capture fails.
    pub async fn capture_screenshot(
        &self,
        id: Option<SessionId>,
        mode: ScreenshotMode,
    ) -> anyhow::Result<PathBuf> {
        let record = match (mode, id) {
            (ScreenshotMode::Session, None) => return Err(SessionError::SessionRequired.into()),
            (ScreenshotMode::Session, Some(id)) => {
                let record = self
                    .get_session(id)
                    .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
                if matches!(
                    record.status,
                    SessionStatus::Failed | SessionStatus::Disconnecting
                ) {
                    return Err(SessionError::Unavailable {
                        id,
                        status: record.status,
                    }
                    .into());
                }
                Some(record)
            }
            _ => None,
        };

        let path = self.inner.capture.capture(record.as_ref(), mode).await?;
        if let Some(id) = id {
            if let Some(mut entry) = self.inner.sessions.get_mut(&id) {
                entry.record.last_activity = Utc::now();
            }
        }
        info!(mode = %mode, path = %path.display(), "Screenshot captured");
        Ok(path)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn apply(&self, entry: &mut SessionEntry, status: SessionStatus, error: Option<String>) {
        let now = Utc::now();
        let old_status = entry.record.status;
        entry.record.status = status;
        entry.record.error_message.clone_from(&error);
        entry.record.last_activity = now;
        if status == SessionStatus::Connected {
            entry.record.connected_at = Some(now);
        }

        debug!(
            session_id = %entry.record.id,
            from = %old_status,
            to = %status,
            "Session status changed"
        );
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.events.send(StatusChange {
            session_id: entry.record.id,
            old_status,
            new_status: status,
            error_message: error,
            timestamp: now,
        });
    }

    fn finish_attempt(&self, id: SessionId, attempt: u64, outcome: AttemptOutcome) {
        let Some(mut entry) = self.inner.sessions.get_mut(&id) else {
            return;
        };
        if entry.attempt != attempt || entry.record.status != SessionStatus::Connecting {
            debug!(session_id = %id, attempt, "Discarding stale connect result");
            return;
        }
        match outcome {
            AttemptOutcome::Connected => {
                info!(session_id = %id, "Session connected");
                self.apply(&mut entry, SessionStatus::Connected, None);
            }
            AttemptOutcome::Failed(message) => {
                warn!(session_id = %id, error = %message, "Session failed");
                self.apply(&mut entry, SessionStatus::Failed, Some(message));
            }
            AttemptOutcome::Cancelled => {
                info!(session_id = %id, "Connect attempt cancelled");
                self.apply(&mut entry, SessionStatus::Disconnected, None);
            }
        }
    }

    fn spawn_attempt(
        &self,
        id: SessionId,
        attempt: u64,
        request: ConnectionRequest,
        cancel: CancellationToken,
    ) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let connector = Arc::clone(&orchestrator.inner.connector);
            let timeout = orchestrator.inner.config.connect_timeout;

            let outcome = tokio::select! {
                () = cancel.cancelled() => AttemptOutcome::Cancelled,
                result = tokio::time::timeout(timeout, connector.connect(id, &request)) => {
                    match result {
                        Ok(Ok(())) => AttemptOutcome::Connected,
                        Ok(Err(e)) => AttemptOutcome::Failed(e.to_string()),
                        Err(_) => AttemptOutcome::Failed(format!(
                            "Connection timed out after {}s",
                            timeout.as_secs_f32()
                        )),
                    }
                }
            };

            orchestrator.finish_attempt(id, attempt, outcome);
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

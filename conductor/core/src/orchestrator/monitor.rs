//! Performance monitoring
//!
//! Follows the orchestrator's status events. A session is registered when it
//! starts connecting and dropped once it comes to rest in `Disconnected` or
//! `Failed`. While registered, every status change is counted against it.
//!
//! ```text
//!   SessionOrchestrator ──broadcast<StatusChange>──▶ PerformanceMonitor::observe
//!                                                        │
//!        Connecting ─▶ register / count attempt          │
//!        Connected  ─▶ stamp connect latency             ▼
//!        Disconnected | Failed ─▶ unregister      DashMap<SessionId, SessionMetrics>
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{SessionId, SessionStatus, StatusChange};
use super::SessionOrchestrator;

/// Counters kept for one monitored session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Monitored session
    pub session_id: SessionId,
    /// Latest status seen
    pub status: SessionStatus,
    /// When monitoring started
    pub registered_at: DateTime<Utc>,
    /// Start of the latest connect attempt
    pub attempt_started_at: DateTime<Utc>,
    /// Time the latest successful attempt took
    pub connect_latency_ms: Option<i64>,
    /// Connect attempts seen, including reconnects
    pub connect_attempts: u32,
    /// Status changes seen
    pub status_changes: u32,
    /// Time of the latest status change
    pub last_change: DateTime<Utc>,
}

impl SessionMetrics {
    fn register(change: &StatusChange) -> Self {
        Self {
            session_id: change.session_id,
            status: change.new_status,
            registered_at: change.timestamp,
            attempt_started_at: change.timestamp,
            connect_latency_ms: None,
            connect_attempts: 0,
            status_changes: 0,
            last_change: change.timestamp,
        }
    }

    /// Seconds since monitoring started
    #[must_use]
    pub fn monitored_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.registered_at).num_seconds().max(0)
    }
}

/// Status-event consumer holding per-session metrics
#[derive(Clone, Debug, Default)]
pub struct PerformanceMonitor {
    sessions: Arc<DashMap<SessionId, SessionMetrics>>,
}

impl PerformanceMonitor {
    /// Create a monitor with nothing registered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow `orchestrator`'s status events in a background task
    ///
    /// The task ends when the orchestrator is dropped, or when the handle is
    /// aborted.
    pub fn spawn(&self, orchestrator: &SessionOrchestrator) -> JoinHandle<()> {
        let mut events = orchestrator.subscribe();
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => monitor.observe(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Performance monitor missed status changes");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Performance monitor stopped");
        })
    }

    /// Apply one status change
    pub fn observe(&self, change: &StatusChange) {
        let id = change.session_id;
        match change.new_status {
            SessionStatus::Connecting => {
                let mut metrics = self.sessions.entry(id).or_insert_with(|| {
                    info!(session_id = %id, "Monitoring session");
                    SessionMetrics::register(change)
                });
                metrics.connect_attempts += 1;
                metrics.attempt_started_at = change.timestamp;
                metrics.connect_latency_ms = None;
                Self::count(&mut metrics, change);
            }
            SessionStatus::Disconnected | SessionStatus::Failed => {
                if let Some((_, metrics)) = self.sessions.remove(&id) {
                    info!(
                        session_id = %id,
                        status = %change.new_status,
                        attempts = metrics.connect_attempts,
                        "Stopped monitoring session"
                    );
                }
            }
            SessionStatus::Connected => {
                if let Some(mut metrics) = self.sessions.get_mut(&id) {
                    let latency = (change.timestamp - metrics.attempt_started_at)
                        .num_milliseconds()
                        .max(0);
                    metrics.connect_latency_ms = Some(latency);
                    debug!(session_id = %id, latency_ms = latency, "Session connect measured");
                    Self::count(&mut metrics, change);
                }
            }
            SessionStatus::Reconnecting | SessionStatus::Disconnecting => {
                if let Some(mut metrics) = self.sessions.get_mut(&id) {
                    Self::count(&mut metrics, change);
                }
            }
        }
    }

    fn count(metrics: &mut SessionMetrics, change: &StatusChange) {
        metrics.status = change.new_status;
        metrics.status_changes += 1;
        metrics.last_change = change.timestamp;
    }

    /// Metrics of one session, if it is being monitored
    #[must_use]
    pub fn metrics(&self, id: SessionId) -> Option<SessionMetrics> {
        self.sessions.get(&id).map(|m| m.clone())
    }

    /// Whether `id` is being monitored
    #[must_use]
    pub fn is_monitoring(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of monitored sessions
    #[must_use]
    pub fn monitored_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::orchestrator::{
        ConnectionRequest, OrchestratorConfig, SimulatedCapture, SimulatedConnector,
    };

    fn change(id: SessionId, old: SessionStatus, new: SessionStatus) -> StatusChange {
        StatusChange {
            session_id: id,
            old_status: old,
            new_status: new,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    async fn wait_until(check: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[test]
    fn test_observe_registers_and_unregisters() {
        let monitor = PerformanceMonitor::new();
        let id = SessionId::new();

        monitor.observe(&change(id, SessionStatus::Disconnected, SessionStatus::Connecting));
        assert!(monitor.is_monitoring(id));

        monitor.observe(&change(id, SessionStatus::Connecting, SessionStatus::Connected));
        let metrics = monitor.metrics(id).unwrap();
        assert_eq!(metrics.status, SessionStatus::Connected);
        assert_eq!(metrics.connect_attempts, 1);
        assert_eq!(metrics.status_changes, 2);
        assert!(metrics.connect_latency_ms.is_some());

        monitor.observe(&change(id, SessionStatus::Connected, SessionStatus::Disconnecting));
        assert!(monitor.is_monitoring(id));
        monitor.observe(&change(id, SessionStatus::Disconnecting, SessionStatus::Disconnected));
        assert!(!monitor.is_monitoring(id));
        assert_eq!(monitor.monitored_count(), 0);
    }

    #[test]
    fn test_failed_session_is_dropped_and_reregistered_on_retry() {
        let monitor = PerformanceMonitor::new();
        let id = SessionId::new();

        monitor.observe(&change(id, SessionStatus::Disconnected, SessionStatus::Connecting));
        monitor.observe(&change(id, SessionStatus::Connecting, SessionStatus::Failed));
        assert!(!monitor.is_monitoring(id));

        monitor.observe(&change(id, SessionStatus::Failed, SessionStatus::Connecting));
        assert_eq!(monitor.metrics(id).unwrap().connect_attempts, 1);
    }

    #[test]
    fn test_changes_for_unmonitored_sessions_are_ignored() {
        let monitor = PerformanceMonitor::new();
        let id = SessionId::new();
        monitor.observe(&change(id, SessionStatus::Connecting, SessionStatus::Connected));
        monitor.observe(&change(id, SessionStatus::Connected, SessionStatus::Disconnecting));
        assert_eq!(monitor.monitored_count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_monitor_follows_orchestrator() {
        let orchestrator = SessionOrchestrator::new(
            Arc::new(
                SimulatedConnector::new(Duration::from_millis(10))
                    .with_unreachable_host("down.example.com"),
            ),
            Arc::new(SimulatedCapture::new("/tmp/rdp-conductor-tests")),
            OrchestratorConfig::default(),
        );
        let monitor = PerformanceMonitor::new();
        let task = monitor.spawn(&orchestrator);

        let up = orchestrator
            .start_session(ConnectionRequest::new("up.example.com"))
            .unwrap();
        let down = orchestrator
            .start_session(ConnectionRequest::new("down.example.com"))
            .unwrap();

        assert!(
            wait_until(|| monitor
                .metrics(up)
                .is_some_and(|m| m.status == SessionStatus::Connected))
            .await
        );
        assert!(
            wait_until(|| orchestrator
                .get_session(down)
                .is_some_and(|r| r.status == SessionStatus::Failed))
            .await
        );

        assert!(orchestrator.end_session(up).await);
        assert!(wait_until(|| !monitor.is_monitoring(up)).await);
        assert!(!monitor.is_monitoring(down));
        assert_eq!(monitor.monitored_count(), 0);

        task.abort();
    }
}

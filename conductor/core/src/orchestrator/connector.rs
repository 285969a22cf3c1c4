//! Connection collaborators
//!
//! The orchestrator never speaks a remote-desktop wire protocol itself. It
//! drives a [`Connector`], which is the seam where a real RDP client plugs in.
//! [`SimulatedConnector`] stands in when no real transport is linked.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use super::session::{ConnectionRequest, SessionId};

/// Opens and closes remote connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector name (for logs)
    fn name(&self) -> &str;

    /// Establish the connection for a session
    ///
    /// May take a long time; the orchestrator bounds it with a timeout and
    /// drops the future on cancellation.
    async fn connect(&self, session_id: SessionId, request: &ConnectionRequest)
        -> anyhow::Result<()>;

    /// Tear down the connection for a session
    async fn disconnect(&self, session_id: SessionId) -> anyhow::Result<()>;
}

/// Connector that waits a fixed delay and succeeds
///
/// Hosts registered with [`SimulatedConnector::with_unreachable_host`] fail
/// after the delay instead.
#[derive(Clone, Debug)]
pub struct SimulatedConnector {
    delay: Duration,
    unreachable: HashSet<String>,
}

impl SimulatedConnector {
    /// Create a connector with the given connect delay
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            unreachable: HashSet::new(),
        }
    }

    /// Make connections to `host` fail
    #[must_use]
    pub fn with_unreachable_host(mut self, host: impl Into<String>) -> Self {
        self.unreachable.insert(host.into().to_lowercase());
        self
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(
        &self,
        session_id: SessionId,
        request: &ConnectionRequest,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            session_id = %session_id,
            host = %request.host,
            port = request.port,
            "Simulating connection"
        );
        tokio::time::sleep(self.delay).await;

        if self.unreachable.contains(&request.host.to_lowercase()) {
            anyhow::bail!("Host {} is unreachable", request.host);
        }
        Ok(())
    }

    async fn disconnect(&self, session_id: SessionId) -> anyhow::Result<()> {
        tracing::debug!(session_id = %session_id, "Simulating disconnect");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_connector_succeeds() {
        let connector = SimulatedConnector::new(Duration::from_millis(1));
        let request = ConnectionRequest::new("ok.example.com");
        assert!(connector.connect(SessionId::new(), &request).await.is_ok());
        assert!(connector.disconnect(SessionId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_simulated_connector_unreachable_host() {
        let connector = SimulatedConnector::new(Duration::from_millis(1))
            .with_unreachable_host("Down.Example.com");
        let request = ConnectionRequest::new("down.example.com");

        let err = connector
            .connect(SessionId::new(), &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}

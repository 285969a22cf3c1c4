//! Read-only resources
//!
//! `rdp://sessions` and `rdp://profiles` expose JSON snapshots of the session
//! registry and the profile store.

use std::sync::Arc;

use serde::Serialize;

use crate::orchestrator::SessionOrchestrator;
use crate::profiles::ProfileStore;

/// Session list resource
pub const SESSIONS_URI: &str = "rdp://sessions";
/// Profile list resource
pub const PROFILES_URI: &str = "rdp://profiles";

const JSON_MIME: &str = "application/json";

/// Published description of a resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource address
    pub uri: String,
    /// Short name
    pub name: String,
    /// What it contains
    pub description: String,
    /// Content type
    pub mime_type: String,
}

/// Content of a read resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    /// Resource address
    pub uri: String,
    /// Content type
    pub mime_type: String,
    /// Serialized content
    pub text: String,
}

/// Resources backed by the orchestrator and the profile store
#[derive(Clone)]
pub struct ResourceCatalog {
    orchestrator: SessionOrchestrator,
    profiles: Arc<dyn ProfileStore>,
}

impl std::fmt::Debug for ResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCatalog").finish_non_exhaustive()
    }
}

impl ResourceCatalog {
    /// Create a catalog
    pub fn new(orchestrator: SessionOrchestrator, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            orchestrator,
            profiles,
        }
    }

    /// Available resources
    #[must_use]
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor {
                uri: SESSIONS_URI.to_string(),
                name: "RDP Sessions".to_string(),
                description: "All tracked remote desktop sessions and their status".to_string(),
                mime_type: JSON_MIME.to_string(),
            },
            ResourceDescriptor {
                uri: PROFILES_URI.to_string(),
                name: "Session Profiles".to_string(),
                description: "Saved connection profiles".to_string(),
                mime_type: JSON_MIME.to_string(),
            },
        ]
    }

    /// Read a resource
    ///
    /// Returns `Ok(None)` for an unknown uri.
    ///
    /// # Errors
    ///
    /// Fails when the profile store cannot be read.
    pub async fn read(&self, uri: &str) -> anyhow::Result<Option<ResourceContent>> {
        let text = match uri {
            SESSIONS_URI => serde_json::to_string_pretty(&self.orchestrator.list_sessions())?,
            PROFILES_URI => serde_json::to_string_pretty(&self.profiles.list().await?)?,
            _ => return Ok(None),
        };
        Ok(Some(ResourceContent {
            uri: uri.to_string(),
            mime_type: JSON_MIME.to_string(),
            text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::orchestrator::{ConnectionRequest, OrchestratorConfig};
    use crate::profiles::{MemoryProfileStore, SessionProfile};

    #[tokio::test]
    async fn test_read_resources() {
        let orchestrator =
            SessionOrchestrator::simulated(Duration::from_millis(5), OrchestratorConfig::default());
        let profiles = Arc::new(MemoryProfileStore::new());
        profiles
            .save(&SessionProfile::new("prod", "prod.example.com"))
            .await
            .unwrap();
        orchestrator
            .start_session(ConnectionRequest::new("a.example.com"))
            .unwrap();

        let catalog = ResourceCatalog::new(orchestrator, profiles);
        assert_eq!(catalog.list().len(), 2);

        let sessions = catalog.read(SESSIONS_URI).await.unwrap().unwrap();
        assert!(sessions.text.contains("a.example.com"));

        let saved = catalog.read(PROFILES_URI).await.unwrap().unwrap();
        assert!(saved.text.contains("prod.example.com"));

        assert!(catalog.read("rdp://nothing").await.unwrap().is_none());
    }
}

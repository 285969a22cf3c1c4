//! Connection Profiles
//!
//! Saved connection targets the chat surface can create and load by name.
//! Storage sits behind [`ProfileStore`]; the file store writes one pretty
//! JSON document per profile, and the memory store backs tests and
//! deployments without a profile directory.
//!
//! Profile names match case-insensitively.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::DEFAULT_RDP_PORT;
use crate::orchestrator::{ConnectionRequest, DisplaySettings};

/// Profile storage errors
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Profile name is blank
    #[error("Profile name cannot be empty")]
    EmptyName,

    /// No profile with this name
    #[error("Profile '{0}' not found")]
    NotFound(String),

    /// Filesystem failure
    #[error("Profile storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile document could not be encoded or decoded
    #[error("Profile format error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A saved connection target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    /// Unique name
    pub name: String,
    /// Target host
    pub host: String,
    /// Login name
    #[serde(default)]
    pub username: Option<String>,
    /// Target port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Search tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Screen settings applied on load
    #[serde(default)]
    pub display: DisplaySettings,
    /// When the profile was saved first
    pub created_at: DateTime<Utc>,
    /// When the profile was last loaded
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// How often the profile was loaded
    #[serde(default)]
    pub use_count: u32,
    /// Who created the profile
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_RDP_PORT
}

impl SessionProfile {
    /// Create a profile for `host`
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            username: None,
            port: DEFAULT_RDP_PORT,
            description: None,
            tags: Vec::new(),
            display: DisplaySettings::default(),
            created_at: Utc::now(),
            last_used: None,
            use_count: 0,
            created_by: None,
        }
    }

    /// Set username
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Record who created the profile
    #[must_use]
    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = Some(creator.into());
        self
    }

    /// Connection request for this profile, named after it
    #[must_use]
    pub fn to_request(&self) -> ConnectionRequest {
        let mut request = ConnectionRequest::new(self.host.clone())
            .with_port(self.port)
            .with_session_name(self.name.clone())
            .with_display(self.display.clone());
        request.username.clone_from(&self.username);
        request
    }

    /// Case-insensitive match on name, host, description or tags
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.host.to_lowercase().contains(&query)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }

    fn mark_used(&mut self) {
        self.use_count = self.use_count.saturating_add(1);
        self.last_used = Some(Utc::now());
    }
}

/// Profile persistence
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace a profile
    async fn save(&self, profile: &SessionProfile) -> Result<(), ProfileError>;

    /// Load a profile by name
    async fn load(&self, name: &str) -> Result<Option<SessionProfile>, ProfileError>;

    /// All profiles, sorted by name
    async fn list(&self) -> Result<Vec<SessionProfile>, ProfileError>;

    /// Delete a profile; false if it did not exist
    async fn delete(&self, name: &str) -> Result<bool, ProfileError>;

    /// Bump the use count and last-used time; false if the profile is missing
    async fn record_usage(&self, name: &str) -> Result<bool, ProfileError> {
        let Some(mut profile) = self.load(name).await? else {
            return Ok(false);
        };
        profile.mark_used();
        self.save(&profile).await?;
        debug!(profile = %profile.name, use_count = profile.use_count, "Profile usage recorded");
        Ok(true)
    }

    /// Profiles matching `query`
    async fn search(&self, query: &str) -> Result<Vec<SessionProfile>, ProfileError> {
        let found: Vec<_> = self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.matches(query))
            .collect();
        debug!(query, count = found.len(), "Profile search");
        Ok(found)
    }

    /// Used profiles, most used first, then most recently used
    async fn frequent(&self, count: usize) -> Result<Vec<SessionProfile>, ProfileError> {
        let mut used: Vec<_> = self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.use_count > 0)
            .collect();
        used.sort_by(|a, b| {
            b.use_count
                .cmp(&a.use_count)
                .then_with(|| b.last_used.cmp(&a.last_used))
        });
        used.truncate(count);
        Ok(used)
    }
}

fn validate_name(name: &str) -> Result<(), ProfileError> {
    if name.trim().is_empty() {
        Err(ProfileError::EmptyName)
    } else {
        Ok(())
    }
}

fn sort_by_name(profiles: &mut [SessionProfile]) {
    profiles.sort_by_key(|p| p.name.to_lowercase());
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory profile store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, SessionProfile>>,
}

impl MemoryProfileStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn save(&self, profile: &SessionProfile) -> Result<(), ProfileError> {
        validate_name(&profile.name)?;
        self.profiles
            .write()
            .insert(profile.name.trim().to_lowercase(), profile.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<SessionProfile>, ProfileError> {
        validate_name(name)?;
        Ok(self.profiles.read().get(&name.trim().to_lowercase()).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionProfile>, ProfileError> {
        let mut profiles: Vec<_> = self.profiles.read().values().cloned().collect();
        sort_by_name(&mut profiles);
        Ok(profiles)
    }

    async fn delete(&self, name: &str) -> Result<bool, ProfileError> {
        validate_name(name)?;
        Ok(self
            .profiles
            .write()
            .remove(&name.trim().to_lowercase())
            .is_some())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Profile store writing one JSON file per profile
#[derive(Debug, Clone)]
pub struct JsonFileProfileStore {
    dir: PathBuf,
}

impl JsonFileProfileStore {
    /// Open a store rooted at `dir`, creating the directory
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Profile store opened");
        Ok(Self { dir })
    }

    /// Default profile directory (`$XDG_DATA_HOME/rdp-conductor/profiles`)
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("rdp-conductor").join("profiles"))
    }

    /// Directory holding the profile files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_name(name)))
    }
}

/// File name for a profile name
///
/// Lowercased; runs of characters outside `[a-z0-9-_]` collapse to one `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "profile".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn save(&self, profile: &SessionProfile) -> Result<(), ProfileError> {
        validate_name(&profile.name)?;
        let path = self.path_for(&profile.name);
        let json = serde_json::to_string_pretty(profile)?;
        tokio::fs::write(&path, json).await?;
        info!(profile = %profile.name, path = %path.display(), "Profile saved");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<SessionProfile>, ProfileError> {
        validate_name(name)?;
        let path = self.path_for(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<SessionProfile>, ProfileError> {
        let mut profiles = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(json) => match serde_json::from_str::<SessionProfile>(&json) {
                    Ok(profile) => profiles.push(profile),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable profile"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable profile"),
            }
        }

        sort_by_name(&mut profiles);
        Ok(profiles)
    }

    async fn delete(&self, name: &str) -> Result<bool, ProfileError> {
        validate_name(name)?;
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => {
                info!(profile = name, "Profile deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

//! Daemon Configuration
//!
//! Resolves every tunable of the conductor from defaults, an optional TOML
//! file at `~/.config/rdp-conductor/conductor.toml`, the environment and the
//! command line.
//!
//! # Precedence
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. `RDP_CONDUCTOR_*` variables
//! 3. The TOML file
//! 4. Built-in defaults
//!
//! API keys for the external model backend are only ever read from the
//! environment, never from the file.
//!
//! The file lives under `$XDG_CONFIG_HOME` (usually `~/.config`).
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 5000
//!
//! [assistant]
//! max_input_length = 4000
//! chain_step_delay_ms = 500
//! model_timeout_secs = 30
//! conversation_idle_timeout_secs = 3600
//!
//! [sessions]
//! connect_timeout_secs = 30
//! simulated_connect_delay_ms = 2000
//! max_sessions = 5
//! unreachable_hosts = ["offline.example.com"]
//!
//! [profiles]
//! directory = "/home/me/.local/share/rdp-conductor/profiles"
//!
//! [backend]
//! enabled = true
//! model = "gpt-4o-mini"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assistant::AssistantConfig;
use crate::backend::BackendConfig;
use crate::orchestrator::OrchestratorConfig;

/// Environment variable prefix for non-secret settings
pub const ENV_PREFIX: &str = "RDP_CONDUCTOR_";

// =============================================================================
// Error Types
// =============================================================================

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Cannot read config file {path}: {source}")]
    ReadError {
        /// File that was read
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ConductorToml`]
    #[error("Malformed config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A resolved value is unusable
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Provenance
// =============================================================================

/// Highest-priority layer that set a value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command line
    Cli,
    /// `RDP_CONDUCTOR_*` variable
    Env,
    /// TOML file
    File,
    /// Nothing overrode the defaults
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => f.write_str("command line"),
            Self::Env => f.write_str("environment"),
            Self::File => f.write_str("config file"),
            Self::Default => f.write_str("defaults"),
        }
    }
}

// =============================================================================
// File Layout
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address to bind the HTTP listener to
    pub bind_address: Option<String>,

    /// Port to listen on
    pub port: Option<u16>,
}

/// `[assistant]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// Maximum chat input length in characters
    pub max_input_length: Option<usize>,

    /// Pause between chain steps in milliseconds
    pub chain_step_delay_ms: Option<u64>,

    /// Model response timeout in seconds
    pub model_timeout_secs: Option<u64>,

    /// Idle time after which a conversation is pruned, in seconds
    pub conversation_idle_timeout_secs: Option<u64>,
}

/// `[sessions]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsToml {
    /// Upper bound on one connect attempt in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Delay of the simulated connector in milliseconds
    pub simulated_connect_delay_ms: Option<u64>,

    /// Maximum number of concurrent sessions
    pub max_sessions: Option<usize>,

    /// Hosts the simulated connector treats as unreachable
    pub unreachable_hosts: Option<Vec<String>>,

    /// Directory screenshots are written to
    pub screenshot_dir: Option<String>,
}

/// `[profiles]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesToml {
    /// Directory holding one JSON file per profile
    pub directory: Option<String>,
}

/// `[backend]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Set to false to stay in rules-only mode even when a key is present
    pub enabled: Option<bool>,

    /// Model or deployment name override
    pub model: Option<String>,
}

/// Whole config file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Assistant configuration section
    pub assistant: AssistantToml,

    /// Session configuration section
    pub sessions: SessionsToml,

    /// Profile storage section
    pub profiles: ProfilesToml,

    /// Model backend section
    pub backend: BackendToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Resolved configuration of the daemon
///
/// Use [`load_config`] to build one with proper priority handling.
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Address to bind to
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum chat input length in characters
    pub max_input_length: usize,

    /// Pause between chain steps
    pub chain_step_delay: Duration,

    /// Model response timeout
    pub model_timeout: Duration,

    /// Idle time after which conversations are pruned
    pub conversation_idle_timeout: Duration,

    /// Upper bound on one connect attempt
    pub connect_timeout: Duration,

    /// Delay of the simulated connector
    pub simulated_connect_delay: Duration,

    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Hosts the simulated connector treats as unreachable
    pub unreachable_hosts: Vec<String>,

    /// Screenshot directory (platform default when unset)
    pub screenshot_dir: Option<PathBuf>,

    /// Profile directory (platform default when unset)
    pub profiles_dir: Option<PathBuf>,

    /// External model backend
    pub backend: BackendConfig,

    /// File the values were read from, when one existed
    pub config_file_path: Option<PathBuf>,

    /// Highest-priority layer that contributed
    source: ConfigSource,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            max_input_length: 4000,
            chain_step_delay: Duration::from_millis(500),
            model_timeout: Duration::from_secs(30),
            conversation_idle_timeout: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(30),
            simulated_connect_delay: Duration::from_secs(2),
            max_sessions: 5,
            unreachable_hosts: Vec::new(),
            screenshot_dir: None,
            profiles_dir: None,
            backend: BackendConfig::Disabled,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfig {
    /// Built-in defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the effective values came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// `address:port` to listen on
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Orchestrator settings
    #[must_use]
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            connect_timeout: self.connect_timeout,
            max_sessions: self.max_sessions,
            ..OrchestratorConfig::default()
        }
    }

    /// Assistant settings
    #[must_use]
    pub fn assistant(&self) -> AssistantConfig {
        AssistantConfig {
            max_input_chars: self.max_input_length,
            chain_step_delay: self.chain_step_delay,
        }
    }

    /// Check values that would make the daemon unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "bind_address must not be empty".to_string(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "max_sessions must be at least 1".to_string(),
            ));
        }
        if self.max_input_length == 0 {
            return Err(ConfigError::ValidationError(
                "max_input_length must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// `rdp-conductor/conductor.toml` under the platform config directory
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rdp-conductor").join("conductor.toml"))
}

/// Resolve the configuration from the default file and the process environment
///
/// # Errors
///
/// Fails when the file exists but is unreadable or malformed, or when a
/// resolved value is invalid. A missing file just means defaults.
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Resolve the configuration from `path` and the process environment
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Resolve the configuration with an injected variable lookup
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConductorConfig, ConfigError> {
    let mut config = ConductorConfig::default();
    let mut file_backend = BackendToml::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            file_backend = toml_config.backend;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Config file applied"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "No config file, keeping defaults"
            );
        }
    }

    apply_env_config(&mut config, &lookup);

    config.backend = if file_backend.enabled == Some(false) {
        BackendConfig::Disabled
    } else {
        let backend = BackendConfig::from_lookup(&lookup);
        let env_model = lookup("OPENAI_MODEL").or_else(|| lookup("AZURE_OPENAI_MODEL"));
        match file_backend.model {
            Some(model) if env_model.is_none() => with_model(backend, model),
            _ => backend,
        }
    };

    config.validate()?;
    Ok(config)
}

fn with_model(backend: BackendConfig, model: String) -> BackendConfig {
    match backend {
        BackendConfig::OpenAi {
            api_key, endpoint, ..
        } => BackendConfig::OpenAi {
            api_key,
            endpoint,
            model,
        },
        BackendConfig::AzureOpenAi {
            api_key, endpoint, ..
        } => BackendConfig::AzureOpenAi {
            api_key,
            endpoint,
            model,
        },
        BackendConfig::Disabled => BackendConfig::Disabled,
    }
}

/// Overlay the values present in the file
fn apply_toml_config(config: &mut ConductorConfig, toml: &ConductorToml) {
    // Server settings
    if let Some(ref address) = toml.server.bind_address {
        config.bind_address.clone_from(address);
    }
    if let Some(port) = toml.server.port {
        config.port = port;
    }

    // Assistant settings
    if let Some(length) = toml.assistant.max_input_length {
        config.max_input_length = length;
    }
    if let Some(ms) = toml.assistant.chain_step_delay_ms {
        config.chain_step_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.assistant.model_timeout_secs {
        config.model_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.assistant.conversation_idle_timeout_secs {
        config.conversation_idle_timeout = Duration::from_secs(secs);
    }

    // Session settings
    if let Some(secs) = toml.sessions.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = toml.sessions.simulated_connect_delay_ms {
        config.simulated_connect_delay = Duration::from_millis(ms);
    }
    if let Some(max) = toml.sessions.max_sessions {
        config.max_sessions = max;
    }
    if let Some(ref hosts) = toml.sessions.unreachable_hosts {
        config.unreachable_hosts.clone_from(hosts);
    }
    if let Some(ref dir) = toml.sessions.screenshot_dir {
        config.screenshot_dir = Some(PathBuf::from(dir));
    }

    // Profile settings
    if let Some(ref dir) = toml.profiles.directory {
        config.profiles_dir = Some(PathBuf::from(dir));
    }
}

/// Overlay `RDP_CONDUCTOR_*` variables; unparseable values are ignored
fn apply_env_config(config: &mut ConductorConfig, lookup: &impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(address) = var("BIND") {
        config.bind_address = address;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = var("PORT").and_then(|v| v.parse::<u16>().ok()) {
        config.port = port;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = var("CONNECT_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
        config.connect_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = var("CHAIN_STEP_DELAY").and_then(|v| v.parse::<u64>().ok()) {
        config.chain_step_delay = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = var("MODEL_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
        config.model_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = var("PROFILES_DIR") {
        config.profiles_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(max) = var("MAX_SESSIONS").and_then(|v| v.parse::<usize>().ok()) {
        config.max_sessions = max;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// Command Line
// =============================================================================

/// Values given on the command line
///
/// Applied last, on top of [`load_config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub bind_address: Option<String>,

    /// Port override
    pub port: Option<u16>,

    /// Profile directory override
    pub profiles_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind_address(mut self, address: String) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set profile directory override
    #[must_use]
    pub fn with_profiles_dir(mut self, dir: PathBuf) -> Self {
        self.profiles_dir = Some(dir);
        self
    }

    /// Overlay onto `config`
    pub fn apply(&self, config: &mut ConductorConfig) {
        if self.bind_address.is_some() || self.port.is_some() || self.profiles_dir.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref address) = self.bind_address {
            config.bind_address.clone_from(address);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref dir) = self.profiles_dir {
            config.profiles_dir = Some(dir.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

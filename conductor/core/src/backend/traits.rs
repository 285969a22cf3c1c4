//! Model Backend Traits
//!
//! Trait definitions for the optional language-model backend. The intent
//! parser only needs "send a prompt, get text back", so the trait stays small
//! and providers handle their own API formats and authentication.
//!
//! # Design Philosophy
//!
//! The backend is never required. When no key is configured the parser runs
//! on its keyword rules alone, and every backend failure is recovered by the
//! caller. Implementations therefore report errors plainly through
//! `anyhow::Result` and never retry on their own.

use std::fmt;

use async_trait::async_trait;

/// Default OpenAI chat completions endpoint
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default OpenAI model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default Azure OpenAI deployment
pub const DEFAULT_AZURE_MODEL: &str = "gpt-4";

/// A single prompt for the backend
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The user message
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// Temperature (0.0-1.0, higher = more creative)
    pub temperature: f32,
    /// System prompt
    pub system: Option<String>,
    /// Recent conversation, prepended to the user message
    pub context: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            max_tokens: 500,
            temperature: 0.3,
            system: None,
            context: None,
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// User message with any context prepended
    #[must_use]
    pub fn user_content(&self) -> String {
        match &self.context {
            Some(context) if !context.is_empty() => format!("{context}\n{}", self.prompt),
            _ => self.prompt.clone(),
        }
    }
}

/// Complete backend reply
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Model backend trait
///
/// Implement this trait to add support for a different provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend name (for logs)
    fn name(&self) -> &str;

    /// Model requests are sent to
    fn model(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Send a request and wait for the complete response
    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse>;
}

/// Which backend to use, resolved from configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// No backend: keyword rules only
    #[default]
    Disabled,
    /// OpenAI chat completions
    OpenAi {
        /// API key for authentication
        api_key: String,
        /// Full chat completions URL
        endpoint: String,
        /// Model name
        model: String,
    },
    /// Azure OpenAI deployment
    AzureOpenAi {
        /// API key for authentication
        api_key: String,
        /// Resource endpoint, e.g. `https://name.openai.azure.com`
        endpoint: String,
        /// Deployment name
        model: String,
    },
}

impl BackendConfig {
    /// Resolve the backend from environment variables
    ///
    /// An Azure key and endpoint take precedence over an OpenAI key. With
    /// neither, the backend is disabled.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the backend using a custom variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let (Some(api_key), Some(endpoint)) =
            (get("AZURE_OPENAI_API_KEY"), get("AZURE_OPENAI_ENDPOINT"))
        {
            return Self::AzureOpenAi {
                api_key,
                endpoint,
                model: get("AZURE_OPENAI_MODEL").unwrap_or_else(|| DEFAULT_AZURE_MODEL.to_string()),
            };
        }

        if let Some(api_key) = get("OPENAI_API_KEY") {
            return Self::OpenAi {
                api_key,
                endpoint: get("OPENAI_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string()),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            };
        }

        Self::Disabled
    }

    /// Whether a backend is configured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Short label for logs and status output
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::OpenAi { .. } => "openai",
            Self::AzureOpenAi { .. } => "azure-openai",
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::OpenAi {
                endpoint, model, ..
            } => f
                .debug_struct("OpenAi")
                .field("api_key", &"<redacted>")
                .field("endpoint", endpoint)
                .field("model", model)
                .finish(),
            Self::AzureOpenAi {
                endpoint, model, ..
            } => f
                .debug_struct("AzureOpenAi")
                .field("api_key", &"<redacted>")
                .field("endpoint", endpoint)
                .field("model", model)
                .finish(),
        }
    }
}

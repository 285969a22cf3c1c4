//! Model Backend Integration
//!
//! Optional language-model access for the intent parser, through a common
//! trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI**: chat completions with a bearer key
//! - **Azure OpenAI**: the same API behind a deployment URL and `api-key` header
//!
//! # Usage
//!
//! ```ignore
//! use rdp_conductor_core::backend::{BackendConfig, ChatCompletionsBackend, LlmBackend, LlmRequest};
//!
//! let config = BackendConfig::from_env();
//! if let Some(backend) = ChatCompletionsBackend::from_config(&config, timeout)? {
//!     let reply = backend.send(&LlmRequest::new("list my sessions", "")).await?;
//! }
//! ```

mod openai;
mod traits;

pub use openai::{ChatCompletionsBackend, AZURE_API_VERSION};
pub use traits::{
    BackendConfig, LlmBackend, LlmRequest, LlmResponse, DEFAULT_AZURE_MODEL,
    DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL,
};

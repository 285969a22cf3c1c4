//! Chat Completions Backend
//!
//! Backend for the OpenAI chat completions API and Azure OpenAI deployments,
//! which share a request and response format and differ only in URL and
//! authentication header.
//!
//! # Request
//!
//! ```text
//! POST {url}
//! { "model": "...",
//!   "messages": [ {"role":"system",...}, {"role":"user",...} ],
//!   "max_tokens": 500, "temperature": 0.3 }
//! ```
//!
//! The reply text is `choices[0].message.content`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::traits::{BackendConfig, LlmBackend, LlmRequest, LlmResponse};

/// Azure API version sent with every deployment call
pub const AZURE_API_VERSION: &str = "2024-02-15-preview";

const USER_AGENT: &str = "RetroRDP-Client/1.0";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Auth {
    Bearer,
    AzureKey,
}

/// OpenAI / Azure OpenAI chat completions client
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    url: String,
    api_key: String,
    model: String,
    auth: Auth,
    provider: &'static str,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for ChatCompletionsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsBackend")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsBackend {
    /// Create from `BackendConfig`
    ///
    /// Returns `Ok(None)` when the backend is disabled.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig, timeout: Duration) -> anyhow::Result<Option<Self>> {
        let (url, api_key, model, auth, provider) = match config {
            BackendConfig::Disabled => return Ok(None),
            BackendConfig::OpenAi {
                api_key,
                endpoint,
                model,
            } => (
                endpoint.clone(),
                api_key.clone(),
                model.clone(),
                Auth::Bearer,
                "OpenAI",
            ),
            BackendConfig::AzureOpenAi {
                api_key,
                endpoint,
                model,
            } => (
                azure_url(endpoint, model),
                api_key.clone(),
                model.clone(),
                Auth::AzureKey,
                "Azure OpenAI",
            ),
        };

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Some(Self {
            url,
            api_key,
            model,
            auth,
            provider,
            http_client,
        }))
    }

    /// Request URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.user_content() }));

        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = json!(request.max_tokens);
        }
        body
    }
}

fn azure_url(endpoint: &str, deployment: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={AZURE_API_VERSION}",
        endpoint.trim_end_matches('/')
    )
}

/// Extract `choices[0].message.content` from a completions reply
fn reply_content(data: &Value) -> Option<&str> {
    data.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

#[async_trait]
impl LlmBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        let ping = LlmRequest::new("ping", self.model.clone()).with_max_tokens(1);
        self.send(&ping).await.is_ok()
    }

    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse> {
        let start = Instant::now();

        let builder = self.http_client.post(&self.url).json(&self.request_body(request));
        let builder = match self.auth {
            Auth::Bearer => builder.bearer_auth(&self.api_key),
            Auth::AzureKey => builder.header("api-key", &self.api_key),
        };
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {status}: {body}", self.provider);
        }

        let data: Value = response.json().await?;
        let content = reply_content(&data)
            .ok_or_else(|| anyhow::anyhow!("{} reply has no message content", self.provider))?
            .to_string();

        let tokens_used = data
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok());

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            tokens_used,
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai() -> ChatCompletionsBackend {
        let config = BackendConfig::OpenAi {
            api_key: "sk-test".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        ChatCompletionsBackend::from_config(&config, Duration::from_secs(5))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        let backend =
            ChatCompletionsBackend::from_config(&BackendConfig::Disabled, Duration::from_secs(1))
                .unwrap();
        assert!(backend.is_none());
    }

    #[test]
    fn test_azure_url() {
        let config = BackendConfig::AzureOpenAi {
            api_key: "k".to_string(),
            endpoint: "https://res.openai.azure.com/".to_string(),
            model: "gpt-4".to_string(),
        };
        let backend = ChatCompletionsBackend::from_config(&config, Duration::from_secs(1))
            .unwrap()
            .unwrap();

        assert_eq!(
            backend.url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version=2024-02-15-preview"
        );
        assert_eq!(backend.name(), "Azure OpenAI");
        assert_eq!(backend.auth, Auth::AzureKey);
    }

    #[test]
    fn test_request_body_shape() {
        let backend = openai();
        let request = LlmRequest::new("connect to a.example.com", "")
            .with_system("You are AssistBot");
        let body = backend.request_body(&request);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "connect to a.example.com");
    }

    #[test]
    fn test_reply_content_extraction() {
        let data = json!({
            "choices": [ { "message": { "role": "assistant", "content": "{\"action\":\"ListSessions\"}" } } ]
        });
        assert_eq!(reply_content(&data), Some("{\"action\":\"ListSessions\"}"));
        assert_eq!(reply_content(&json!({ "choices": [] })), None);
    }

    #[test]
    fn test_debug_hides_key() {
        let printed = format!("{:?}", openai());
        assert!(!printed.contains("sk-test"));
    }
}

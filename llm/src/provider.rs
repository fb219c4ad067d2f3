//! Completion providers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompletionError, Result};

/// A single completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// System prompt framing the task.
    pub system_prompt: String,

    /// The user-turn payload.
    pub user_message: String,

    /// Upper bound on generated tokens.
    pub max_tokens: u32,

    /// Model override; `None` uses the provider default.
    pub model: Option<String>,

    /// Sampling temperature; `None` uses the provider default.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request with the given prompts and token cap.
    pub fn new(
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            max_tokens,
            model: None,
            temperature: None,
        }
    }

    /// Override the model for this call.
    pub fn with_model(mut self, model: impl Into<Option<String>>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait for LLM completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Name of this provider, for logging.
    fn name(&self) -> &str;

    /// Model used when a request carries no override.
    fn default_model(&self) -> &str;

    /// Run one completion and return the generated text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Whether the provider is ready to serve requests (credentials set).
    fn is_available(&self) -> bool;
}

/// Provider for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    api_key: Option<String>,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// Create a provider reading the API key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point the provider at a different base URL (proxy, local server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Apply a request timeout to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }
}

impl Default for OpenAiChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or(CompletionError::NotConfigured)?;

        let model = request
            .model
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_message},
            ],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(CompletionError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api(format!("{status}: {detail}")));
        }

        let result: WireResponse = response.json().await?;
        let text = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                CompletionError::InvalidResponse("no choices in response".to_string())
            })?;

        debug!(model = %model, chars = text.len(), "completion generated");
        Ok(text)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Wire format of an OpenAI-compatible chat completion response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiChat {
        OpenAiChat::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_model("test-chat")
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "test-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "rewritten query"}}],
            })))
            .mount(&server)
            .await;

        let text = provider(&server)
            .complete(CompletionRequest::new("system", "user", 128))
            .await
            .unwrap();
        assert_eq!(text, "rewritten query");
    }

    #[tokio::test]
    async fn test_complete_uses_model_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "judge-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "[7, 3]"}}],
            })))
            .mount(&server)
            .await;

        let request = CompletionRequest::new("system", "user", 64)
            .with_model(Some("judge-model".to_string()));
        let text = provider(&server).complete(request).await.unwrap();
        assert_eq!(text, "[7, 3]");
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(CompletionRequest::new("system", "user", 64))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(CompletionRequest::new("system", "user", 64))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Api(_)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(CompletionRequest::new("system", "user", 64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }
}

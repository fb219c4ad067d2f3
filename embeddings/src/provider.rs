//! Embedding providers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use recall_core::Embedding;

/// Trait for embedding providers.
///
/// Implementations must be safe to share across concurrent retrieval
/// requests.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name of this provider, for logging.
    fn name(&self) -> &str;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Generate an embedding for `text`.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for several texts.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// batch endpoint should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Whether the provider is ready to serve requests (credentials set).
    fn is_available(&self) -> bool;
}

/// Provider for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    /// Create a provider reading the API key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
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

    /// Select the embedding model and its output dimension.
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
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

    async fn request(&self, input: serde_json::Value) -> Result<WireResponse> {
        let api_key = self.api_key.as_ref().ok_or(EmbeddingError::NotConfigured)?;

        let body = serde_json::json!({
            "input": input,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
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
            return Err(EmbeddingError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {detail}")));
        }

        response
            .json::<WireResponse>()
            .await
            .map_err(EmbeddingError::Http)
    }
}

impl Default for OpenAiEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let result = self.request(serde_json::Value::String(text.to_string())).await?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("no embedding in response".to_string())
            })?;

        debug!(model = %self.model, dimension = embedding.len(), "generated embedding");
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let input = serde_json::Value::Array(
            texts
                .iter()
                .map(|t| serde_json::Value::String(t.clone()))
                .collect(),
        );
        let result = self.request(input).await?;

        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        debug!(model = %self.model, count = result.data.len(), "generated batch embeddings");
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Wire format of an OpenAI-compatible embeddings response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiEmbeddings {
        OpenAiEmbeddings::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_model("test-embed", 3)
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}],
            })))
            .mount(&server)
            .await;

        let embedding = provider(&server).embed("hello").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_empty_text_rejected() {
        let server = MockServer::start().await;
        let err = provider(&server).embed("   ").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_embed_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited { retry_after_secs: 7 }
        ));
    }

    #[tokio::test]
    async fn test_embed_empty_data_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_embed_batch_length_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1]}],
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let mut p = OpenAiEmbeddings::new();
        p.api_key = None;
        assert!(!p.is_available());
        let err = p.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::NotConfigured));
    }
}

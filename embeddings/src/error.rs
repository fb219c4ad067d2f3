//! Error types for embedding generation.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur while generating embeddings.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API key (or other required credentials) configured.
    #[error("embedding provider not configured")]
    NotConfigured,

    /// The input text is empty or otherwise unembeddable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider returned a non-success status.
    #[error("embedding request failed: {0}")]
    Api(String),

    /// The provider response did not contain a usable vector.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    /// The provider rate-limited the request.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

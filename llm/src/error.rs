//! Error types for LLM completions.

use thiserror::Error;

/// Result type alias for completion operations.
pub type Result<T> = std::result::Result<T, CompletionError>;

/// Errors that can occur while requesting a completion.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// No API key (or other required credentials) configured.
    #[error("completion provider not configured")]
    NotConfigured,

    /// The provider returned a non-success status.
    #[error("completion request failed: {0}")]
    Api(String),

    /// The provider response carried no usable text.
    #[error("invalid completion response: {0}")]
    InvalidResponse(String),

    /// The provider rate-limited the request.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

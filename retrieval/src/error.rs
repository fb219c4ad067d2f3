//! Error types for the retrieval pipeline.

use std::future::Future;

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval pipeline.
///
/// Only two places are allowed to surface these to a caller: input
/// validation at the orchestrator entry point, and the mandatory
/// query-embedding call inside hybrid search. Every optional stage
/// converts its own failures into a documented fallback instead.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The query string is empty.
    #[error("query must not be empty")]
    EmptyQuery,

    /// The owner scope is present but empty.
    #[error("scope must not be empty")]
    InvalidScope,

    /// The pipeline was assembled without a required dependency.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding generation failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] recall_embeddings::EmbeddingError),

    /// LLM completion failed.
    #[error("completion error: {0}")]
    Completion(#[from] recall_llm::CompletionError),

    /// A datastore strategy failed.
    #[error("store error: {0}")]
    Store(#[from] recall_core::StoreError),

    /// An external call exceeded the configured timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// The call that timed out.
        operation: &'static str,
    },
}

/// Run `fut` under `timeout`, folding an elapsed timer and the call's own
/// error into [`RetrievalError`]. Fallback logic treats both identically.
pub(crate) async fn timed<T, E>(
    timeout: std::time::Duration,
    operation: &'static str,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    RetrievalError: From<E>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(RetrievalError::Timeout { operation }),
    }
}

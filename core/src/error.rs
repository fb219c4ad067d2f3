//! Error types for the datastore and cache boundaries.

use thiserror::Error;

/// Errors surfaced by the datastore traits.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed the query.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The backend is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The query itself is malformed (bad pattern, empty vector, ...).
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors surfaced by a [`crate::CacheBackend`].
///
/// Callers in the pipeline treat every variant identically: a failed
/// lookup is a miss and a failed store is a no-op.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend rejected the operation.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// The backend is unreachable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

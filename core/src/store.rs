//! Datastore boundary traits.
//!
//! The pipeline core never owns an index; it issues queries through these
//! traits and leaves the engine details (HNSW, FTS5, property graph, ...)
//! to the implementation behind them. Implementations must be safe to call
//! from concurrent tasks.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::memory::MemoryRecord;

/// Result alias for datastore operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single vector search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The matched memory.
    pub record: MemoryRecord,

    /// Cosine similarity in [0, 1].
    pub similarity: f32,
}

/// A single keyword search hit.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    /// The matched memory.
    pub record: MemoryRecord,

    /// Full-text rank score (engine-specific scale).
    pub rank: f32,
}

/// A named entity stored in the knowledge graph.
#[derive(Debug, Clone)]
pub struct GraphEntity {
    /// Opaque entity identifier.
    pub id: String,

    /// Display name, used for mention matching.
    pub name: String,
}

/// Similarity search over stored memory embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` memories closest to `embedding`, sorted by
    /// similarity descending. `scope` restricts results to one owner.
    async fn query_vector(
        &self,
        embedding: &[f32],
        scope: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<VectorHit>>;
}

/// Full-text search over memory content.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Return up to `limit` memories matching `text`, sorted by rank
    /// descending. A query that produces no tokens returns an empty list,
    /// not an error.
    async fn query_text(
        &self,
        text: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<KeywordHit>>;
}

/// Entity lookup and mention expansion over the knowledge graph.
#[async_trait]
pub trait EntityGraph: Send + Sync {
    /// Find up to `limit` entities whose name matches `pattern`.
    async fn find_entities(
        &self,
        pattern: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<GraphEntity>>;

    /// Find up to `limit` memories whose content mentions any of `names`.
    async fn find_memories_mentioning(
        &self,
        names: &[String],
        scope: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>>;
}

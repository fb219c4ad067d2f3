//! # recall-retrieval
//!
//! Multi-stage retrieval pipeline for grounding LLM responses in a
//! long-term memory store: hybrid search fused with Reciprocal Rank
//! Fusion, LLM query rewriting and HyDE, cross-encoder reranking, a
//! content-addressed result cache, and iterative gap filling.
//!
//! ## Architecture
//!
//! ```text
//! RetrievalPipeline
//! ├── QueryRewriter
//! │   ├── contextual rewrite (conversation history)
//! │   └── HyDE (hypothetical document embedding)
//! ├── RetrievalCache
//! │   └── fingerprint(rounded embedding) → CacheEntry
//! ├── HybridSearcher
//! │   ├── vector strategy      (similarity)
//! │   ├── keyword strategy     (full-text rank)
//! │   ├── graph strategy       (entity mentions)
//! │   └── RRF fusion + hydration + temporal filter
//! ├── Reranker
//! │   └── LLM judge, batches of 5, graceful per-batch degradation
//! └── GapFiller
//!     └── completeness judge → follow-up rounds → merge
//! ```
//!
//! Every optional stage degrades to a no-op or pass-through on failure;
//! the orchestrator's outer boundary falls back to a plain hybrid search
//! and finally to an empty result set. The caller never sees a dependency
//! error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recall_retrieval::{RetrievalPipeline, RetrievalRequest};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .with_vector_index(vector)
//!     .with_keyword_index(keyword)
//!     .with_entity_graph(graph)
//!     .with_embedder(embedder)
//!     .with_completions(llm)
//!     .build()?;
//!
//! let outcome = pipeline
//!     .retrieve(RetrievalRequest::new("where did we land on the cache TTL?"))
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod gap;
pub mod hybrid;
pub mod rerank;
pub mod rewrite;

pub use cache::{CacheEntry, CacheStats, RetrievalCache};
pub use config::PipelineConfig;
pub use engine::{
    PipelineRun, RetrievalOutcome, RetrievalPipeline, RetrievalPipelineBuilder, RetrievalRequest,
};
pub use error::{Result, RetrievalError};
pub use gap::{CompletenessVerdict, GapFillOutcome, GapFiller};
pub use hybrid::{HybridSearcher, SearchRequest};
pub use rerank::Reranker;
pub use rewrite::{ChatTurn, HypotheticalDocument, QueryRewriter, Speaker};

// Re-export the shared data model for convenience.
pub use recall_core::{Candidate, MemoryKind, MemoryRecord, RankedCandidate};

//! # recall-core
//!
//! Shared data model and collaborator traits for the recall memory pipeline.
//!
//! This crate defines the value types that flow through every retrieval
//! stage (`MemoryRecord`, `Candidate`, `RankedCandidate`) and the trait
//! boundaries behind which the actual storage engines live:
//!
//! - [`VectorIndex`] — similarity search over embeddings
//! - [`KeywordIndex`] — full-text search over memory content
//! - [`EntityGraph`] — entity lookup and mention expansion
//! - [`CacheBackend`] — byte-oriented key-value cache
//!
//! The pipeline never talks to a datastore directly; it receives these
//! traits as injected handles at construction time.

pub mod cache;
pub mod error;
pub mod memory;
pub mod store;

pub use cache::{CacheBackend, InMemoryCacheBackend};
pub use error::{CacheError, StoreError};
pub use memory::{
    Candidate, MemoryKind, MemoryRecord, RankedCandidate, DEFAULT_IMPORTANCE, NEUTRAL_JUDGE_SCORE,
    SINGLE_CANDIDATE_SCORE,
};
pub use store::{EntityGraph, GraphEntity, KeywordHit, KeywordIndex, VectorHit, VectorIndex};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

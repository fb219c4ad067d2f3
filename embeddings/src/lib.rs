//! # recall-embeddings
//!
//! Embedding generation boundary for the recall memory pipeline.
//!
//! The pipeline needs exactly one capability from this crate: turn a piece
//! of text into a dense vector. [`EmbeddingProvider`] captures that
//! contract; [`OpenAiEmbeddings`] implements it against any
//! OpenAI-compatible `/embeddings` endpoint.
//!
//! Providers do not retry internally — a failed call surfaces as an error
//! and the caller's fallback policy decides what happens next.

pub mod error;
pub mod provider;

pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, OpenAiEmbeddings};

pub use recall_core::Embedding;

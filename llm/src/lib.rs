//! # recall-llm
//!
//! LLM completion boundary for the recall memory pipeline.
//!
//! Four pipeline stages talk to a language model — the query rewriter, the
//! HyDE generator, the reranking judge, and the gap-filling completeness
//! judge. All four go through the same [`CompletionProvider`] trait with a
//! per-call-site model override, so a deployment can point cheap stages at
//! a small model and judges at a larger one.
//!
//! Providers do not retry internally; failures surface as errors and each
//! call site applies its own documented fallback.

pub mod error;
pub mod provider;

pub use error::{CompletionError, Result};
pub use provider::{CompletionProvider, CompletionRequest, OpenAiChat};

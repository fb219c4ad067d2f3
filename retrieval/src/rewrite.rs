//! Query rewriting: contextual rewrite and hypothetical documents.
//!
//! Two independent, individually feature-gated LLM transforms:
//!
//! - **Contextual rewrite** turns a conversational query ("what about the
//!   second one?") into a self-contained one, using recent history. It is
//!   never allowed to block or corrupt retrieval: any failure, timeout, or
//!   empty output returns the original query unchanged.
//! - **HyDE** writes a short passage that would be a perfect answer and
//!   embeds that passage instead of the query. Vector search then matches
//!   answer-shaped memories; keyword search keeps using the original
//!   query text, because lexical overlap with the real question still
//!   matters. Any failure yields `None` and the caller falls back to
//!   plain search.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use recall_core::Embedding;
use recall_embeddings::EmbeddingProvider;
use recall_llm::{CompletionProvider, CompletionRequest};

use crate::config::RewriteConfig;
use crate::error::timed;

/// Minimum history turns before a contextual rewrite is attempted.
const MIN_HISTORY_TURNS: usize = 2;

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite search queries. Given a conversation and the \
    user's latest query, produce a single self-contained query with all pronouns and implicit \
    references resolved. Reply with the rewritten query only, no explanation.";

const HYDE_SYSTEM_PROMPT: &str = "You write hypothetical reference passages. Given a query, \
    write a short passage (roughly 200-300 tokens) that would be a perfect answer, phrased as \
    if it already existed in a knowledge base. Write the passage only, no preamble.";

/// A speaker in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The end user.
    User,
    /// The assistant.
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Who spoke.
    pub speaker: Speaker,

    /// What they said.
    pub content: String,
}

impl ChatTurn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// A HyDE passage together with its embedding.
#[derive(Debug, Clone)]
pub struct HypotheticalDocument {
    /// The generated passage, kept for logging and audit.
    pub passage: String,

    /// The passage embedding, used to seed vector search.
    pub embedding: Embedding,
}

/// LLM-backed query rewriter.
pub struct QueryRewriter {
    llm: Arc<dyn CompletionProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RewriteConfig,
    call_timeout: Duration,
}

impl QueryRewriter {
    /// Create a rewriter over the injected providers.
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RewriteConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            embedder,
            config,
            call_timeout,
        }
    }

    /// Rewrite `query` into a self-contained query using conversation
    /// history. Returns the original query whenever a rewrite is not
    /// possible or not warranted.
    pub async fn contextualize(&self, query: &str, history: &[ChatTurn]) -> String {
        if history.len() < MIN_HISTORY_TURNS {
            return query.to_string();
        }

        let window_start = history.len().saturating_sub(self.config.history_window);
        let transcript: String = history[window_start..]
            .iter()
            .map(|turn| {
                let who = match turn.speaker {
                    Speaker::User => "User",
                    Speaker::Assistant => "Assistant",
                };
                format!("{who}: {}\n", turn.content)
            })
            .collect();

        let request = CompletionRequest::new(
            REWRITE_SYSTEM_PROMPT,
            format!("Conversation:\n{transcript}\nLatest query: {query}"),
            256,
        )
        .with_model(self.config.rewrite_model.clone());

        match timed(self.call_timeout, "query rewrite", self.llm.complete(request)).await {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    query.to_string()
                } else {
                    debug!(original = %query, rewritten = %rewritten, "query rewritten");
                    rewritten.to_string()
                }
            }
            Err(err) => {
                warn!(error = %err, "contextual rewrite failed, keeping original query");
                query.to_string()
            }
        }
    }

    /// Generate a hypothetical answer passage for `query` and embed it.
    /// Returns `None` on any failure so the caller can fall back to plain
    /// search.
    pub async fn hypothetical(&self, query: &str) -> Option<HypotheticalDocument> {
        let request = CompletionRequest::new(HYDE_SYSTEM_PROMPT, query.to_string(), 512)
            .with_model(self.config.hyde_model.clone());

        let passage =
            match timed(self.call_timeout, "hyde generation", self.llm.complete(request)).await {
                Ok(text) => text.trim().to_string(),
                Err(err) => {
                    warn!(error = %err, "hyde generation failed");
                    return None;
                }
            };

        if passage.is_empty() {
            warn!("hyde generation returned empty passage");
            return None;
        }

        match timed(
            self.call_timeout,
            "hyde embedding",
            self.embedder.embed(&passage),
        )
        .await
        {
            Ok(embedding) => {
                debug!(chars = passage.len(), "hyde passage embedded");
                Some(HypotheticalDocument { passage, embedding })
            }
            Err(err) => {
                warn!(error = %err, "hyde embedding failed");
                None
            }
        }
    }
}

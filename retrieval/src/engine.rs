//! The retrieval orchestrator.
//!
//! Composes the pipeline stages in fixed order, each independently
//! feature-gated:
//!
//! 1. contextual rewrite
//! 2. cache lookup, keyed on the rewritten query's embedding — a hit still
//!    goes through reranking and gap filling before returning
//! 3. HyDE-seeded or plain hybrid search
//! 4. reranking (or pass-through)
//! 5. cache store of the hybrid result set
//! 6. gap filling
//!
//! The whole body runs inside a failure boundary: any error that escapes a
//! stage falls back to one plain hybrid search with the *original,
//! unrewritten* query, and if that also fails, to an empty result set.
//! Callers only ever see an error for invalid input (empty query or empty
//! scope), rejected synchronously before any work starts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use recall_core::{
    CacheBackend, Embedding, EntityGraph, InMemoryCacheBackend, KeywordIndex, RankedCandidate,
    VectorIndex,
};
use recall_embeddings::EmbeddingProvider;
use recall_llm::CompletionProvider;

use crate::cache::RetrievalCache;
use crate::config::PipelineConfig;
use crate::error::{timed, Result, RetrievalError};
use crate::gap::GapFiller;
use crate::hybrid::{HybridSearcher, SearchRequest};
use crate::rerank::Reranker;
use crate::rewrite::{ChatTurn, QueryRewriter};

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// The raw user query.
    pub query: String,

    /// Owner scope restriction.
    pub scope: Option<String>,

    /// Recent conversation history, oldest first; feeds the contextual
    /// rewrite.
    pub history: Vec<ChatTurn>,

    /// Per-request result limit; `None` uses the configured default.
    pub limit: Option<usize>,

    /// Keep only memories created at or after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Keep only memories created at or before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl RetrievalRequest {
    /// Create a request with no scope, history, or bounds.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: None,
            history: Vec::new(),
            limit: None,
            since: None,
            until: None,
        }
    }

    /// Restrict results to one owner.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Attach conversation history for the contextual rewrite.
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// Override the configured result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply temporal bounds.
    pub fn with_time_range(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

/// Per-request bookkeeping, reported alongside the results and then
/// discarded; never persisted.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The query that actually drove retrieval (after rewrite).
    pub effective_query: String,

    /// Whether the result set came from the cache.
    pub cached: bool,

    /// Follow-up retrieval rounds executed by the gap filler.
    pub steps_executed: usize,

    /// Follow-up queries the gap filler issued.
    pub follow_up_queries: Vec<String>,
}

/// Results plus run bookkeeping.
#[derive(Debug)]
pub struct RetrievalOutcome {
    /// Final ranked candidates.
    pub results: Vec<RankedCandidate>,

    /// What the pipeline did to produce them.
    pub run: PipelineRun,
}

/// The assembled retrieval pipeline.
pub struct RetrievalPipeline {
    config: PipelineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    searcher: Arc<HybridSearcher>,
    rewriter: QueryRewriter,
    reranker: Arc<Reranker>,
    cache: RetrievalCache,
    gap_filler: GapFiller,
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetrievalPipeline {
    /// Start assembling a pipeline.
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::new()
    }

    /// Run retrieval for `request`.
    ///
    /// Only input errors surface as `Err`; every dependency failure is
    /// absorbed by the fallback ladder and the worst case is an empty
    /// result set with `steps_executed = 0`.
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalOutcome> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if matches!(request.scope.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(RetrievalError::InvalidScope);
        }

        match self.run_pipeline(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(error = %err, "pipeline failed, falling back to plain search");
                Ok(self.fallback(&request).await)
            }
        }
    }

    /// Invalidate cached result sets matching the `*`-wildcard `pattern`.
    pub async fn invalidate_cache(&self, pattern: &str) -> u64 {
        self.cache.invalidate(pattern).await
    }

    /// Snapshot of the cache hit/miss counters.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    async fn run_pipeline(&self, request: &RetrievalRequest) -> Result<RetrievalOutcome> {
        let limit = request.limit.unwrap_or(self.config.limit);
        let scope = request.scope.as_deref();

        // Stage 1: contextual rewrite. Degrades internally to the
        // original query.
        let effective_query = if self.config.rewrite.enabled {
            self.rewriter
                .contextualize(&request.query, &request.history)
                .await
        } else {
            request.query.clone()
        };

        // Stage 2: cache lookup, keyed on the rewritten query's
        // embedding. The embedding is kept for the store after search.
        let mut query_embedding: Option<Embedding> = None;
        if self.config.cache.enabled {
            let embedding = timed(
                self.config.call_timeout,
                "cache key embedding",
                self.embedder.embed(&effective_query),
            )
            .await?;

            if let Some(entry) = self.cache.lookup(&embedding).await {
                debug!(candidates = entry.candidates.len(), "serving cached result set");
                let results = self.reranker.apply(&effective_query, entry.candidates).await;
                let (results, steps_executed, follow_up_queries) =
                    self.maybe_gap_fill(&effective_query, results, scope, limit).await;
                return Ok(RetrievalOutcome {
                    results,
                    run: PipelineRun {
                        effective_query,
                        cached: true,
                        steps_executed,
                        follow_up_queries,
                    },
                });
            }
            query_embedding = Some(embedding);
        }

        // Stage 3: HyDE. Degrades internally to `None`, in which case
        // vector search embeds (or reuses) the query itself.
        let seed_embedding = if self.config.rewrite.hyde_enabled {
            self.rewriter
                .hypothetical(&effective_query)
                .await
                .map(|doc| doc.embedding)
        } else {
            None
        };

        // Stage 4: hybrid search. The mandatory embedding failure inside
        // is the only stage error that reaches the outer boundary.
        let mut search_request = SearchRequest::new(effective_query.clone(), limit)
            .with_scope(scope.map(str::to_string))
            .with_time_range(request.since, request.until);
        if let Some(seed) = seed_embedding.or_else(|| query_embedding.clone()) {
            search_request = search_request.with_seed_embedding(seed);
        }
        let candidates = self.searcher.search(&search_request).await?;

        // Stage 5: rerank (or pass through with neutral scores).
        let results = self
            .reranker
            .apply(&effective_query, candidates.clone())
            .await;

        // Stage 6: remember the hybrid result set for the next caller.
        if let Some(embedding) = &query_embedding {
            self.cache.store(embedding, &candidates).await;
        }

        // Stage 7: gap filling.
        let (results, steps_executed, follow_up_queries) =
            self.maybe_gap_fill(&effective_query, results, scope, limit).await;

        info!(
            results = results.len(),
            steps_executed,
            cached = false,
            "retrieval complete"
        );

        Ok(RetrievalOutcome {
            results,
            run: PipelineRun {
                effective_query,
                cached: false,
                steps_executed,
                follow_up_queries,
            },
        })
    }

    async fn maybe_gap_fill(
        &self,
        query: &str,
        results: Vec<RankedCandidate>,
        scope: Option<&str>,
        limit: usize,
    ) -> (Vec<RankedCandidate>, usize, Vec<String>) {
        if !self.config.multi_step.enabled {
            return (results, 0, Vec::new());
        }
        let outcome = self.gap_filler.fill(query, results, scope, limit).await;
        (
            outcome.results,
            outcome.steps_executed,
            outcome.follow_up_queries,
        )
    }

    /// Last-resort path: one plain hybrid search with the original,
    /// unrewritten query; an empty result set if even that fails.
    async fn fallback(&self, request: &RetrievalRequest) -> RetrievalOutcome {
        let limit = request.limit.unwrap_or(self.config.limit);
        let search_request = SearchRequest::new(request.query.clone(), limit)
            .with_scope(request.scope.clone())
            .with_time_range(request.since, request.until);

        let results = match self.searcher.search(&search_request).await {
            Ok(candidates) => Reranker::pass_through(candidates),
            Err(err) => {
                warn!(error = %err, "fallback search failed, returning empty result set");
                Vec::new()
            }
        };

        RetrievalOutcome {
            results,
            run: PipelineRun {
                effective_query: request.query.clone(),
                cached: false,
                steps_executed: 0,
                follow_up_queries: Vec::new(),
            },
        }
    }
}

/// Builder for [`RetrievalPipeline`].
pub struct RetrievalPipelineBuilder {
    config: PipelineConfig,
    vector: Option<Arc<dyn VectorIndex>>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    graph: Option<Arc<dyn EntityGraph>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn CompletionProvider>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
}

impl RetrievalPipelineBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            vector: None,
            keyword: None,
            graph: None,
            embedder: None,
            llm: None,
            cache_backend: None,
        }
    }

    /// Set the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the vector index handle.
    pub fn with_vector_index(mut self, vector: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Set the keyword index handle.
    pub fn with_keyword_index(mut self, keyword: Arc<dyn KeywordIndex>) -> Self {
        self.keyword = Some(keyword);
        self
    }

    /// Set the entity graph handle.
    pub fn with_entity_graph(mut self, graph: Arc<dyn EntityGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Set the embedding provider.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the LLM completion provider.
    pub fn with_completions(mut self, llm: Arc<dyn CompletionProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the cache backend. Defaults to an in-process backend when the
    /// cache is enabled but no backend was supplied.
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Assemble the pipeline.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let missing = |what: &str| RetrievalError::Config(format!("{what} not provided"));

        let vector = self.vector.ok_or_else(|| missing("vector index"))?;
        let keyword = self.keyword.ok_or_else(|| missing("keyword index"))?;
        let graph = self.graph.ok_or_else(|| missing("entity graph"))?;
        let embedder = self.embedder.ok_or_else(|| missing("embedding provider"))?;
        let llm = self.llm.ok_or_else(|| missing("completion provider"))?;
        let cache_backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(InMemoryCacheBackend::new()));

        let config = self.config;
        let searcher = Arc::new(HybridSearcher::new(
            vector,
            keyword,
            graph,
            embedder.clone(),
            config.search.clone(),
            config.call_timeout,
        ));
        let reranker = Arc::new(Reranker::new(
            llm.clone(),
            config.rerank.clone(),
            config.call_timeout,
        ));
        let rewriter = QueryRewriter::new(
            llm.clone(),
            embedder.clone(),
            config.rewrite.clone(),
            config.call_timeout,
        );
        let cache = RetrievalCache::new(cache_backend, config.cache.ttl, config.call_timeout);
        let gap_filler = GapFiller::new(
            llm,
            searcher.clone(),
            reranker.clone(),
            config.multi_step.clone(),
            config.call_timeout,
        );

        Ok(RetrievalPipeline {
            config,
            embedder,
            searcher,
            rewriter,
            reranker,
            cache,
            gap_filler,
        })
    }
}

impl Default for RetrievalPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

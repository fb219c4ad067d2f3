//! Hybrid search: vector + keyword + graph strategies fused via RRF.
//!
//! The three strategies run as one concurrent join group; merging happens
//! single-threaded after the join, so ordering never depends on task
//! arrival order. When the same memory id is surfaced by several
//! strategies, the candidate object from the highest-priority strategy
//! wins hydration (vector, then keyword, then graph) — which is why
//! `similarity` is only ever populated on vector hits and `keyword_rank`
//! on keyword hits.
//!
//! Failure semantics: the query-embedding call is the single mandatory
//! dependency — without a vector we cannot run vector search at all and
//! the whole search fails. Each strategy call, however, degrades
//! individually: a failed or timed-out strategy contributes an empty list
//! and the fusion runs over the survivors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use recall_core::{
    Candidate, Embedding, EntityGraph, KeywordIndex, MemoryRecord, StoreError, VectorIndex,
};
use recall_embeddings::EmbeddingProvider;

use crate::config::SearchConfig;
use crate::error::{timed, Result};
use crate::fusion;

/// Over-fetch multiplier applied to the vector and keyword strategies so
/// fusion has a deeper pool than the final result size.
const OVER_FETCH: usize = 2;

/// A hybrid search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The query text (keyword search always uses this verbatim).
    pub query: String,

    /// Owner scope restriction.
    pub scope: Option<String>,

    /// Maximum candidates returned after fusion.
    pub limit: usize,

    /// Keep only memories created at or after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Keep only memories created at or before this instant.
    pub until: Option<DateTime<Utc>>,

    /// Embedding to use for vector search instead of embedding the query
    /// text (the HyDE path sets this).
    pub seed_embedding: Option<Embedding>,
}

impl SearchRequest {
    /// Create a request with no scope or temporal bounds.
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            scope: None,
            limit,
            since: None,
            until: None,
            seed_embedding: None,
        }
    }

    /// Restrict results to one owner.
    pub fn with_scope(mut self, scope: impl Into<Option<String>>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Seed vector search with a precomputed embedding.
    pub fn with_seed_embedding(mut self, embedding: Embedding) -> Self {
        self.seed_embedding = Some(embedding);
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

/// Hybrid searcher over the three datastore strategies.
pub struct HybridSearcher {
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    graph: Arc<dyn EntityGraph>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
    call_timeout: Duration,
}

impl HybridSearcher {
    /// Create a searcher over the injected store handles.
    pub fn new(
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
        graph: Arc<dyn EntityGraph>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            vector,
            keyword,
            graph,
            embedder,
            config,
            call_timeout,
        }
    }

    /// Run hybrid search and return candidates sorted by fused score
    /// descending, truncated to `request.limit`.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>> {
        let &SearchConfig {
            vector_enabled,
            keyword_enabled,
            graph_enabled,
            rrf_k,
            graph_entity_limit,
        } = &self.config;

        if !vector_enabled && !keyword_enabled && !graph_enabled {
            return Ok(Vec::new());
        }

        let over_fetch = request.limit * OVER_FETCH;
        let scope = request.scope.as_deref();

        // Vector search cannot proceed without an embedding; this is the
        // one failure that fails the whole search.
        let query_embedding = if vector_enabled {
            match &request.seed_embedding {
                Some(seed) => Some(seed.clone()),
                None => Some(
                    timed(
                        self.call_timeout,
                        "query embedding",
                        self.embedder.embed(&request.query),
                    )
                    .await?,
                ),
            }
        } else {
            None
        };

        let (vector_hits, keyword_hits, graph_hits) = tokio::join!(
            self.vector_strategy(query_embedding.as_deref(), scope, over_fetch),
            self.keyword_strategy(keyword_enabled, &request.query, scope, over_fetch),
            self.graph_strategy(
                graph_enabled,
                &request.query,
                scope,
                graph_entity_limit,
                request.limit
            ),
        );

        // Ranked id lists in strategy priority order; the hydration map
        // keeps the first candidate seen for each id.
        let mut lists: Vec<Vec<String>> = Vec::with_capacity(3);
        let mut hydrated: HashMap<String, Candidate> = HashMap::new();
        let mut insertion_order: Vec<String> = Vec::new();

        let mut admit = |candidate: Candidate, list: &mut Vec<String>| {
            list.push(candidate.record.id.clone());
            if !hydrated.contains_key(candidate.id()) {
                insertion_order.push(candidate.record.id.clone());
                hydrated.insert(candidate.record.id.clone(), candidate);
            }
        };

        if let Some(hits) = vector_hits {
            let mut list = Vec::with_capacity(hits.len());
            for hit in hits {
                admit(Candidate::from_vector_hit(hit.record, hit.similarity), &mut list);
            }
            lists.push(list);
        }
        if let Some(hits) = keyword_hits {
            let mut list = Vec::with_capacity(hits.len());
            for hit in hits {
                admit(Candidate::from_keyword_hit(hit.record, hit.rank), &mut list);
            }
            lists.push(list);
        }
        if let Some(records) = graph_hits {
            let mut list = Vec::with_capacity(records.len());
            for record in records {
                admit(Candidate::from_graph_hit(record), &mut list);
            }
            lists.push(list);
        }

        let list_refs: Vec<&[String]> = lists.iter().map(Vec::as_slice).collect();
        let scores = fusion::fuse(&list_refs, rrf_k);

        // Rebuild in first-seen order so the stable sort breaks score ties
        // by strategy priority, never by task arrival order.
        let mut candidates: Vec<Candidate> = insertion_order
            .into_iter()
            .filter_map(|id| {
                let mut candidate = hydrated.remove(&id)?;
                candidate.fused_score = scores.get(&id).copied().unwrap_or(0.0);
                Some(candidate)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Temporal filtering happens after fusion and sorting, so the
        // truncation below still picks the best N within range.
        if request.since.is_some() || request.until.is_some() {
            candidates.retain(|c| {
                request.since.is_none_or(|since| c.record.created_at >= since)
                    && request.until.is_none_or(|until| c.record.created_at <= until)
            });
        }

        candidates.truncate(request.limit);

        debug!(
            query = %request.query,
            results = candidates.len(),
            "hybrid search complete"
        );
        Ok(candidates)
    }

    async fn vector_strategy(
        &self,
        embedding: Option<&[f32]>,
        scope: Option<&str>,
        limit: usize,
    ) -> Option<Vec<recall_core::VectorHit>> {
        let embedding = embedding?;
        match timed(
            self.call_timeout,
            "vector search",
            self.vector.query_vector(embedding, scope, limit),
        )
        .await
        {
            Ok(hits) => Some(hits),
            Err(err) => {
                warn!(error = %err, "vector strategy degraded to empty");
                Some(Vec::new())
            }
        }
    }

    async fn keyword_strategy(
        &self,
        enabled: bool,
        query: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Option<Vec<recall_core::KeywordHit>> {
        if !enabled {
            return None;
        }
        match timed(
            self.call_timeout,
            "keyword search",
            self.keyword.query_text(query, scope, limit),
        )
        .await
        {
            Ok(hits) => Some(hits),
            Err(err) => {
                warn!(error = %err, "keyword strategy degraded to empty");
                Some(Vec::new())
            }
        }
    }

    async fn graph_strategy(
        &self,
        enabled: bool,
        query: &str,
        scope: Option<&str>,
        entity_limit: usize,
        limit: usize,
    ) -> Option<Vec<MemoryRecord>> {
        if !enabled {
            return None;
        }
        match self
            .graph_lookup(query, scope, entity_limit, limit)
            .await
        {
            Ok(records) => Some(records),
            Err(err) => {
                warn!(error = %err, "graph strategy degraded to empty");
                Some(Vec::new())
            }
        }
    }

    /// Two-step graph expansion: match entities by name, then fetch
    /// memories mentioning any matched entity. Relevance is binary, so the
    /// store's response order is the ranked order.
    async fn graph_lookup(
        &self,
        query: &str,
        scope: Option<&str>,
        entity_limit: usize,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryRecord>, StoreError> {
        let entities = match tokio::time::timeout(
            self.call_timeout,
            self.graph.find_entities(query, scope, entity_limit),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Unavailable(
                    "entity lookup timed out".to_string(),
                ))
            }
        };

        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<String> = entities.into_iter().map(|e| e.name).collect();
        match tokio::time::timeout(
            self.call_timeout,
            self.graph.find_memories_mentioning(&names, scope, limit),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(
                "mention lookup timed out".to_string(),
            )),
        }
    }
}

//! Configuration for the retrieval pipeline.
//!
//! Every optional stage is feature-gated here. The orchestrator reads the
//! configuration once per call and threads it through the stages
//! explicitly; leaf components never consult ambient environment state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of results returned to the caller.
    pub limit: usize,

    /// Hybrid search strategy toggles and fusion constant.
    pub search: SearchConfig,

    /// Query rewriting (contextual rewrite + HyDE).
    pub rewrite: RewriteConfig,

    /// Cross-encoder reranking.
    pub rerank: RerankConfig,

    /// Result caching.
    pub cache: CacheConfig,

    /// Multi-step gap filling.
    pub multi_step: MultiStepConfig,

    /// Timeout applied to every external call (embedding, LLM, datastore,
    /// cache). A timed-out call is treated exactly like a failed one.
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
}

impl PipelineConfig {
    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Disable every optional stage, leaving plain hybrid search.
    pub fn minimal() -> Self {
        Self {
            rewrite: RewriteConfig {
                enabled: false,
                hyde_enabled: false,
                ..RewriteConfig::default()
            },
            rerank: RerankConfig {
                enabled: false,
                ..RerankConfig::default()
            },
            cache: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            multi_step: MultiStepConfig {
                enabled: false,
                ..MultiStepConfig::default()
            },
            ..Self::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            search: SearchConfig::default(),
            rewrite: RewriteConfig::default(),
            rerank: RerankConfig::default(),
            cache: CacheConfig::default(),
            multi_step: MultiStepConfig::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Hybrid search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Enable the vector similarity strategy.
    pub vector_enabled: bool,

    /// Enable the keyword (full-text) strategy.
    pub keyword_enabled: bool,

    /// Enable the graph expansion strategy.
    pub graph_enabled: bool,

    /// RRF smoothing constant.
    pub rrf_k: f64,

    /// Maximum graph entities matched per query.
    pub graph_entity_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_enabled: true,
            keyword_enabled: true,
            graph_enabled: true,
            rrf_k: 60.0,
            graph_entity_limit: 5,
        }
    }
}

/// Query rewriting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Enable the contextual rewrite of conversational queries.
    pub enabled: bool,

    /// Enable hypothetical document embedding for vector search.
    pub hyde_enabled: bool,

    /// How many trailing history turns feed the rewrite prompt.
    pub history_window: usize,

    /// Model override for the rewrite call.
    pub rewrite_model: Option<String>,

    /// Model override for the HyDE call.
    pub hyde_model: Option<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hyde_enabled: false,
            history_window: 4,
            rewrite_model: None,
            hyde_model: None,
        }
    }
}

/// Reranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Enable LLM-judge reranking.
    pub enabled: bool,

    /// Drop candidates scoring below this threshold.
    pub min_score: Option<f32>,

    /// Keep at most this many candidates after reranking.
    pub top_k: Option<usize>,

    /// Candidates per judge prompt.
    pub batch_size: usize,

    /// Model override for the judge call.
    pub judge_model: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: None,
            top_k: None,
            batch_size: 5,
            judge_model: None,
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the retrieval result cache.
    pub enabled: bool,

    /// Entry time-to-live.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Multi-step gap filling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStepConfig {
    /// Enable iterative gap filling.
    pub enabled: bool,

    /// Maximum follow-up retrieval rounds.
    pub max_steps: usize,

    /// Model override for the completeness judge.
    pub judge_model: Option<String>,
}

impl Default for MultiStepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_steps: 2,
            judge_model: None,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_knobs() {
        let config = PipelineConfig::default();
        assert_eq!(config.limit, 10);
        assert_eq!(config.search.rrf_k, 60.0);
        assert_eq!(config.search.graph_entity_limit, 5);
        assert_eq!(config.rerank.batch_size, 5);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.multi_step.max_steps, 2);
        assert_eq!(config.rewrite.history_window, 4);
    }

    #[test]
    fn test_minimal_disables_optional_stages() {
        let config = PipelineConfig::minimal();
        assert!(!config.rewrite.enabled);
        assert!(!config.rewrite.hyde_enabled);
        assert!(!config.rerank.enabled);
        assert!(!config.cache.enabled);
        assert!(!config.multi_step.enabled);
        // The search strategies themselves stay on.
        assert!(config.search.vector_enabled);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PipelineConfig::default().with_limit(25);
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.limit, 25);
        assert_eq!(back.call_timeout, config.call_timeout);
    }
}

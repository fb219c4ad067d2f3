//! Value types shared by every retrieval stage.
//!
//! All of these are immutable snapshots: stages rebuild result lists via
//! filter/map/sort instead of mutating candidates in place. The memory
//! `id` is the sole deduplication key across the whole pipeline — once a
//! candidate with a given id enters a result set, later duplicates are
//! discarded, never merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance assigned to memories that were stored without one.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Neutral relevance score used when reranking is skipped or fails.
pub const NEUTRAL_JUDGE_SCORE: f32 = 5.0;

/// Score assigned by the single-candidate rerank shortcut.
pub const SINGLE_CANDIDATE_SCORE: f32 = 10.0;

/// Semantic category of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Facts and knowledge, detached from any single event.
    Semantic,
    /// Events tied to a point in time.
    Episodic,
    /// How-to knowledge and learned procedures.
    Procedural,
}

/// A stored memory row, as returned by any datastore strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque stable identifier, unique per memory.
    pub id: String,

    /// Owner scope, when the memory belongs to a single user.
    pub owner_id: Option<String>,

    /// Semantic category.
    pub kind: MemoryKind,

    /// The memory text.
    pub content: String,

    /// Numeric weight in [0, 1].
    pub importance: f32,

    /// Where the memory came from (channel, tool, ...).
    pub source: Option<String>,

    /// Free-form provenance note.
    pub provenance: Option<String>,

    /// When the memory was stored.
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a record with default importance and no provenance.
    pub fn new(id: impl Into<String>, kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: None,
            kind,
            content: content.into(),
            importance: DEFAULT_IMPORTANCE,
            source: None,
            provenance: None,
            created_at: Utc::now(),
        }
    }

    /// Set the owner scope.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Set the importance weight.
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    /// Set the source tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A retrievable memory surfaced by one of the search strategies.
///
/// `similarity` is populated only for vector hits and `keyword_rank` only
/// for keyword hits; when the same memory is found by several strategies,
/// the copy from the highest-priority strategy (vector, then keyword, then
/// graph) is the one that survives hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// The underlying memory row.
    #[serde(flatten)]
    pub record: MemoryRecord,

    /// Cosine similarity in [0, 1]; vector hits only.
    pub similarity: Option<f32>,

    /// Full-text rank score; keyword hits only.
    pub keyword_rank: Option<f32>,

    /// Combined Reciprocal Rank Fusion score; set by fusion.
    pub fused_score: f64,
}

impl Candidate {
    /// Build a candidate from a vector search hit.
    pub fn from_vector_hit(record: MemoryRecord, similarity: f32) -> Self {
        Self {
            record,
            similarity: Some(similarity),
            keyword_rank: None,
            fused_score: 0.0,
        }
    }

    /// Build a candidate from a keyword search hit.
    pub fn from_keyword_hit(record: MemoryRecord, rank: f32) -> Self {
        Self {
            record,
            similarity: None,
            keyword_rank: Some(rank),
            fused_score: 0.0,
        }
    }

    /// Build a candidate from a graph expansion hit (binary relevance, so
    /// no per-strategy score is recorded).
    pub fn from_graph_hit(record: MemoryRecord) -> Self {
        Self {
            record,
            similarity: None,
            keyword_rank: None,
            fused_score: 0.0,
        }
    }

    /// The memory id (the pipeline-wide deduplication key).
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// A candidate plus the relevance score assigned by the reranking judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The fused candidate.
    #[serde(flatten)]
    pub candidate: Candidate,

    /// Judge-assigned relevance in [0, 10].
    pub judge_score: f32,
}

impl RankedCandidate {
    /// Wrap a candidate with an explicit judge score, clamped to [0, 10].
    pub fn new(candidate: Candidate, judge_score: f32) -> Self {
        let judge_score = if judge_score.is_finite() {
            judge_score.clamp(0.0, 10.0)
        } else {
            NEUTRAL_JUDGE_SCORE
        };
        Self {
            candidate,
            judge_score,
        }
    }

    /// Wrap a candidate that was never judged (reranking disabled or
    /// degraded); carries the neutral mid-scale score.
    pub fn unranked(candidate: Candidate) -> Self {
        Self {
            candidate,
            judge_score: NEUTRAL_JUDGE_SCORE,
        }
    }

    /// The memory id.
    pub fn id(&self) -> &str {
        self.candidate.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> MemoryRecord {
        MemoryRecord::new(id, MemoryKind::Semantic, "content")
    }

    #[test]
    fn test_vector_hit_populates_similarity_only() {
        let c = Candidate::from_vector_hit(record("m1"), 0.87);
        assert_eq!(c.similarity, Some(0.87));
        assert_eq!(c.keyword_rank, None);
    }

    #[test]
    fn test_keyword_hit_populates_rank_only() {
        let c = Candidate::from_keyword_hit(record("m2"), 3.2);
        assert_eq!(c.similarity, None);
        assert_eq!(c.keyword_rank, Some(3.2));
    }

    #[test]
    fn test_ranked_candidate_clamps_scores() {
        let c = Candidate::from_graph_hit(record("m3"));
        assert_eq!(RankedCandidate::new(c.clone(), 14.0).judge_score, 10.0);
        assert_eq!(RankedCandidate::new(c.clone(), -2.0).judge_score, 0.0);
        assert_eq!(
            RankedCandidate::new(c, f32::NAN).judge_score,
            NEUTRAL_JUDGE_SCORE
        );
    }

    #[test]
    fn test_unranked_carries_neutral_score() {
        let c = Candidate::from_graph_hit(record("m4"));
        assert_eq!(RankedCandidate::unranked(c).judge_score, NEUTRAL_JUDGE_SCORE);
    }

    #[test]
    fn test_record_builder_defaults() {
        let r = record("m5").with_owner("u1").with_source("chat");
        assert_eq!(r.importance, DEFAULT_IMPORTANCE);
        assert_eq!(r.owner_id.as_deref(), Some("u1"));
        assert_eq!(r.source.as_deref(), Some("chat"));
        assert!(r.provenance.is_none());
    }
}

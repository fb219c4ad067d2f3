//! Cross-encoder reranking via an LLM judge.
//!
//! Candidates are scored in fixed-size batches, one prompt per batch, all
//! batches in flight concurrently. Reranking degrades per batch, never
//! globally: a failed call or unparseable response costs that batch its
//! scores (every item gets the neutral default) but leaves the others
//! untouched.
//!
//! Score parsing is lenient: the judge is asked for a JSON array, but
//! models wrap answers in prose and code fences often enough that we fall
//! back to pulling numeric substrings out of the raw text, in order,
//! truncated to the batch size.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::join_all;
use regex_lite::Regex;
use tracing::{debug, warn};

use recall_core::{Candidate, RankedCandidate, NEUTRAL_JUDGE_SCORE, SINGLE_CANDIDATE_SCORE};
use recall_llm::{CompletionProvider, CompletionRequest};

use crate::config::RerankConfig;
use crate::error::timed;

const JUDGE_SYSTEM_PROMPT: &str = "You are a relevance judge. Rate how relevant each passage \
    is to the query on a 0-10 scale. Respond with a JSON array of numbers, one per passage, in \
    input order. Respond with the array only.";

/// LLM-backed reranker.
pub struct Reranker {
    llm: Arc<dyn CompletionProvider>,
    config: RerankConfig,
    call_timeout: Duration,
}

impl Reranker {
    /// Create a reranker over the injected provider.
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        config: RerankConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            config,
            call_timeout,
        }
    }

    /// Score candidates against `query`, filter by `min_score`, sort by
    /// judge score descending, and truncate to `top_k`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        min_score: Option<f32>,
        top_k: Option<usize>,
    ) -> Vec<RankedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        // A single candidate has nothing to rank against; skip the LLM
        // call. Its 10 is distinct from the neutral 5 assigned when
        // reranking is skipped or degraded.
        if candidates.len() == 1 {
            return candidates
                .into_iter()
                .map(|c| RankedCandidate::new(c, SINGLE_CANDIDATE_SCORE))
                .collect();
        }

        let batch_size = self.config.batch_size.max(1);
        let batches: Vec<&[Candidate]> = candidates.chunks(batch_size).collect();
        let score_futures = batches.iter().map(|batch| self.score_batch(query, batch));
        let batch_scores = join_all(score_futures).await;

        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .cloned()
            .zip(batch_scores.into_iter().flatten())
            .map(|(candidate, score)| RankedCandidate::new(candidate, score))
            .collect();

        if let Some(threshold) = min_score {
            ranked.retain(|r| r.judge_score >= threshold);
        }

        ranked.sort_by(|a, b| {
            b.judge_score
                .partial_cmp(&a.judge_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(top_k) = top_k {
            ranked.truncate(top_k);
        }

        debug!(results = ranked.len(), "reranking complete");
        ranked
    }

    /// Apply the configured reranking policy: judge scoring with the
    /// configured threshold and truncation when enabled, pass-through
    /// otherwise.
    pub async fn apply(&self, query: &str, candidates: Vec<Candidate>) -> Vec<RankedCandidate> {
        if !self.config.enabled {
            return Self::pass_through(candidates);
        }
        self.rerank(query, candidates, self.config.min_score, self.config.top_k)
            .await
    }

    /// Pass candidates through unjudged, carrying the neutral score. Used
    /// when reranking is disabled; applies no filtering or reordering.
    pub fn pass_through(candidates: Vec<Candidate>) -> Vec<RankedCandidate> {
        candidates.into_iter().map(RankedCandidate::unranked).collect()
    }

    /// Score one batch; always returns exactly `batch.len()` values.
    async fn score_batch(&self, query: &str, batch: &[Candidate]) -> Vec<f32> {
        let mut prompt = format!("Query: {query}\n");
        for (i, candidate) in batch.iter().enumerate() {
            prompt.push_str(&format!("\nPassage {}: {}", i + 1, candidate.record.content));
        }

        let request = CompletionRequest::new(JUDGE_SYSTEM_PROMPT, prompt, 128)
            .with_model(self.config.judge_model.clone());

        match timed(self.call_timeout, "rerank judge", self.llm.complete(request)).await {
            Ok(response) => parse_scores(&response, batch.len()),
            Err(err) => {
                warn!(error = %err, batch = batch.len(), "judge call failed, using neutral scores");
                vec![NEUTRAL_JUDGE_SCORE; batch.len()]
            }
        }
    }
}

/// Parse judge output into exactly `expected` scores.
///
/// Strict JSON array first; then numeric-substring extraction in input
/// order; short results are padded with the neutral default. Values are
/// clamped to [0, 10] and non-finite values replaced with the neutral
/// default by [`RankedCandidate::new`]'s invariant, mirrored here.
fn parse_scores(response: &str, expected: usize) -> Vec<f32> {
    let cleaned = strip_code_fences(response);

    let mut values: Vec<f32> = serde_json::from_str::<Vec<f64>>(cleaned.trim())
        .map(|parsed| parsed.into_iter().map(|v| v as f32).collect())
        .unwrap_or_else(|_| extract_numbers(&cleaned, expected));

    values.truncate(expected);
    while values.len() < expected {
        values.push(NEUTRAL_JUDGE_SCORE);
    }

    values
        .into_iter()
        .map(|v| {
            if v.is_finite() {
                v.clamp(0.0, 10.0)
            } else {
                NEUTRAL_JUDGE_SCORE
            }
        })
        .collect()
}

/// Pull numeric substrings out of free-form text, in order.
fn extract_numbers(text: &str, limit: usize) -> Vec<f32> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = NUMBER
        .get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    re.find_iter(text)
        .take(limit)
        .filter_map(|m| m.as_str().parse::<f32>().ok())
        .collect()
}

/// Drop Markdown code fences, keeping their contents.
fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_strict_json_array() {
        assert_eq!(parse_scores("[8, 3.5, 0]", 3), vec![8.0, 3.5, 0.0]);
    }

    #[test]
    fn test_parse_json_in_code_fence() {
        let response = "```json\n[7, 2]\n```";
        assert_eq!(parse_scores(response, 2), vec![7.0, 2.0]);
    }

    #[test]
    fn test_parse_falls_back_to_numeric_extraction() {
        let response = "Passage 1 scores 8.5, passage 2 scores 3.";
        // The leading "1" and "2" of "Passage N" are numbers too: the
        // extractor takes values in order, truncated to the batch size.
        assert_eq!(parse_scores(response, 2), vec![1.0, 8.5]);
    }

    #[test]
    fn test_parse_plain_number_list() {
        assert_eq!(parse_scores("8 6 10", 3), vec![8.0, 6.0, 10.0]);
    }

    #[test]
    fn test_parse_garbage_yields_neutral_defaults() {
        assert_eq!(
            parse_scores("no scores here", 3),
            vec![NEUTRAL_JUDGE_SCORE; 3]
        );
    }

    #[test]
    fn test_parse_pads_short_results() {
        assert_eq!(
            parse_scores("[9]", 3),
            vec![9.0, NEUTRAL_JUDGE_SCORE, NEUTRAL_JUDGE_SCORE]
        );
    }

    #[test]
    fn test_parse_clamps_out_of_range() {
        assert_eq!(parse_scores("[15, -3]", 2), vec![10.0, 0.0]);
    }

    #[test]
    fn test_parse_truncates_extra_values() {
        assert_eq!(parse_scores("[1, 2, 3, 4]", 2), vec![1.0, 2.0]);
    }

    #[test]
    fn test_strip_code_fences_keeps_plain_text() {
        assert_eq!(strip_code_fences("[1, 2]"), "[1, 2]");
    }
}

//! Multi-step retrieval: detect gaps, fill them with follow-up rounds.
//!
//! State machine per iteration: EVALUATING → DONE when the judge reports
//! the context complete (or offers no follow-ups, or fails) — otherwise
//! RETRIEVING → MERGING → EVALUATING again, bounded by the configured step
//! cap. A failed or unparseable judge is treated as "complete with no
//! gaps" so it can never cause an infinite loop or spurious retrieval.
//!
//! Follow-up queries within one step run in parallel; their results merge
//! into the accumulated set in follow-up order (never task arrival order),
//! first occurrence of an id wins.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use recall_core::RankedCandidate;
use recall_llm::{CompletionProvider, CompletionRequest};

use crate::config::MultiStepConfig;
use crate::error::timed;
use crate::hybrid::{HybridSearcher, SearchRequest};
use crate::rerank::Reranker;

/// Upper bound on follow-up queries per evaluation.
const MAX_FOLLOW_UPS: usize = 2;

const JUDGE_SYSTEM_PROMPT: &str = "You judge whether retrieved context fully answers a query. \
    Respond with a JSON object: {\"complete\": boolean, \"gaps\": [strings], \"followUps\": \
    [strings]}. List at most 2 followUps, phrased as standalone search queries targeting the \
    gaps. Respond with the JSON object only.";

/// The completeness judge's assessment of a context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessVerdict {
    /// Whether the context fully answers the query.
    #[serde(default)]
    pub complete: bool,

    /// What is missing, in the judge's words.
    #[serde(default)]
    pub gaps: Vec<String>,

    /// Standalone queries that would fill the gaps (at most 2 kept).
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

impl CompletenessVerdict {
    /// The verdict used when the judge fails: complete, no gaps.
    fn assume_complete() -> Self {
        Self {
            complete: true,
            gaps: Vec::new(),
            follow_ups: Vec::new(),
        }
    }
}

/// Result of a gap-filling run.
#[derive(Debug)]
pub struct GapFillOutcome {
    /// The merged, re-sorted result set.
    pub results: Vec<RankedCandidate>,

    /// How many follow-up retrieval rounds ran.
    pub steps_executed: usize,

    /// Every follow-up query that was issued, in order.
    pub follow_up_queries: Vec<String>,
}

/// Iterative gap filler over hybrid search and reranking.
pub struct GapFiller {
    llm: Arc<dyn CompletionProvider>,
    searcher: Arc<HybridSearcher>,
    reranker: Arc<Reranker>,
    config: MultiStepConfig,
    call_timeout: Duration,
}

impl GapFiller {
    /// Create a gap filler over the injected components.
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        searcher: Arc<HybridSearcher>,
        reranker: Arc<Reranker>,
        config: MultiStepConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            searcher,
            reranker,
            config,
            call_timeout,
        }
    }

    /// Evaluate whether `initial` answers `query`; if not, run bounded
    /// follow-up retrieval rounds and merge the new candidates in.
    pub async fn fill(
        &self,
        query: &str,
        initial: Vec<RankedCandidate>,
        scope: Option<&str>,
        limit: usize,
    ) -> GapFillOutcome {
        let mut results = initial;
        let mut seen: HashSet<String> = results.iter().map(|r| r.id().to_string()).collect();
        let mut steps_executed = 0;
        let mut follow_up_queries: Vec<String> = Vec::new();

        while steps_executed < self.config.max_steps {
            let context: String = results
                .iter()
                .map(|r| r.candidate.record.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            let verdict = self.evaluate(query, &context).await;
            if verdict.complete {
                debug!(steps_executed, "context judged complete");
                break;
            }
            if verdict.follow_ups.is_empty() {
                debug!(steps_executed, "incomplete but no follow-ups, stopping");
                break;
            }

            let rounds = join_all(verdict.follow_ups.iter().map(|follow_up| {
                let request = SearchRequest::new(follow_up.clone(), limit)
                    .with_scope(scope.map(str::to_string));
                async move {
                    match self.searcher.search(&request).await {
                        Ok(candidates) => self.reranker.apply(follow_up, candidates).await,
                        Err(err) => {
                            warn!(error = %err, follow_up = %follow_up, "follow-up search failed");
                            Vec::new()
                        }
                    }
                }
            }))
            .await;

            // Merge in follow-up order; the first candidate with a given
            // id stays, duplicates from later rounds are discarded.
            for round in rounds {
                for ranked in round {
                    if seen.insert(ranked.id().to_string()) {
                        results.push(ranked);
                    }
                }
            }

            follow_up_queries.extend(verdict.follow_ups);
            steps_executed += 1;
        }

        results.sort_by(|a, b| {
            b.judge_score
                .partial_cmp(&a.judge_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        GapFillOutcome {
            results,
            steps_executed,
            follow_up_queries,
        }
    }

    /// Ask the judge whether `context` answers `query`. Any failure —
    /// call, timeout, or parse — yields the assume-complete verdict.
    async fn evaluate(&self, query: &str, context: &str) -> CompletenessVerdict {
        let request = CompletionRequest::new(
            JUDGE_SYSTEM_PROMPT,
            format!("Query: {query}\n\nContext:\n{context}"),
            512,
        )
        .with_model(self.config.judge_model.clone());

        let response = match timed(
            self.call_timeout,
            "completeness judge",
            self.llm.complete(request),
        )
        .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "completeness judge failed, assuming complete");
                return CompletenessVerdict::assume_complete();
            }
        };

        parse_verdict(&response)
    }
}

/// Parse the judge's JSON, tolerating code fences and surrounding prose.
/// Unparseable output degrades to the assume-complete verdict.
fn parse_verdict(response: &str) -> CompletenessVerdict {
    let trimmed = response.trim();

    // Cut the outermost JSON object out of whatever surrounds it.
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    match serde_json::from_str::<CompletenessVerdict>(body) {
        Ok(mut verdict) => {
            verdict.follow_ups.truncate(MAX_FOLLOW_UPS);
            verdict
        }
        Err(err) => {
            warn!(error = %err, "completeness verdict unparseable, assuming complete");
            CompletenessVerdict::assume_complete()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_verdict() {
        let verdict = parse_verdict(
            r#"{"complete": false, "gaps": ["dates"], "followUps": ["when did it ship"]}"#,
        );
        assert!(!verdict.complete);
        assert_eq!(verdict.gaps, vec!["dates"]);
        assert_eq!(verdict.follow_ups, vec!["when did it ship"]);
    }

    #[test]
    fn test_parse_verdict_in_code_fence() {
        let verdict = parse_verdict(
            "```json\n{\"complete\": true, \"gaps\": [], \"followUps\": []}\n```",
        );
        assert!(verdict.complete);
    }

    #[test]
    fn test_parse_caps_follow_ups_at_two() {
        let verdict = parse_verdict(
            r#"{"complete": false, "gaps": [], "followUps": ["a", "b", "c", "d"]}"#,
        );
        assert_eq!(verdict.follow_ups.len(), 2);
        assert_eq!(verdict.follow_ups, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_garbage_assumes_complete() {
        let verdict = parse_verdict("the context looks fine to me");
        assert!(verdict.complete);
        assert!(verdict.gaps.is_empty());
        assert!(verdict.follow_ups.is_empty());
    }

    #[test]
    fn test_parse_missing_fields_default() {
        let verdict = parse_verdict(r#"{"complete": false}"#);
        assert!(!verdict.complete);
        assert!(verdict.follow_ups.is_empty());
    }
}

//! Reciprocal Rank Fusion.
//!
//! Combines ranked lists from heterogeneous strategies into one score per
//! memory id without normalizing the strategies' own scores — cosine
//! similarity and full-text rank are not comparable, but rank position is.
//! An item at zero-based rank `r` in a list contributes `1 / (k + r + 1)`;
//! an item absent from a list contributes nothing from it. Pure function,
//! deterministic, no I/O.

use std::collections::HashMap;

/// Fuse ranked id lists into a combined score per distinct id.
///
/// Each input list must already be sorted best-first by its own strategy.
/// `k` is the smoothing constant (60 by default); larger values flatten
/// the advantage of top ranks.
pub fn fuse(ranked_lists: &[&[String]], k: f64) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for list in ranked_lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += contribution(rank, k);
        }
    }

    scores
}

/// RRF contribution of a single zero-based rank.
#[inline]
pub fn contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64 + 1.0)
}

//! Ranking policies for federated results.
//!
//! Two score families exist and they order in opposite directions:
//!
//! - [`Score::Distance`] (squared L2, lower is better) from `L2` indexes;
//! - [`Score::Similarity`] (inner product, higher is better) from
//!   `InnerProduct` indexes.
//!
//! A [`RankingPolicy`] is chosen per partition family and refuses to order
//! scores from the other family, so raw distances and similarities are never
//! merged into one list.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::Metric;
use crate::models::ScoredPassage;

/// A typed relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Distance(f32),
    Similarity(f32),
}

impl Score {
    pub fn value(self) -> f32 {
        match self {
            Score::Distance(v) | Score::Similarity(v) => v,
        }
    }

    pub fn policy(self) -> RankingPolicy {
        match self {
            Score::Distance(_) => RankingPolicy::Distance,
            Score::Similarity(_) => RankingPolicy::Similarity,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("cannot rank a {found:?} score under the {policy:?} policy")]
    MixedScores {
        policy: RankingPolicy,
        found: RankingPolicy,
    },
}

/// Cut-offs applied to candidates before merging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Distance candidates above this are discarded.
    pub max_distance: f32,
    /// Similarity candidates below this are discarded.
    pub min_similarity: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_distance: 2.0,
            min_similarity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Ascending distance.
    Distance,
    /// Descending similarity.
    Similarity,
}

impl RankingPolicy {
    pub fn for_metric(metric: Metric) -> Self {
        match metric {
            Metric::L2 => RankingPolicy::Distance,
            Metric::InnerProduct => RankingPolicy::Similarity,
        }
    }

    /// Whether a score survives the threshold for this policy. Scores of the
    /// other family never do.
    pub fn admits(self, score: Score, thresholds: &Thresholds) -> bool {
        match (self, score) {
            (RankingPolicy::Distance, Score::Distance(d)) => d <= thresholds.max_distance,
            (RankingPolicy::Similarity, Score::Similarity(s)) => s >= thresholds.min_similarity,
            _ => false,
        }
    }

    /// Order two scores best-first.
    pub fn compare(self, a: Score, b: Score) -> Result<Ordering, RankError> {
        self.check(a)?;
        self.check(b)?;
        Ok(match self {
            RankingPolicy::Distance => a.value().total_cmp(&b.value()),
            RankingPolicy::Similarity => b.value().total_cmp(&a.value()),
        })
    }

    fn check(self, score: Score) -> Result<(), RankError> {
        if score.policy() == self {
            Ok(())
        } else {
            Err(RankError::MixedScores {
                policy: self,
                found: score.policy(),
            })
        }
    }
}

/// Merge candidates from many documents into one best-first list of at most
/// `top_k` passages.
///
/// Ties are broken by document id, then chunk index, so output is
/// deterministic.
pub fn merge_ranked(
    policy: RankingPolicy,
    mut candidates: Vec<ScoredPassage>,
    top_k: usize,
) -> Result<Vec<ScoredPassage>, RankError> {
    for c in &candidates {
        policy.check(c.score)?;
    }

    candidates.sort_by(|a, b| {
        policy
            .compare(a.score, b.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    candidates.truncate(top_k);

    Ok(candidates)
}

use rand::{Rng, RngCore};
use std::collections::HashSet;

use crate::{
    models::{CatalogItem, RecommendationReasoning},
    services::providers::{CandidateOrdering, CandidateQuery},
};

/// Candidates scored per requested recommendation before scoring stops
pub const SCORING_BUDGET_FACTOR: usize = 3;
/// Size of the top-ranked window, per requested recommendation
pub const SELECTION_WINDOW_FACTOR: usize = 2;
/// Floor applied to scores when used as sampling weights
pub const MIN_SELECTION_WEIGHT: f64 = 0.1;

/// A catalog item together with its scoring outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub item: CatalogItem,
    pub reasoning: RecommendationReasoning,
}

impl ScoredCandidate {
    pub fn score(&self) -> f64 {
        self.reasoning.final_score
    }
}

/// Pulls a bounded, randomly ordered pool of candidates
#[derive(Debug, Clone, Copy)]
pub struct CandidateSampler {
    pub pool_size: usize,
}

impl Default for CandidateSampler {
    fn default() -> Self {
        Self { pool_size: 100 }
    }
}

impl CandidateSampler {
    pub fn new(pool_size: usize) -> Self {
        Self { pool_size }
    }

    /// Catalog query for this call with a randomly chosen ordering
    pub fn query<R: Rng + ?Sized>(&self, rng: &mut R) -> CandidateQuery {
        CandidateQuery::new(self.pool_size, CandidateOrdering::pick(rng))
    }

    /// Drops inconsistent or duplicate records and caps the batch at the scoring budget
    pub fn eligible(&self, pool: Vec<CatalogItem>, limit: usize) -> Vec<CatalogItem> {
        let budget = limit.saturating_mul(SCORING_BUDGET_FACTOR);
        let mut seen = HashSet::new();
        let mut eligible = Vec::with_capacity(budget.min(pool.len()));

        for item in pool {
            if eligible.len() >= budget {
                break;
            }
            if let Err(e) = item.validate() {
                tracing::warn!(product_id = item.id, error = %e, "Skipping candidate");
                continue;
            }
            if seen.insert(item.id) {
                eligible.push(item);
            }
        }

        eligible
    }
}

/// Ranks scored candidates and draws the final picks
pub struct Selector;

impl Selector {
    /// Weighted sampling without replacement of `limit` items from the top window
    ///
    /// The window holds the best `2 * limit` candidates. When it has no more
    /// than `limit` members, all of them are returned in rank order.
    pub fn select(
        mut scored: Vec<ScoredCandidate>,
        limit: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<ScoredCandidate> {
        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scored.truncate(limit.saturating_mul(SELECTION_WINDOW_FACTOR));

        if scored.len() <= limit {
            return scored;
        }

        let mut window = scored;
        let mut picks = Vec::with_capacity(limit);

        while picks.len() < limit && !window.is_empty() {
            let index = Self::draw(&window, rng);
            picks.push(window.remove(index));
        }

        picks
    }

    fn draw(window: &[ScoredCandidate], rng: &mut dyn RngCore) -> usize {
        let weights: Vec<f64> = window
            .iter()
            .map(|c| c.score().max(MIN_SELECTION_WEIGHT))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut target = rng.gen::<f64>() * total;

        for (index, weight) in weights.iter().enumerate() {
            if target < *weight {
                return index;
            }
            target -= weight;
        }
        window.len() - 1
    }
}

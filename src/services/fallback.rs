use rand::RngCore;
use std::collections::HashSet;

use crate::{
    models::{CatalogItem, ComponentScores, RecommendationReasoning, RecommendationSource},
    services::{
        context_builder::{Placeholder, RecommendedProduct},
        features::SustainabilityScorer,
        providers::{CandidateOrdering, CandidateQuery, CatalogSource, SustainabilitySource},
        scoring::{MAX_SCORE, MIN_SCORE},
        selection::{ScoredCandidate, SELECTION_WINDOW_FACTOR},
    },
};

/// Score given to non-personalized fallback picks and placeholders
pub const BASELINE_SCORE: f64 = 5.0;
const ADDITIONAL_REAL_CONFIDENCE: f64 = 0.5;
const RANDOM_FALLBACK_CONFIDENCE: f64 = 0.3;
const SYNTHETIC_CONFIDENCE: f64 = 0.1;

/// Catalog round trips allowed per stage while malformed records keep turning up
const MAX_STAGE_FETCHES: usize = 4;

/// States of the fallback chain, in traversal order
///
/// `Primary -> AdditionalReal -> RandomFallback -> Synthetic`. A stage is only
/// entered while the previous ones left a shortfall, and no stage is entered
/// twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStage {
    Primary,
    AdditionalReal,
    RandomFallback,
    Synthetic,
}

impl FallbackStage {
    /// Stage to try on shortfall; `None` after the terminal stage
    pub fn next(self) -> Option<Self> {
        match self {
            FallbackStage::Primary => Some(FallbackStage::AdditionalReal),
            FallbackStage::AdditionalReal => Some(FallbackStage::RandomFallback),
            FallbackStage::RandomFallback => Some(FallbackStage::Synthetic),
            FallbackStage::Synthetic => None,
        }
    }

    pub fn source(self) -> RecommendationSource {
        match self {
            FallbackStage::Primary => RecommendationSource::Primary,
            FallbackStage::AdditionalReal => RecommendationSource::AdditionalReal,
            FallbackStage::RandomFallback => RecommendationSource::RandomFallback,
            FallbackStage::Synthetic => RecommendationSource::Synthetic,
        }
    }
}

/// One slot of the final response, before context building
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub product: RecommendedProduct,
    pub reasoning: RecommendationReasoning,
    pub source: RecommendationSource,
}

/// Picks plus the stages that were entered to produce them
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub picks: Vec<Pick>,
    pub stages: Vec<FallbackStage>,
}

/// Reasoning for items found by the additional-real stage
pub fn simplified_reasoning(raw_sustainability: f64) -> RecommendationReasoning {
    let score = if raw_sustainability > 0.0 {
        (raw_sustainability / 10.0).clamp(MIN_SCORE, MAX_SCORE)
    } else {
        BASELINE_SCORE
    };
    let factor = if raw_sustainability >= 60.0 {
        "Good environmental credentials"
    } else {
        "Available now in our catalog"
    };

    RecommendationReasoning {
        components: ComponentScores {
            sustainability: score,
            ..ComponentScores::default()
        },
        final_score: score,
        factors: vec![factor.to_string()],
        confidence: ADDITIONAL_REAL_CONFIDENCE,
    }
}

fn flat_reasoning(factor: &str, confidence: f64) -> RecommendationReasoning {
    RecommendationReasoning {
        components: ComponentScores {
            purchase_history: BASELINE_SCORE,
            sustainability: BASELINE_SCORE,
            popularity: BASELINE_SCORE,
            category_affinity: BASELINE_SCORE,
        },
        final_score: BASELINE_SCORE,
        factors: vec![factor.to_string()],
        confidence,
    }
}

/// Drives the chain from the primary selection to exactly `limit` picks
///
/// `Synthetic` cannot fail, so [`FallbackChain::run`] always ends with exactly
/// the requested number of picks.
pub struct FallbackChain<'a> {
    catalog: &'a dyn CatalogSource,
    sustainability: &'a dyn SustainabilitySource,
    limit: usize,
    stage: FallbackStage,
    stages: Vec<FallbackStage>,
    picks: Vec<Pick>,
    chosen: HashSet<i64>,
    /// Ids that failed validation; never fetched again in this call
    rejected: HashSet<i64>,
}

/// Valid, not-yet-chosen items from one catalog fetch
struct Batch {
    items: Vec<CatalogItem>,
    had_rejects: bool,
}

impl<'a> FallbackChain<'a> {
    /// Starts in `Primary` holding the selector's output
    pub fn new(
        catalog: &'a dyn CatalogSource,
        sustainability: &'a dyn SustainabilitySource,
        limit: usize,
        primary: Vec<ScoredCandidate>,
    ) -> Self {
        let mut chain = Self {
            catalog,
            sustainability,
            limit,
            stage: FallbackStage::Primary,
            stages: vec![FallbackStage::Primary],
            picks: Vec::with_capacity(limit.min(primary.len())),
            chosen: HashSet::new(),
            rejected: HashSet::new(),
        };

        for candidate in primary {
            if chain.shortfall() == 0 {
                break;
            }
            if chain.chosen.insert(candidate.item.id) {
                chain.picks.push(Pick {
                    product: RecommendedProduct::Catalog(candidate.item),
                    reasoning: candidate.reasoning,
                    source: RecommendationSource::Primary,
                });
            }
        }

        chain
    }

    pub fn shortfall(&self) -> usize {
        self.limit.saturating_sub(self.picks.len())
    }

    pub fn stage(&self) -> FallbackStage {
        self.stage
    }

    /// Advances through the remaining stages until the shortfall is covered
    pub async fn run(mut self, rng: &mut (dyn RngCore + Send)) -> FallbackOutcome {
        while self.shortfall() > 0 {
            let Some(next) = self.stage.next() else {
                break;
            };
            self.stage = next;
            self.stages.push(next);

            tracing::info!(
                stage = ?next,
                shortfall = self.shortfall(),
                "Entering fallback stage"
            );

            match next {
                FallbackStage::Primary => {}
                FallbackStage::AdditionalReal => self.fill_additional_real(rng).await,
                FallbackStage::RandomFallback => self.fill_random().await,
                FallbackStage::Synthetic => self.fill_synthetic(),
            }
        }

        FallbackOutcome {
            picks: self.picks,
            stages: self.stages,
        }
    }

    fn query(&self, ordering: CandidateOrdering) -> CandidateQuery {
        CandidateQuery::new(
            self.shortfall().saturating_mul(SELECTION_WINDOW_FACTOR),
            ordering,
        )
        .excluding(self.chosen.iter().chain(self.rejected.iter()).copied())
    }

    /// One catalog round trip; `None` when the catalog failed
    async fn fetch(&mut self, ordering: CandidateOrdering) -> Option<Batch> {
        let query = self.query(ordering);
        let items = match self.catalog.candidates(&query).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(stage = ?self.stage, error = %e, "Fallback candidates unavailable");
                return None;
            }
        };

        let mut had_rejects = false;
        let mut valid = Vec::with_capacity(items.len());
        for item in items {
            if self.chosen.contains(&item.id) || self.rejected.contains(&item.id) {
                continue;
            }
            match item.validate() {
                Ok(()) => valid.push(item),
                Err(e) => {
                    tracing::warn!(product_id = item.id, error = %e, "Skipping candidate");
                    self.rejected.insert(item.id);
                    had_rejects = true;
                }
            }
        }

        Some(Batch {
            items: valid,
            had_rejects,
        })
    }

    /// Whether another fetch in the same stage can still find real items
    fn should_refetch(&self, batch_had_rejects: bool) -> bool {
        batch_had_rejects && self.shortfall() > 0
    }

    async fn fill_additional_real(&mut self, rng: &mut (dyn RngCore + Send)) {
        let ordering = CandidateOrdering::pick(rng);

        for _ in 0..MAX_STAGE_FETCHES {
            let Some(batch) = self.fetch(ordering).await else {
                return;
            };

            if !batch.items.is_empty() {
                let ids: Vec<i64> = batch.items.iter().map(|item| item.id).collect();
                let ratings = match self.sustainability.ratings(&ids).await {
                    Ok(ratings) => ratings,
                    Err(e) => {
                        tracing::warn!(error = %e, "Sustainability ratings unavailable for fallback");
                        Vec::new()
                    }
                };
                let scores = SustainabilityScorer::score(&ids, &ratings);

                for item in batch.items {
                    if self.shortfall() == 0 {
                        break;
                    }
                    if !self.chosen.insert(item.id) {
                        continue;
                    }
                    let raw = scores.get(&item.id).copied().unwrap_or(0.0);
                    self.picks.push(Pick {
                        product: RecommendedProduct::Catalog(item),
                        reasoning: simplified_reasoning(raw),
                        source: RecommendationSource::AdditionalReal,
                    });
                }
            }

            if !self.should_refetch(batch.had_rejects) {
                return;
            }
        }
    }

    async fn fill_random(&mut self) {
        for _ in 0..MAX_STAGE_FETCHES {
            let Some(batch) = self.fetch(CandidateOrdering::Random).await else {
                return;
            };

            for item in batch.items {
                if self.shortfall() == 0 {
                    break;
                }
                if !self.chosen.insert(item.id) {
                    continue;
                }
                self.picks.push(Pick {
                    product: RecommendedProduct::Catalog(item),
                    reasoning: flat_reasoning(
                        "Popular pick from our catalog",
                        RANDOM_FALLBACK_CONFIDENCE,
                    ),
                    source: RecommendationSource::RandomFallback,
                });
            }

            if !self.should_refetch(batch.had_rejects) {
                return;
            }
        }
    }

    fn fill_synthetic(&mut self) {
        while self.shortfall() > 0 {
            let position = self.picks.len() + 1;
            self.picks.push(Pick {
                product: RecommendedProduct::Placeholder(Placeholder::numbered(position)),
                reasoning: flat_reasoning(
                    "Curated placeholder while we refresh the catalog",
                    SYNTHETIC_CONFIDENCE,
                ),
                source: RecommendationSource::Synthetic,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::{RatingEntry, Tier};
    use crate::services::{context_builder, providers::InMemoryStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog whose first candidate fetch times out
    struct FlakyCatalog {
        inner: InMemoryStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for FlakyCatalog {
        async fn candidates(&self, query: &CandidateQuery) -> AppResult<Vec<CatalogItem>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AppError::Internal("catalog timed out".to_string()));
            }
            self.inner.candidates(query).await
        }

        async fn product(&self, product_id: i64) -> AppResult<Option<CatalogItem>> {
            self.inner.product(product_id).await
        }
    }

    fn item(id: i64) -> CatalogItem {
        CatalogItem {
            id,
            name: format!("Item {}", id),
            price: 15.0,
            brand: Some("Acme".to_string()),
            category_id: Some(1),
            category_name: Some("Garden".to_string()),
            in_stock: true,
            quantity: 2,
            created_at: Utc::now(),
        }
    }

    fn scored(id: i64, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            item: item(id),
            reasoning: RecommendationReasoning {
                components: ComponentScores::default(),
                final_score: score,
                factors: vec!["Strong match with purchase history".to_string()],
                confidence: 0.8,
            },
        }
    }

    #[test]
    fn test_stage_transitions_are_linear_and_terminal() {
        assert_eq!(FallbackStage::Primary.next(), Some(FallbackStage::AdditionalReal));
        assert_eq!(
            FallbackStage::AdditionalReal.next(),
            Some(FallbackStage::RandomFallback)
        );
        assert_eq!(FallbackStage::RandomFallback.next(), Some(FallbackStage::Synthetic));
        assert_eq!(FallbackStage::Synthetic.next(), None);
    }

    #[test]
    fn test_simplified_reasoning_from_sustainability() {
        let rated = simplified_reasoning(72.0);
        assert!((rated.final_score - 7.2).abs() < 1e-9);
        assert_eq!(rated.confidence, ADDITIONAL_REAL_CONFIDENCE);

        let unrated = simplified_reasoning(0.0);
        assert_eq!(unrated.final_score, BASELINE_SCORE);
        assert_eq!(unrated.factors, vec!["Available now in our catalog"]);
    }

    #[tokio::test]
    async fn test_full_primary_never_leaves_primary() {
        let store = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let chain = FallbackChain::new(&store, &store, 2, vec![scored(1, 8.0), scored(2, 7.0)]);

        let outcome = chain.run(&mut rng).await;
        assert_eq!(outcome.stages, vec![FallbackStage::Primary]);
        assert_eq!(outcome.picks.len(), 2);
    }

    #[tokio::test]
    async fn test_additional_real_fills_from_catalog() {
        let store = InMemoryStore::new()
            .with_products(vec![item(1), item(2), item(3)])
            .with_ratings(vec![RatingEntry {
                product_id: 2,
                value: 90.0,
            }]);
        let mut rng = StdRng::seed_from_u64(2);
        let chain = FallbackChain::new(&store, &store, 3, vec![scored(1, 9.0)]);

        let outcome = chain.run(&mut rng).await;
        assert_eq!(
            outcome.stages,
            vec![FallbackStage::Primary, FallbackStage::AdditionalReal]
        );
        assert_eq!(outcome.picks.len(), 3);
        let ids: HashSet<Option<i64>> =
            outcome.picks.iter().map(|p| p.product.catalog_id()).collect();
        assert_eq!(ids.len(), 3);
        assert!(outcome
            .picks
            .iter()
            .skip(1)
            .all(|p| p.source == RecommendationSource::AdditionalReal));
    }

    #[tokio::test]
    async fn test_empty_catalog_reaches_synthetic() {
        let store = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let chain = FallbackChain::new(&store, &store, 4, Vec::new());

        let outcome = chain.run(&mut rng).await;
        assert_eq!(
            outcome.stages,
            vec![
                FallbackStage::Primary,
                FallbackStage::AdditionalReal,
                FallbackStage::RandomFallback,
                FallbackStage::Synthetic,
            ]
        );
        assert_eq!(outcome.picks.len(), 4);
        assert!(outcome
            .picks
            .iter()
            .all(|p| p.source == RecommendationSource::Synthetic && p.product.catalog_id().is_none()));
    }

    #[tokio::test]
    async fn test_catalog_outage_still_reaches_limit() {
        let store = InMemoryStore::new().with_products(vec![item(1), item(2)]);
        store.set_unavailable(true);
        let mut rng = StdRng::seed_from_u64(4);
        let chain = FallbackChain::new(&store, &store, 3, vec![scored(9, 6.0)]);

        let outcome = chain.run(&mut rng).await;
        assert_eq!(outcome.picks.len(), 3);
        assert_eq!(outcome.picks[0].source, RecommendationSource::Primary);
        assert_eq!(outcome.stages.last(), Some(&FallbackStage::Synthetic));
    }

    #[tokio::test]
    async fn test_primary_duplicates_are_collapsed() {
        let store = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        let chain = FallbackChain::new(&store, &store, 2, vec![scored(1, 8.0), scored(1, 8.0)]);
        assert_eq!(chain.shortfall(), 1);
        assert_eq!(chain.stage(), FallbackStage::Primary);

        let outcome = chain.run(&mut rng).await;
        assert_eq!(outcome.picks.len(), 2);
        assert_eq!(outcome.picks[1].source, RecommendationSource::Synthetic);
    }

    #[tokio::test]
    async fn test_malformed_records_do_not_displace_real_items() {
        let mut products: Vec<CatalogItem> = (1..=8)
            .map(|id| CatalogItem {
                name: "  ".to_string(),
                ..item(id)
            })
            .collect();
        products.push(item(100));
        products.push(item(101));
        let store = InMemoryStore::new().with_products(products);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = FallbackChain::new(&store, &store, 2, Vec::new())
                .run(&mut rng)
                .await;

            assert!(
                outcome
                    .picks
                    .iter()
                    .all(|p| p.source != RecommendationSource::Synthetic),
                "seed {} fell through to placeholders",
                seed
            );
            let ids: HashSet<Option<i64>> =
                outcome.picks.iter().map(|p| p.product.catalog_id()).collect();
            assert_eq!(ids, HashSet::from([Some(100), Some(101)]));
        }
    }

    #[tokio::test]
    async fn test_rejected_ids_are_excluded_from_later_queries() {
        let store = InMemoryStore::new().with_products(vec![
            CatalogItem {
                name: String::new(),
                ..item(1)
            },
            item(2),
        ]);
        let mut chain = FallbackChain::new(&store, &store, 1, Vec::new());

        let batch = chain.fetch(CandidateOrdering::IdDescending).await.unwrap();
        assert_eq!(batch.items.len(), 1);
        assert!(batch.had_rejects);
        assert!(chain
            .query(CandidateOrdering::Random)
            .exclude_ids
            .contains(&1));
    }

    #[tokio::test]
    async fn test_random_fallback_supplies_items_when_additional_real_fails() {
        let catalog = FlakyCatalog {
            inner: InMemoryStore::new().with_products(vec![item(1), item(2), item(3)]),
            calls: AtomicUsize::new(0),
        };
        let ratings = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(6);

        let outcome = FallbackChain::new(&catalog, &ratings, 2, Vec::new())
            .run(&mut rng)
            .await;

        assert_eq!(
            outcome.stages,
            vec![
                FallbackStage::Primary,
                FallbackStage::AdditionalReal,
                FallbackStage::RandomFallback,
            ]
        );
        assert_eq!(outcome.picks.len(), 2);
        for pick in outcome.picks {
            assert_eq!(pick.source, RecommendationSource::RandomFallback);
            assert!(pick.product.catalog_id().is_some());
            assert_eq!(pick.reasoning.final_score, BASELINE_SCORE);

            let context = context_builder::build(
                &pick.product,
                pick.reasoning,
                pick.source,
                None,
                Utc::now(),
            );
            assert_eq!(context.tier, Tier::Basic);
            assert!(!context.personalized);
        }
    }

    #[test]
    fn test_huge_limit_saturates_query_window() {
        let store = InMemoryStore::new();
        let chain = FallbackChain::new(&store, &store, usize::MAX, Vec::new());
        assert_eq!(chain.query(CandidateOrdering::Random).limit, usize::MAX);
    }
}

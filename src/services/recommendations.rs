use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use std::{collections::HashMap, sync::Arc, time::Instant};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogItem, Explanation, OrderStatus, PurchaseHistorySummary, RecommendationContext,
        RecommendationReasoning,
    },
    services::{
        context_builder,
        fallback::{FallbackChain, Pick},
        features::{PopularityScorer, PurchaseHistoryAnalyzer, SustainabilityScorer},
        narrative::NarrativeClient,
        providers::{CatalogSource, ImageSource, PurchaseHistorySource, SustainabilitySource},
        scoring::{DiversificationNoise, ScoringAggregator},
        selection::{CandidateSampler, ScoredCandidate, Selector},
    },
};

/// Engine tuning knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub candidate_pool_size: usize,
    pub lookback_days: i64,
    pub popularity_window_days: i64,
    /// Seeds every call's random source when set
    pub rng_seed: Option<u64>,
    pub noise: DiversificationNoise,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            candidate_pool_size: 100,
            lookback_days: 90,
            popularity_window_days: 30,
            rng_seed: None,
            noise: DiversificationNoise::default(),
        }
    }
}

/// External data sources the engine reads from
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSource>,
    pub history: Arc<dyn PurchaseHistorySource>,
    pub sustainability: Arc<dyn SustainabilitySource>,
    pub images: Arc<dyn ImageSource>,
    pub narrative: Arc<dyn NarrativeClient>,
}

impl Collaborators {
    /// Uses one store for every data collaborator
    pub fn shared<S>(store: Arc<S>, narrative: Arc<dyn NarrativeClient>) -> Self
    where
        S: CatalogSource + PurchaseHistorySource + SustainabilitySource + ImageSource + 'static,
    {
        Self {
            catalog: store.clone(),
            history: store.clone(),
            sustainability: store.clone(),
            images: store,
            narrative,
        }
    }
}

/// Produces exactly-K personalized recommendations and their explanations
pub struct RecommendationEngine {
    sources: Collaborators,
    aggregator: ScoringAggregator,
    sampler: CandidateSampler,
    analyzer: PurchaseHistoryAnalyzer,
    popularity: PopularityScorer,
    settings: EngineSettings,
}

impl RecommendationEngine {
    pub fn new(sources: Collaborators, settings: EngineSettings) -> Self {
        Self {
            sources,
            aggregator: ScoringAggregator::new(settings.noise),
            sampler: CandidateSampler::new(settings.candidate_pool_size),
            analyzer: PurchaseHistoryAnalyzer::new(settings.lookback_days),
            popularity: PopularityScorer::new(settings.popularity_window_days),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn rng(&self) -> StdRng {
        match self.settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Returns exactly `limit` recommendations for the user
    ///
    /// Missing or failing data never surfaces as an error; the fallback chain
    /// covers any shortfall down to synthetic placeholders.
    pub async fn get_recommendations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Vec<RecommendationContext> {
        if limit == 0 {
            return Vec::new();
        }

        let started = Instant::now();
        let mut rng = self.rng();

        let history = self.purchase_history(user_id).await;
        let primary = self.primary_picks(&history, limit, &mut rng).await;
        let primary_count = primary.len();

        let outcome = FallbackChain::new(
            self.sources.catalog.as_ref(),
            self.sources.sustainability.as_ref(),
            limit,
            primary,
        )
        .run(&mut rng)
        .await;

        let images = self.images_for(&outcome.picks).await;
        let generated_at = Utc::now();

        let contexts: Vec<RecommendationContext> = outcome
            .picks
            .into_iter()
            .map(|pick| {
                let image = pick
                    .product
                    .catalog_id()
                    .and_then(|id| images.get(&id))
                    .map(String::as_str);
                context_builder::build(&pick.product, pick.reasoning, pick.source, image, generated_at)
            })
            .collect();

        tracing::info!(
            user_id = %user_id,
            requested = limit,
            primary = primary_count,
            final_stage = ?outcome.stages.last(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendations generated"
        );

        contexts
    }

    /// Scores a single product for the user without selection or fallback
    pub async fn explain(
        &self,
        user_id: Uuid,
        product_id: i64,
    ) -> AppResult<RecommendationReasoning> {
        let (_, reasoning) = self.score_product(user_id, product_id).await?;
        Ok(reasoning)
    }

    /// Reasoning plus prose from the narrative collaborator
    ///
    /// Narrative failures propagate to the caller.
    pub async fn explain_with_narrative(
        &self,
        user_id: Uuid,
        product_id: i64,
    ) -> AppResult<Explanation> {
        let (item, reasoning) = self.score_product(user_id, product_id).await?;

        let narrative = self
            .sources
            .narrative
            .narrate(&item.name, &reasoning)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    product_id,
                    client = self.sources.narrative.name(),
                    error = %e,
                    "Narrative generation failed"
                );
            })?;

        Ok(Explanation {
            product_id: item.id,
            reasoning,
            narrative,
        })
    }

    async fn score_product(
        &self,
        user_id: Uuid,
        product_id: i64,
    ) -> AppResult<(CatalogItem, RecommendationReasoning)> {
        let item = self
            .sources
            .catalog
            .product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

        let history = self.purchase_history(user_id).await;
        let ids = [item.id];
        let (popularity, sustainability) =
            tokio::join!(self.popularity_for(&ids), self.sustainability_for(&ids));

        let mut rng = self.rng();
        let reasoning =
            self.aggregator
                .score(&item, &history, &popularity, &sustainability, &mut rng);
        Ok((item, reasoning))
    }

    async fn purchase_history(&self, user_id: Uuid) -> PurchaseHistorySummary {
        let since = self.analyzer.window_start(Utc::now());
        match self
            .sources
            .history
            .order_lines(user_id, since, &OrderStatus::HISTORY_STATES)
            .await
        {
            Ok(lines) => self.analyzer.summarize(&lines),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Purchase history unavailable, using baseline");
                PurchaseHistorySummary::default()
            }
        }
    }

    /// Sample, score and select from the catalog; may come back short
    async fn primary_picks(
        &self,
        history: &PurchaseHistorySummary,
        limit: usize,
        rng: &mut StdRng,
    ) -> Vec<ScoredCandidate> {
        let query = self.sampler.query(rng);
        let pool = match self.sources.catalog.candidates(&query).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "Candidate pool unavailable");
                return Vec::new();
            }
        };

        let eligible = self.sampler.eligible(pool, limit);
        if eligible.is_empty() {
            return Vec::new();
        }

        let ids: Vec<i64> = eligible.iter().map(|item| item.id).collect();
        let (popularity, sustainability) =
            tokio::join!(self.popularity_for(&ids), self.sustainability_for(&ids));

        let scored: Vec<ScoredCandidate> = eligible
            .into_iter()
            .map(|item| {
                let reasoning =
                    self.aggregator
                        .score(&item, history, &popularity, &sustainability, rng);
                ScoredCandidate { item, reasoning }
            })
            .collect();

        tracing::debug!(
            ordering = ?query.ordering,
            scored = scored.len(),
            "Primary candidates scored"
        );

        Selector::select(scored, limit, rng)
    }

    async fn popularity_for(&self, ids: &[i64]) -> HashMap<i64, f64> {
        let since = self.popularity.window_start(Utc::now());
        match self.sources.history.sales_stats(ids, since).await {
            Ok(stats) => self.popularity.score(&stats),
            Err(e) => {
                tracing::warn!(error = %e, "Sales stats unavailable, popularity treated as missing");
                HashMap::new()
            }
        }
    }

    async fn sustainability_for(&self, ids: &[i64]) -> HashMap<i64, f64> {
        match self.sources.sustainability.ratings(ids).await {
            Ok(ratings) => SustainabilityScorer::score(ids, &ratings),
            Err(e) => {
                tracing::warn!(error = %e, "Sustainability ratings unavailable");
                HashMap::new()
            }
        }
    }

    async fn images_for(&self, picks: &[Pick]) -> HashMap<i64, String> {
        let ids: Vec<i64> = picks
            .iter()
            .filter_map(|pick| pick.product.catalog_id())
            .collect();
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.sources.images.first_images(&ids).await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(error = %e, "Product images unavailable, using placeholder");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderLine, RatingEntry, RecommendationSource, Tier};
    use crate::services::narrative::{MockNarrativeClient, TemplateNarrativeClient};
    use crate::services::providers::{InMemoryStore, PLACEHOLDER_IMAGE};
    use std::collections::HashSet;
    use tokio_test::{assert_err, assert_ok};

    fn item(id: i64, category_id: i64, brand: &str, price: f64) -> CatalogItem {
        CatalogItem {
            id,
            name: format!("Product {}", id),
            price,
            brand: Some(brand.to_string()),
            category_id: Some(category_id),
            category_name: Some(format!("Category {}", category_id)),
            in_stock: true,
            quantity: 5,
            created_at: Utc::now(),
        }
    }

    fn catalog(count: i64) -> Vec<CatalogItem> {
        (1..=count)
            .map(|id| item(id, id % 4, "Acme", 10.0 + id as f64))
            .collect()
    }

    fn engine_with(store: Arc<InMemoryStore>, narrative: Arc<dyn NarrativeClient>) -> RecommendationEngine {
        RecommendationEngine::new(
            Collaborators::shared(store, narrative),
            EngineSettings {
                rng_seed: Some(42),
                ..EngineSettings::default()
            },
        )
    }

    fn engine(store: InMemoryStore) -> RecommendationEngine {
        engine_with(Arc::new(store), Arc::new(TemplateNarrativeClient))
    }

    fn catalog_ids(contexts: &[RecommendationContext]) -> Vec<i64> {
        contexts.iter().filter_map(|c| c.product.id).collect()
    }

    #[tokio::test]
    async fn test_exactly_k_for_any_catalog_size() {
        for size in [0, 1, 3, 6, 20, 150] {
            let engine = engine(InMemoryStore::new().with_products(catalog(size)));
            for limit in [1, 6, 12] {
                let contexts = engine.get_recommendations(Uuid::new_v4(), limit).await;
                assert_eq!(contexts.len(), limit, "catalog {} limit {}", size, limit);

                let ids = catalog_ids(&contexts);
                let unique: HashSet<i64> = ids.iter().copied().collect();
                assert_eq!(ids.len(), unique.len());
            }
        }
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let engine = engine(InMemoryStore::new().with_products(catalog(5)));
        assert!(engine.get_recommendations(Uuid::new_v4(), 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_placeholders() {
        let engine = engine(InMemoryStore::new());
        let contexts = engine.get_recommendations(Uuid::new_v4(), 6).await;

        assert_eq!(contexts.len(), 6);
        for (i, context) in contexts.iter().enumerate() {
            assert_eq!(context.product.id, None);
            assert_eq!(context.product.name, format!("Recommended Product {}", i + 1));
            assert_eq!(context.source, RecommendationSource::Synthetic);
            assert_eq!(context.tier, Tier::Basic);
            assert!(!context.personalized);
        }
    }

    #[tokio::test]
    async fn test_three_items_six_requested() {
        let engine = engine(InMemoryStore::new().with_products(catalog(3)));
        let contexts = engine.get_recommendations(Uuid::new_v4(), 6).await;

        assert_eq!(contexts.len(), 6);
        let mut real = catalog_ids(&contexts);
        real.sort();
        assert_eq!(real, vec![1, 2, 3]);
        assert!(contexts[..3]
            .iter()
            .all(|c| c.source == RecommendationSource::Primary));
        assert!(contexts[3..]
            .iter()
            .all(|c| c.source == RecommendationSource::Synthetic));
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_placeholders() {
        let store = InMemoryStore::new().with_products(catalog(10));
        store.set_unavailable(true);
        let engine = engine(store);

        let contexts = engine.get_recommendations(Uuid::new_v4(), 4).await;
        assert_eq!(contexts.len(), 4);
        assert!(contexts
            .iter()
            .all(|c| c.source == RecommendationSource::Synthetic));
    }

    #[tokio::test]
    async fn test_scores_and_tiers_are_consistent() {
        let engine = engine(InMemoryStore::new().with_products(catalog(40)));
        for _ in 0..5 {
            for context in engine.get_recommendations(Uuid::new_v4(), 8).await {
                assert!((0.0..=10.0).contains(&context.score));
                assert_eq!(context.tier, Tier::from_score(context.score));
                assert!(!context.reasoning.factors.is_empty());
                assert!((0.0..=1.0).contains(&context.reasoning.confidence));
            }
        }
    }

    #[tokio::test]
    async fn test_images_attached_with_placeholder_default() {
        let store = InMemoryStore::new()
            .with_products(vec![item(1, 1, "Acme", 20.0), item(2, 1, "Acme", 20.0)])
            .with_image(1, "/img/1.png");
        let engine = engine(store);

        let contexts = engine.get_recommendations(Uuid::new_v4(), 2).await;
        for context in contexts {
            match context.product.id {
                Some(1) => assert_eq!(context.product.image_url, "/img/1.png"),
                _ => assert_eq!(context.product.image_url, PLACEHOLDER_IMAGE),
            }
        }
    }

    #[tokio::test]
    async fn test_seeded_engine_is_reproducible() {
        let store = InMemoryStore::new().with_products(catalog(3));
        let engine = engine(store);
        let user_id = Uuid::new_v4();

        let first = assert_ok!(engine.explain(user_id, 2).await);
        let second = assert_ok!(engine.explain(user_id, 2).await);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_explain_reflects_purchase_history() {
        let user_id = Uuid::new_v4();
        let lines = (0..8)
            .map(|i| OrderLine {
                product_id: 100 + i,
                category_id: Some(3),
                brand: Some("Acme".to_string()),
                quantity: 1,
                unit_price: 20.0,
                status: OrderStatus::Delivered,
                ordered_at: Utc::now(),
            })
            .collect();
        let store = InMemoryStore::new()
            .with_products(vec![item(7, 3, "Acme", 21.0)])
            .with_order_lines(user_id, lines)
            .with_ratings(vec![RatingEntry {
                product_id: 7,
                value: 85.0,
            }]);
        let engine = RecommendationEngine::new(
            Collaborators::shared(Arc::new(store), Arc::new(TemplateNarrativeClient)),
            EngineSettings {
                noise: DiversificationNoise::none(),
                ..EngineSettings::default()
            },
        );

        let loyal = assert_ok!(engine.explain(user_id, 7).await);
        let fresh = assert_ok!(engine.explain(Uuid::new_v4(), 7).await);

        assert!(loyal.components.category_affinity >= 9.0);
        assert!((3.0..6.0).contains(&fresh.components.category_affinity));
        assert!(loyal.components.sustainability >= 8.5);
        assert!(loyal.final_score > fresh.final_score);
    }

    #[tokio::test]
    async fn test_explain_unknown_product_is_not_found() {
        let engine = engine(InMemoryStore::new());
        let err = assert_err!(engine.explain(Uuid::new_v4(), 99).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_explain_with_narrative_passes_reasoning() {
        let mut narrative = MockNarrativeClient::new();
        narrative
            .expect_narrate()
            .withf(|name, reasoning| name.to_string() == "Product 1" && !reasoning.factors.is_empty())
            .times(1)
            .returning(|_, _| Ok("A thoughtful pick".to_string()));
        narrative.expect_name().return_const("mock");

        let store = Arc::new(InMemoryStore::new().with_products(catalog(1)));
        let engine = engine_with(store, Arc::new(narrative));

        let explanation = assert_ok!(engine.explain_with_narrative(Uuid::new_v4(), 1).await);
        assert_eq!(explanation.product_id, 1);
        assert_eq!(explanation.narrative, "A thoughtful pick");
    }

    #[tokio::test]
    async fn test_narrative_failure_propagates() {
        let mut narrative = MockNarrativeClient::new();
        narrative
            .expect_narrate()
            .returning(|_, _| Err(AppError::Narrative("service down".to_string())));
        narrative.expect_name().return_const("mock");

        let store = Arc::new(InMemoryStore::new().with_products(catalog(1)));
        let engine = engine_with(store, Arc::new(narrative));

        let err = assert_err!(engine.explain_with_narrative(Uuid::new_v4(), 1).await);
        assert!(matches!(err, AppError::Narrative(_)));
    }
}

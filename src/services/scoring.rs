use rand::{Rng, RngCore};
use std::collections::HashMap;

use crate::models::{CatalogItem, ComponentScores, PurchaseHistorySummary, RecommendationReasoning};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Factor used when no threshold rule matches
pub const DIVERSIFICATION_FACTOR: &str = "Selected to diversify your recommendations";

/// Purchased units at which history depth stops adding confidence
const FULL_HISTORY_DEPTH: f64 = 20.0;
const SUSTAINABILITY_PRESENT_CONFIDENCE: f64 = 0.9;
const POPULARITY_PRESENT_CONFIDENCE: f64 = 0.8;

/// Closed score interval a signal value is drawn from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub low: f64,
    pub high: f64,
}

impl Bucket {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Neutral affinity bucket for users without purchase history
pub const NEW_USER_BUCKET: Bucket = Bucket::new(3.0, 6.0);
const MISSING_SUSTAINABILITY_BUCKET: Bucket = Bucket::new(3.0, 5.0);
const MISSING_POPULARITY_BUCKET: Bucket = Bucket::new(2.0, 4.0);

/// Bounds of the random perturbation applied while scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversificationNoise {
    /// Share of a bucket's width used for uniform jitter; 0 pins values to the bucket floor
    pub bucket_spread: f64,
    /// Amplitude of the symmetric jitter added to the final score
    pub final_jitter: f64,
    /// Range substituted for a confidence signal with no underlying data
    pub missing_confidence: (f64, f64),
}

impl Default for DiversificationNoise {
    fn default() -> Self {
        Self {
            bucket_spread: 1.0,
            final_jitter: 0.3,
            missing_confidence: (0.25, 0.45),
        }
    }
}

impl DiversificationNoise {
    /// No perturbation at all; scoring becomes a pure function of its inputs
    pub fn none() -> Self {
        Self {
            bucket_spread: 0.0,
            final_jitter: 0.0,
            missing_confidence: (0.35, 0.35),
        }
    }

    pub fn sample(&self, bucket: Bucket, rng: &mut dyn RngCore) -> f64 {
        let spread = self.bucket_spread.clamp(0.0, 1.0);
        bucket.low + rng.gen::<f64>() * (bucket.high - bucket.low) * spread
    }

    pub fn final_offset(&self, rng: &mut dyn RngCore) -> f64 {
        (rng.gen::<f64>() * 2.0 - 1.0) * self.final_jitter.max(0.0)
    }

    pub fn missing_confidence(&self, rng: &mut dyn RngCore) -> f64 {
        let (low, high) = self.missing_confidence;
        low + rng.gen::<f64>() * (high - low).max(0.0)
    }
}

/// Bucket for the share of a user's purchases matching a category or brand
pub fn ratio_bucket(ratio: f64) -> Bucket {
    if ratio >= 0.5 {
        Bucket::new(9.0, 10.0)
    } else if ratio >= 0.3 {
        Bucket::new(7.0, 8.5)
    } else if ratio >= 0.1 {
        Bucket::new(5.0, 6.5)
    } else {
        Bucket::new(1.0, 3.0)
    }
}

/// Bucket for candidate price relative to the user's average item price
pub fn price_bucket(ratio: f64) -> Bucket {
    if (0.8..=1.25).contains(&ratio) {
        Bucket::new(8.5, 10.0)
    } else if (0.5..=2.0).contains(&ratio) {
        Bucket::new(6.0, 8.0)
    } else if (0.25..=4.0).contains(&ratio) {
        Bucket::new(3.5, 5.5)
    } else {
        Bucket::new(1.0, 3.0)
    }
}

/// Bucket for a raw 0-100 sustainability score (0 means unrated)
pub fn sustainability_bucket(raw: f64) -> Bucket {
    if raw >= 80.0 {
        Bucket::new(8.5, 10.0)
    } else if raw >= 60.0 {
        Bucket::new(6.5, 8.5)
    } else if raw >= 40.0 {
        Bucket::new(4.5, 6.5)
    } else if raw >= 20.0 {
        Bucket::new(2.5, 4.5)
    } else if raw > 0.0 {
        Bucket::new(1.0, 2.5)
    } else {
        MISSING_SUSTAINABILITY_BUCKET
    }
}

/// Bucket for a raw 0-10 popularity score (absent means no recent sales)
pub fn popularity_bucket(raw: Option<f64>) -> Bucket {
    match raw {
        Some(p) if p >= 8.0 => Bucket::new(8.5, 10.0),
        Some(p) if p >= 5.0 => Bucket::new(6.5, 8.5),
        Some(p) if p >= 2.0 => Bucket::new(4.5, 6.5),
        Some(p) if p > 0.0 => Bucket::new(2.5, 4.5),
        _ => MISSING_POPULARITY_BUCKET,
    }
}

/// How strongly the user's history concentrates on the candidate's category
pub fn category_affinity(
    candidate: &CatalogItem,
    history: &PurchaseHistorySummary,
    noise: &DiversificationNoise,
    rng: &mut dyn RngCore,
) -> f64 {
    if history.is_new_user() {
        return noise.sample(NEW_USER_BUCKET, rng);
    }
    noise.sample(ratio_bucket(history.category_ratio(candidate.category_id)), rng)
}

/// How strongly the user's history concentrates on the candidate's brand
pub fn brand_affinity(
    candidate: &CatalogItem,
    history: &PurchaseHistorySummary,
    noise: &DiversificationNoise,
    rng: &mut dyn RngCore,
) -> f64 {
    if history.is_new_user() {
        return noise.sample(NEW_USER_BUCKET, rng);
    }
    noise.sample(ratio_bucket(history.brand_ratio(candidate.brand.as_deref())), rng)
}

/// How close the candidate's price is to what the user usually pays
pub fn price_alignment(
    candidate: &CatalogItem,
    history: &PurchaseHistorySummary,
    noise: &DiversificationNoise,
    rng: &mut dyn RngCore,
) -> f64 {
    if history.is_new_user() || history.avg_item_price <= 0.0 {
        return noise.sample(NEW_USER_BUCKET, rng);
    }
    noise.sample(price_bucket(candidate.price / history.avg_item_price), rng)
}

/// Identifies which reasoning component a signal feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    PurchaseHistory,
    Sustainability,
    Popularity,
    CategoryAffinity,
}

/// Per-call inputs shared by every signal
pub struct ScoringContext<'a> {
    pub history: &'a PurchaseHistorySummary,
    pub popularity: &'a HashMap<i64, f64>,
    pub sustainability: &'a HashMap<i64, f64>,
    pub noise: &'a DiversificationNoise,
}

impl ScoringContext<'_> {
    fn sustainability_of(&self, product_id: i64) -> Option<f64> {
        self.sustainability
            .get(&product_id)
            .copied()
            .filter(|score| *score > 0.0)
    }

    fn popularity_of(&self, product_id: i64) -> Option<f64> {
        self.popularity.get(&product_id).copied()
    }
}

/// One independent scoring signal on the 0-10 scale
pub trait Signal: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Relative weight inside the final score
    fn weight(&self) -> f64;

    fn score(&self, candidate: &CatalogItem, ctx: &ScoringContext<'_>, rng: &mut dyn RngCore)
        -> f64;
}

/// Blend of category, brand and price fit against the user's purchases
pub struct PurchaseHistorySignal;

impl Signal for PurchaseHistorySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::PurchaseHistory
    }

    fn weight(&self) -> f64 {
        0.35
    }

    fn score(
        &self,
        candidate: &CatalogItem,
        ctx: &ScoringContext<'_>,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let category = category_affinity(candidate, ctx.history, ctx.noise, rng);
        let brand = brand_affinity(candidate, ctx.history, ctx.noise, rng);
        let price = price_alignment(candidate, ctx.history, ctx.noise, rng);
        0.5 * category + 0.2 * brand + 0.3 * price
    }
}

/// Environmental rating remapped to the 0-10 scale
pub struct SustainabilitySignal;

impl Signal for SustainabilitySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Sustainability
    }

    fn weight(&self) -> f64 {
        0.30
    }

    fn score(
        &self,
        candidate: &CatalogItem,
        ctx: &ScoringContext<'_>,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let raw = ctx.sustainability_of(candidate.id).unwrap_or(0.0);
        ctx.noise.sample(sustainability_bucket(raw), rng)
    }
}

/// Recent sales velocity remapped into expanded buckets
pub struct PopularitySignal;

impl Signal for PopularitySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Popularity
    }

    fn weight(&self) -> f64 {
        0.20
    }

    fn score(
        &self,
        candidate: &CatalogItem,
        ctx: &ScoringContext<'_>,
        rng: &mut dyn RngCore,
    ) -> f64 {
        ctx.noise
            .sample(popularity_bucket(ctx.popularity_of(candidate.id)), rng)
    }
}

/// Category affinity with a smaller brand contribution
pub struct AffinitySignal;

impl Signal for AffinitySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::CategoryAffinity
    }

    fn weight(&self) -> f64 {
        0.15
    }

    fn score(
        &self,
        candidate: &CatalogItem,
        ctx: &ScoringContext<'_>,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let category = category_affinity(candidate, ctx.history, ctx.noise, rng);
        let brand = brand_affinity(candidate, ctx.history, ctx.noise, rng);
        0.7 * category + 0.3 * brand
    }
}

/// Threshold ladders per component; the first rung above its threshold wins
const FACTOR_RULES: &[(SignalKind, &[(f64, &str)])] = &[
    (
        SignalKind::PurchaseHistory,
        &[
            (7.0, "Strong match with purchase history"),
            (5.0, "Similar to items you have purchased"),
        ],
    ),
    (
        SignalKind::Sustainability,
        &[
            (8.0, "Excellent sustainability rating"),
            (6.0, "Good environmental credentials"),
        ],
    ),
    (
        SignalKind::Popularity,
        &[
            (7.0, "Popular with other shoppers"),
            (5.0, "Steady seller in the catalog"),
        ],
    ),
    (
        SignalKind::CategoryAffinity,
        &[
            (7.0, "Matches your favorite categories"),
            (5.0, "Related to categories you shop"),
        ],
    ),
];

fn component(components: &ComponentScores, kind: SignalKind) -> f64 {
    match kind {
        SignalKind::PurchaseHistory => components.purchase_history,
        SignalKind::Sustainability => components.sustainability,
        SignalKind::Popularity => components.popularity,
        SignalKind::CategoryAffinity => components.category_affinity,
    }
}

fn component_mut(components: &mut ComponentScores, kind: SignalKind) -> &mut f64 {
    match kind {
        SignalKind::PurchaseHistory => &mut components.purchase_history,
        SignalKind::Sustainability => &mut components.sustainability,
        SignalKind::Popularity => &mut components.popularity,
        SignalKind::CategoryAffinity => &mut components.category_affinity,
    }
}

/// Qualitative factors for a set of component scores; never empty
pub fn reasoning_factors(components: &ComponentScores) -> Vec<String> {
    let mut factors: Vec<String> = FACTOR_RULES
        .iter()
        .filter_map(|(kind, ladder)| {
            let value = component(components, *kind);
            ladder
                .iter()
                .find(|(threshold, _)| value > *threshold)
                .map(|(_, text)| text.to_string())
        })
        .collect();

    if factors.is_empty() {
        factors.push(DIVERSIFICATION_FACTOR.to_string());
    }
    factors
}

/// Weighted composition of signals into a final score
///
/// Each [`Signal`] is scored independently and combined by weight into a
/// final 0-10 score. Reasoning factors and confidence are derived alongside.
pub struct ScoringAggregator {
    signals: Vec<Box<dyn Signal>>,
    noise: DiversificationNoise,
}

impl Default for ScoringAggregator {
    fn default() -> Self {
        Self::new(DiversificationNoise::default())
    }
}

impl ScoringAggregator {
    /// Aggregator with the four standard signals
    pub fn new(noise: DiversificationNoise) -> Self {
        Self::with_signals(
            vec![
                Box::new(PurchaseHistorySignal),
                Box::new(SustainabilitySignal),
                Box::new(PopularitySignal),
                Box::new(AffinitySignal),
            ],
            noise,
        )
    }

    pub fn with_signals(signals: Vec<Box<dyn Signal>>, noise: DiversificationNoise) -> Self {
        Self { signals, noise }
    }

    pub fn noise(&self) -> &DiversificationNoise {
        &self.noise
    }

    /// Scores one candidate against the user's history and the batch signals
    pub fn score(
        &self,
        candidate: &CatalogItem,
        history: &PurchaseHistorySummary,
        popularity: &HashMap<i64, f64>,
        sustainability: &HashMap<i64, f64>,
        rng: &mut dyn RngCore,
    ) -> RecommendationReasoning {
        let ctx = ScoringContext {
            history,
            popularity,
            sustainability,
            noise: &self.noise,
        };

        let mut components = ComponentScores::default();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for signal in &self.signals {
            let value = signal
                .score(candidate, &ctx, rng)
                .clamp(MIN_SCORE, MAX_SCORE);
            *component_mut(&mut components, signal.kind()) = value;
            weighted += signal.weight() * value;
            total_weight += signal.weight();
        }

        let base = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        };
        // Jitter may push a candidate across a tier boundary
        let final_score = (base + self.noise.final_offset(rng)).clamp(MIN_SCORE, MAX_SCORE);

        RecommendationReasoning {
            components,
            final_score,
            factors: reasoning_factors(&components),
            confidence: self.confidence(candidate, &ctx, rng),
        }
    }

    fn confidence(
        &self,
        candidate: &CatalogItem,
        ctx: &ScoringContext<'_>,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let history = if ctx.history.is_new_user() {
            self.noise.missing_confidence(rng)
        } else {
            0.3 + 0.7 * (f64::from(ctx.history.total_items) / FULL_HISTORY_DEPTH).min(1.0)
        };

        let sustainability = match ctx.sustainability_of(candidate.id) {
            Some(_) => SUSTAINABILITY_PRESENT_CONFIDENCE,
            None => self.noise.missing_confidence(rng),
        };

        let popularity = match ctx.popularity_of(candidate.id) {
            Some(_) => POPULARITY_PRESENT_CONFIDENCE,
            None => self.noise.missing_confidence(rng),
        };

        ((history + sustainability + popularity) / 3.0).clamp(0.0, 1.0)
    }
}

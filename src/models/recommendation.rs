use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Qualitative bucket derived purely from a final score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Premium,
    Good,
    Basic,
}

impl Tier {
    pub const PREMIUM_THRESHOLD: f64 = 8.0;
    pub const GOOD_THRESHOLD: f64 = 6.0;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::PREMIUM_THRESHOLD {
            Tier::Premium
        } else if score >= Self::GOOD_THRESHOLD {
            Tier::Good
        } else {
            Tier::Basic
        }
    }
}

/// Per-signal scores on the 0-10 scale
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentScores {
    pub purchase_history: f64,
    pub sustainability: f64,
    pub popularity: f64,
    pub category_affinity: f64,
}

/// Structured explanation of why a product was scored the way it was
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationReasoning {
    #[serde(flatten)]
    pub components: ComponentScores,
    pub final_score: f64,
    pub factors: Vec<String>,
    pub confidence: f64,
}

/// Which stage of the fallback chain produced a recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Primary,
    AdditionalReal,
    RandomFallback,
    Synthetic,
}

impl RecommendationSource {
    /// Only the primary stage reflects the user's history
    pub fn is_personalized(self) -> bool {
        matches!(self, RecommendationSource::Primary)
    }
}

/// Denormalized product data embedded in a recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    /// `None` for synthetic placeholders that do not exist in the catalog
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub brand: Option<String>,
    pub category_name: Option<String>,
    pub image_url: String,
    pub in_stock: bool,
}

/// A single recommendation as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationContext {
    pub product: ProductSnapshot,
    pub score: f64,
    pub tier: Tier,
    pub reasoning: RecommendationReasoning,
    pub source: RecommendationSource,
    pub personalized: bool,
    pub generated_at: DateTime<Utc>,
}

/// Reasoning paired with generated prose for a single product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Explanation {
    pub product_id: i64,
    pub reasoning: RecommendationReasoning,
    pub narrative: String,
}

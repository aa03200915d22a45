use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Loyalty gained per interaction with a brand
pub const BRAND_LOYALTY_STEP: f64 = 0.1;
/// Upper bound for any brand loyalty score
pub const BRAND_LOYALTY_CAP: f64 = 1.0;
/// Smoothing factor for the sustainability preference moving average
pub const SUSTAINABILITY_PREFERENCE_ALPHA: f64 = 0.1;

/// Kind of shopper interaction that feeds the profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    AddToCart,
    Wishlist,
    Purchase,
}

/// An interaction reported by the storefront
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub product_id: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Product sustainability score (0-100), when the storefront knows it
    #[serde(default)]
    pub sustainability_score: Option<f64>,
}

/// Persisted, evolving shopping profile for a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserShoppingContext {
    pub user_id: Uuid,
    /// Categories in the order they were first seen
    pub preferred_categories: Vec<i64>,
    pub category_frequency: HashMap<i64, u32>,
    /// Per-brand loyalty in [0, 1]
    pub brand_loyalty: HashMap<String, f64>,
    pub sustainability_preference: f64,
    pub price_sensitivity: f64,
    pub last_updated: DateTime<Utc>,
}

impl UserShoppingContext {
    /// Creates an empty profile for a user seen for the first time
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            preferred_categories: Vec::new(),
            category_frequency: HashMap::new(),
            brand_loyalty: HashMap::new(),
            sustainability_preference: 0.5,
            price_sensitivity: 0.5,
            last_updated: Utc::now(),
        }
    }

    /// Merges an interaction into the profile
    ///
    /// Not idempotent: applying the same event twice counts it twice.
    pub fn apply(&mut self, event: &InteractionEvent) {
        if let Some(category_id) = event.category_id {
            *self.category_frequency.entry(category_id).or_insert(0) += 1;
            if !self.preferred_categories.contains(&category_id) {
                self.preferred_categories.push(category_id);
            }
        }

        if let Some(brand) = event.brand.as_deref().filter(|b| !b.trim().is_empty()) {
            let loyalty = self.brand_loyalty.entry(brand.to_string()).or_insert(0.0);
            *loyalty = (*loyalty + BRAND_LOYALTY_STEP).min(BRAND_LOYALTY_CAP);
        }

        if let Some(score) = event.sustainability_score.filter(|s| s.is_finite()) {
            let target = (score / 100.0).clamp(0.0, 1.0);
            self.sustainability_preference = (1.0 - SUSTAINABILITY_PREFERENCE_ALPHA)
                * self.sustainability_preference
                + SUSTAINABILITY_PREFERENCE_ALPHA * target;
        }

        self.last_updated = Utc::now();
    }
}

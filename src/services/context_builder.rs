use chrono::{DateTime, Utc};

use crate::{
    models::{
        CatalogItem, ProductSnapshot, RecommendationContext, RecommendationReasoning,
        RecommendationSource, Tier,
    },
    services::{
        providers::PLACEHOLDER_IMAGE,
        scoring::{MAX_SCORE, MIN_SCORE},
    },
};

/// Stand-in product used when the catalog cannot supply enough items
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub name: String,
    pub description: String,
    pub price: f64,
}

impl Placeholder {
    /// Generic placeholder numbered by its position in the response
    pub fn numbered(position: usize) -> Self {
        Self {
            name: format!("Recommended Product {}", position),
            description: "A curated pick while we learn more about your preferences".to_string(),
            price: 0.0,
        }
    }
}

/// Either a real catalog item or a synthetic placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendedProduct {
    Catalog(CatalogItem),
    Placeholder(Placeholder),
}

impl RecommendedProduct {
    pub fn catalog_id(&self) -> Option<i64> {
        match self {
            RecommendedProduct::Catalog(item) => Some(item.id),
            RecommendedProduct::Placeholder(_) => None,
        }
    }
}

/// Wraps a product and its reasoning into the record returned to callers
///
/// The tier is derived from the final score alone. Products without an image
/// reference get [`PLACEHOLDER_IMAGE`].
pub fn build(
    product: &RecommendedProduct,
    reasoning: RecommendationReasoning,
    source: RecommendationSource,
    image_url: Option<&str>,
    generated_at: DateTime<Utc>,
) -> RecommendationContext {
    let image_url = image_url.unwrap_or(PLACEHOLDER_IMAGE).to_string();

    let snapshot = match product {
        RecommendedProduct::Catalog(item) => ProductSnapshot {
            id: Some(item.id),
            name: item.name.clone(),
            description: None,
            price: item.price,
            brand: item.brand.clone(),
            category_name: item.category_name.clone(),
            image_url,
            in_stock: item.in_stock,
        },
        RecommendedProduct::Placeholder(placeholder) => ProductSnapshot {
            id: None,
            name: placeholder.name.clone(),
            description: Some(placeholder.description.clone()),
            price: placeholder.price,
            brand: None,
            category_name: None,
            image_url,
            in_stock: false,
        },
    };

    let score = reasoning.final_score.clamp(MIN_SCORE, MAX_SCORE);

    RecommendationContext {
        product: snapshot,
        score,
        tier: Tier::from_score(score),
        reasoning,
        source,
        personalized: source.is_personalized(),
        generated_at,
    }
}

/// Collaborator abstractions consumed by the recommendation engine
///
/// The engine never talks to storage directly. Catalog, order, rating, image
/// and profile data all arrive through these traits so the Postgres/Redis
/// adapters and the in-memory store are interchangeable.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CatalogItem, OrderLine, OrderStatus, RatingEntry, SalesStat, UserShoppingContext},
};

pub mod in_memory;

pub use in_memory::InMemoryStore;

/// Image reference used when a product has no stored image
pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder-product.png";

/// Order in which the catalog returns candidate items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidateOrdering {
    MostRecent,
    IdDescending,
    #[default]
    Random,
}

impl CandidateOrdering {
    pub const ALL: [CandidateOrdering; 3] = [
        CandidateOrdering::MostRecent,
        CandidateOrdering::IdDescending,
        CandidateOrdering::Random,
    ];

    /// Picks an ordering uniformly so repeated calls see different pools
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Filter for in-stock catalog candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateQuery {
    pub limit: usize,
    pub ordering: CandidateOrdering,
    pub exclude_ids: Vec<i64>,
    pub category_id: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl CandidateQuery {
    pub fn new(limit: usize, ordering: CandidateOrdering) -> Self {
        Self {
            limit,
            ordering,
            ..Default::default()
        }
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    /// True when an item passes the category, price and exclusion filters
    pub fn admits(&self, item: &CatalogItem) -> bool {
        if self.exclude_ids.contains(&item.id) {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if item.category_id != Some(category_id) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| item.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| item.price > max) {
            return false;
        }
        true
    }
}

/// Read access to the product catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// In-stock, positive-quantity items matching the query, at most `query.limit`
    async fn candidates(&self, query: &CandidateQuery) -> AppResult<Vec<CatalogItem>>;

    /// Looks up a single product regardless of stock
    async fn product(&self, product_id: i64) -> AppResult<Option<CatalogItem>>;
}

/// Read access to order data
#[async_trait]
pub trait PurchaseHistorySource: Send + Sync {
    /// Line items of the user's orders placed since `since` in one of `statuses`
    async fn order_lines(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[OrderStatus],
    ) -> AppResult<Vec<OrderLine>>;

    /// Units sold and distinct orders per product since `since`
    async fn sales_stats(
        &self,
        product_ids: &[i64],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SalesStat>>;
}

/// Read access to environmental ratings
#[async_trait]
pub trait SustainabilitySource: Send + Sync {
    async fn ratings(&self, product_ids: &[i64]) -> AppResult<Vec<RatingEntry>>;
}

/// Read access to product imagery
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// First image per product; products without images are absent from the map
    async fn first_images(&self, product_ids: &[i64]) -> AppResult<HashMap<i64, String>>;
}

/// Persistence for user shopping profiles
#[async_trait]
pub trait UserContextStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> AppResult<Option<UserShoppingContext>>;

    /// Overwrites the stored profile (last write wins)
    async fn save(&self, context: &UserShoppingContext) -> AppResult<()>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}

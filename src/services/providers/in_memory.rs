use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CandidateOrdering, CandidateQuery, CatalogSource, ImageSource, PurchaseHistorySource,
    SustainabilitySource, UserContextStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, OrderLine, OrderStatus, RatingEntry, SalesStat, UserShoppingContext},
};

/// Process-local implementation of every collaborator
///
/// Backs the test suite and local runs without Postgres or Redis.
#[derive(Default)]
pub struct InMemoryStore {
    products: RwLock<Vec<CatalogItem>>,
    /// Order lines with their owning user
    order_lines: RwLock<Vec<(Uuid, OrderLine)>>,
    ratings: RwLock<Vec<RatingEntry>>,
    images: RwLock<HashMap<i64, Vec<String>>>,
    contexts: RwLock<HashMap<Uuid, UserShoppingContext>>,
    /// When set, every read and every context write fails
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(mut self, products: Vec<CatalogItem>) -> Self {
        self.products = RwLock::new(products);
        self
    }

    pub fn with_order_lines(mut self, user_id: Uuid, lines: Vec<OrderLine>) -> Self {
        self.order_lines
            .get_mut()
            .extend(lines.into_iter().map(|line| (user_id, line)));
        self
    }

    pub fn with_ratings(mut self, ratings: Vec<RatingEntry>) -> Self {
        self.ratings.get_mut().extend(ratings);
        self
    }

    pub fn with_image(mut self, product_id: i64, url: &str) -> Self {
        self.images
            .get_mut()
            .entry(product_id)
            .or_default()
            .push(url.to_string());
        self
    }

    pub async fn insert_product(&self, product: CatalogItem) {
        self.products.write().await.push(product);
    }

    /// Simulates a storage outage across all collaborators
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("in-memory store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for InMemoryStore {
    async fn candidates(&self, query: &CandidateQuery) -> AppResult<Vec<CatalogItem>> {
        self.check_available()?;

        let mut items: Vec<CatalogItem> = self
            .products
            .read()
            .await
            .iter()
            .filter(|item| item.in_stock && item.quantity > 0)
            .filter(|item| query.admits(item))
            .cloned()
            .collect();

        match query.ordering {
            CandidateOrdering::MostRecent => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            CandidateOrdering::IdDescending => items.sort_by(|a, b| b.id.cmp(&a.id)),
            CandidateOrdering::Random => items.shuffle(&mut rand::thread_rng()),
        }

        items.truncate(query.limit);
        Ok(items)
    }

    async fn product(&self, product_id: i64) -> AppResult<Option<CatalogItem>> {
        self.check_available()?;
        Ok(self
            .products
            .read()
            .await
            .iter()
            .find(|item| item.id == product_id)
            .cloned())
    }
}

#[async_trait]
impl PurchaseHistorySource for InMemoryStore {
    async fn order_lines(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[OrderStatus],
    ) -> AppResult<Vec<OrderLine>> {
        self.check_available()?;
        Ok(self
            .order_lines
            .read()
            .await
            .iter()
            .filter(|(owner, line)| {
                *owner == user_id && line.ordered_at >= since && statuses.contains(&line.status)
            })
            .map(|(_, line)| line.clone())
            .collect())
    }

    async fn sales_stats(
        &self,
        product_ids: &[i64],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SalesStat>> {
        self.check_available()?;

        let wanted: HashSet<i64> = product_ids.iter().copied().collect();
        let mut stats: HashMap<i64, SalesStat> = HashMap::new();

        // Each stored line stands for one order
        for (_, line) in self.order_lines.read().await.iter() {
            if !wanted.contains(&line.product_id)
                || line.ordered_at < since
                || !line.status.counts_toward_history()
            {
                continue;
            }
            let stat = stats.entry(line.product_id).or_insert(SalesStat {
                product_id: line.product_id,
                units_sold: 0,
                order_count: 0,
            });
            stat.units_sold += u64::from(line.quantity);
            stat.order_count += 1;
        }

        Ok(stats.into_values().collect())
    }
}

#[async_trait]
impl SustainabilitySource for InMemoryStore {
    async fn ratings(&self, product_ids: &[i64]) -> AppResult<Vec<RatingEntry>> {
        self.check_available()?;
        Ok(self
            .ratings
            .read()
            .await
            .iter()
            .filter(|rating| product_ids.contains(&rating.product_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ImageSource for InMemoryStore {
    async fn first_images(&self, product_ids: &[i64]) -> AppResult<HashMap<i64, String>> {
        self.check_available()?;
        let images = self.images.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| {
                images
                    .get(id)
                    .and_then(|urls| urls.first())
                    .map(|url| (*id, url.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl UserContextStore for InMemoryStore {
    async fn load(&self, user_id: Uuid) -> AppResult<Option<UserShoppingContext>> {
        self.check_available()?;
        Ok(self.contexts.read().await.get(&user_id).cloned())
    }

    async fn save(&self, context: &UserShoppingContext) -> AppResult<()> {
        self.check_available()?;
        self.contexts
            .write()
            .await
            .insert(context.user_id, context.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

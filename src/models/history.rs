use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Histogram of purchased units by unit price range
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceBuckets {
    /// Under 25
    pub budget: u32,
    /// 25 up to 75
    pub mid: u32,
    /// 75 up to 200
    pub premium: u32,
    /// 200 and above
    pub luxury: u32,
}

impl PriceBuckets {
    pub fn record(&mut self, unit_price: f64, quantity: u32) {
        let bucket = if unit_price < 25.0 {
            &mut self.budget
        } else if unit_price < 75.0 {
            &mut self.mid
        } else if unit_price < 200.0 {
            &mut self.premium
        } else {
            &mut self.luxury
        };
        *bucket += quantity;
    }
}

/// Aggregate view over a user's recent purchases
///
/// Computed fresh for every call and never persisted. The `Default` value is
/// the baseline used for users without any qualifying orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurchaseHistorySummary {
    pub category_counts: HashMap<i64, u32>,
    pub brand_counts: HashMap<String, u32>,
    pub total_items: u32,
    pub total_spent: f64,
    pub avg_item_price: f64,
    pub price_buckets: PriceBuckets,
}

impl PurchaseHistorySummary {
    pub fn is_new_user(&self) -> bool {
        self.total_items == 0
    }

    /// Share of purchased units that fell in the given category
    pub fn category_ratio(&self, category_id: Option<i64>) -> f64 {
        match category_id {
            Some(id) if self.total_items > 0 => {
                f64::from(self.category_counts.get(&id).copied().unwrap_or(0))
                    / f64::from(self.total_items)
            }
            _ => 0.0,
        }
    }

    /// Share of purchased units that carried the given brand
    pub fn brand_ratio(&self, brand: Option<&str>) -> f64 {
        match brand {
            Some(name) if self.total_items > 0 => {
                f64::from(self.brand_counts.get(name).copied().unwrap_or(0))
                    / f64::from(self.total_items)
            }
            _ => 0.0,
        }
    }
}

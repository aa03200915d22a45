use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{OrderLine, PurchaseHistorySummary, RatingEntry, SalesStat};

/// Points available to the sales-volume component of popularity
pub const SALES_VOLUME_POINTS: f64 = 6.0;
/// Points available to the order-frequency component of popularity
pub const ORDER_FREQUENCY_POINTS: f64 = 4.0;
/// Upper bound of the popularity scale
pub const MAX_POPULARITY: f64 = 10.0;

/// Aggregates a user's recent order lines
///
/// Like the other extractors here, a pure function of its inputs. The engine
/// fetches the data and hands it over in one batch per call.
#[derive(Debug, Clone, Copy)]
pub struct PurchaseHistoryAnalyzer {
    pub lookback_days: i64,
}

impl Default for PurchaseHistoryAnalyzer {
    fn default() -> Self {
        Self { lookback_days: 90 }
    }
}

impl PurchaseHistoryAnalyzer {
    pub fn new(lookback_days: i64) -> Self {
        Self { lookback_days }
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.lookback_days)
    }

    /// Builds the summary; an empty slice yields the baseline summary
    ///
    /// Lines from cancelled or refunded orders are ignored even if the
    /// collaborator returned them.
    pub fn summarize(&self, lines: &[OrderLine]) -> PurchaseHistorySummary {
        let mut summary = PurchaseHistorySummary::default();

        for line in lines {
            if !line.status.counts_toward_history() || line.quantity == 0 {
                continue;
            }
            if !line.unit_price.is_finite() || line.unit_price < 0.0 {
                tracing::warn!(
                    product_id = line.product_id,
                    unit_price = line.unit_price,
                    "Skipping order line with invalid price"
                );
                continue;
            }

            if let Some(category_id) = line.category_id {
                *summary.category_counts.entry(category_id).or_insert(0) += line.quantity;
            }
            if let Some(brand) = line.brand.as_ref().filter(|b| !b.trim().is_empty()) {
                *summary.brand_counts.entry(brand.clone()).or_insert(0) += line.quantity;
            }

            summary.total_items += line.quantity;
            summary.total_spent += line.unit_price * f64::from(line.quantity);
            summary.price_buckets.record(line.unit_price, line.quantity);
        }

        if summary.total_items > 0 {
            summary.avg_item_price = summary.total_spent / f64::from(summary.total_items);
        }

        summary
    }
}

/// Normalized 0-10 popularity from sales in a recent window
#[derive(Debug, Clone, Copy)]
pub struct PopularityScorer {
    pub window_days: i64,
}

impl Default for PopularityScorer {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl PopularityScorer {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.window_days)
    }

    /// Scores one batch; both components are normalized against the batch maximum
    ///
    /// Products without any sales in the window are left out of the map.
    pub fn score(&self, stats: &[SalesStat]) -> HashMap<i64, f64> {
        let max_units = stats.iter().map(|s| s.units_sold).max().unwrap_or(0);
        let max_orders = stats.iter().map(|s| s.order_count).max().unwrap_or(0);

        stats
            .iter()
            .filter(|s| s.units_sold > 0 || s.order_count > 0)
            .map(|s| {
                let volume = normalized(s.units_sold, max_units) * SALES_VOLUME_POINTS;
                let frequency = normalized(s.order_count, max_orders) * ORDER_FREQUENCY_POINTS;
                (s.product_id, (volume + frequency).min(MAX_POPULARITY))
            })
            .collect()
    }
}

fn normalized(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        value as f64 / max as f64
    }
}

/// Mean environmental rating per product (0-100)
pub struct SustainabilityScorer;

impl SustainabilityScorer {
    /// Every requested id gets an entry; products without ratings score 0.0
    pub fn score(product_ids: &[i64], ratings: &[RatingEntry]) -> HashMap<i64, f64> {
        let mut sums: HashMap<i64, (f64, u32)> = HashMap::new();
        for rating in ratings.iter().filter(|r| r.value.is_finite()) {
            let entry = sums.entry(rating.product_id).or_insert((0.0, 0));
            entry.0 += rating.value;
            entry.1 += 1;
        }

        product_ids
            .iter()
            .map(|id| {
                let mean = match sums.get(id) {
                    Some((sum, count)) if *count > 0 => (sum / f64::from(*count)).clamp(0.0, 100.0),
                    _ => 0.0,
                };
                (*id, mean)
            })
            .collect()
    }
}

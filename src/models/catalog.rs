use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a catalog record cannot be scored
#[derive(Debug, Error, PartialEq)]
pub enum CatalogRecordError {
    #[error("product {0} has an empty name")]
    EmptyName(i64),
    #[error("product {id} has an invalid price {price}")]
    InvalidPrice { id: i64, price: f64 },
    #[error("product {0} is out of stock")]
    OutOfStock(i64),
}

/// A sellable product as reported by the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub brand: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub in_stock: bool,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Checks that the record is consistent enough to be recommended
    pub fn validate(&self) -> Result<(), CatalogRecordError> {
        if self.name.trim().is_empty() {
            return Err(CatalogRecordError::EmptyName(self.id));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(CatalogRecordError::InvalidPrice {
                id: self.id,
                price: self.price,
            });
        }
        if !self.in_stock || self.quantity <= 0 {
            return Err(CatalogRecordError::OutOfStock(self.id));
        }
        Ok(())
    }
}

/// Order lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// States whose line items count toward a user's purchase history
    pub const HISTORY_STATES: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];

    pub fn counts_toward_history(self) -> bool {
        Self::HISTORY_STATES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" | "canceled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

/// One purchased line item belonging to a user's order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub product_id: i64,
    pub category_id: Option<i64>,
    pub brand: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
}

/// Aggregated sales of one product inside the popularity window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesStat {
    pub product_id: i64,
    pub units_sold: u64,
    pub order_count: u64,
}

/// A single environmental rating entry for a product (0-100)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingEntry {
    pub product_id: i64,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CatalogItem {
        CatalogItem {
            id: 1,
            name: "Bamboo Toothbrush".to_string(),
            price: 4.5,
            brand: Some("Greenly".to_string()),
            category_id: Some(3),
            category_name: Some("Personal Care".to_string()),
            in_stock: true,
            quantity: 12,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_consistent_record() {
        assert_eq!(item().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let mut record = item();
        record.name = "  ".to_string();
        assert_eq!(record.validate(), Err(CatalogRecordError::EmptyName(1)));
    }

    #[test]
    fn test_validate_rejects_nan_price() {
        let mut record = item();
        record.price = f64::NAN;
        assert!(matches!(
            record.validate(),
            Err(CatalogRecordError::InvalidPrice { id: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let mut record = item();
        record.quantity = 0;
        assert_eq!(record.validate(), Err(CatalogRecordError::OutOfStock(1)));
    }

    #[test]
    fn test_cancelled_and_refunded_do_not_count() {
        assert!(!OrderStatus::Cancelled.counts_toward_history());
        assert!(!OrderStatus::Refunded.counts_toward_history());
        assert!(OrderStatus::Delivered.counts_toward_history());
        assert!(OrderStatus::Pending.counts_toward_history());
    }

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in OrderStatus::HISTORY_STATES {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("canceled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("lost"), None);
    }

    #[test]
    fn test_order_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::Shipped).unwrap();
        assert_eq!(json, "\"shipped\"");
    }
}

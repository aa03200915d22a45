use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CatalogItem, OrderLine, OrderStatus, RatingEntry, SalesStat},
    services::providers::{
        CandidateOrdering, CandidateQuery, CatalogSource, ImageSource, PurchaseHistorySource,
        SustainabilitySource,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const PRODUCT_COLUMNS: &str = r#"
    p.id,
    p.name,
    p.price::float8 AS price,
    p.brand,
    p.category_id,
    c.name AS category_name,
    p.in_stock,
    p.quantity,
    p.created_at
"#;

#[derive(Debug, FromRow)]
struct OrderLineRow {
    product_id: i64,
    category_id: Option<i64>,
    brand: Option<String>,
    quantity: i32,
    unit_price: f64,
    status: String,
    ordered_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SalesStatRow {
    product_id: i64,
    units_sold: i64,
    order_count: i64,
}

/// Catalog, order, rating and image collaborators backed by the shop database
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn order_clause(ordering: CandidateOrdering) -> &'static str {
        match ordering {
            CandidateOrdering::MostRecent => "ORDER BY p.created_at DESC",
            CandidateOrdering::IdDescending => "ORDER BY p.id DESC",
            CandidateOrdering::Random => "ORDER BY random()",
        }
    }
}

#[async_trait]
impl CatalogSource for PostgresStore {
    async fn candidates(&self, query: &CandidateQuery) -> AppResult<Vec<CatalogItem>> {
        let sql = format!(
            r#"
            SELECT {columns}
            FROM products p
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE p.in_stock = true
              AND p.quantity > 0
              AND NOT (p.id = ANY($1))
              AND ($2::bigint IS NULL OR p.category_id = $2)
              AND ($3::float8 IS NULL OR p.price >= $3)
              AND ($4::float8 IS NULL OR p.price <= $4)
            {order}
            LIMIT $5
            "#,
            columns = PRODUCT_COLUMNS,
            order = Self::order_clause(query.ordering),
        );

        let items = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(&query.exclude_ids)
            .bind(query.category_id)
            .bind(query.min_price)
            .bind(query.max_price)
            .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            ordering = ?query.ordering,
            excluded = query.exclude_ids.len(),
            fetched = items.len(),
            "Fetched catalog candidates"
        );

        Ok(items)
    }

    async fn product(&self, product_id: i64) -> AppResult<Option<CatalogItem>> {
        let sql = format!(
            r#"
            SELECT {columns}
            FROM products p
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE p.id = $1
            "#,
            columns = PRODUCT_COLUMNS,
        );

        let item = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }
}

#[async_trait]
impl PurchaseHistorySource for PostgresStore {
    async fn order_lines(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[OrderStatus],
    ) -> AppResult<Vec<OrderLine>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();

        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT oi.product_id,
                   p.category_id,
                   p.brand,
                   oi.quantity,
                   oi.price::float8 AS unit_price,
                   o.status,
                   o.created_at AS ordered_at
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN products p ON p.id = oi.product_id
            WHERE o.user_id = $1
              AND o.created_at >= $2
              AND o.status = ANY($3)
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(status) = OrderStatus::parse(&row.status) else {
                tracing::warn!(
                    product_id = row.product_id,
                    status = %row.status,
                    "Unknown order status, skipping line"
                );
                continue;
            };
            lines.push(OrderLine {
                product_id: row.product_id,
                category_id: row.category_id,
                brand: row.brand,
                quantity: u32::try_from(row.quantity).unwrap_or(0),
                unit_price: row.unit_price,
                status,
                ordered_at: row.ordered_at,
            });
        }

        Ok(lines)
    }

    async fn sales_stats(
        &self,
        product_ids: &[i64],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<SalesStat>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let statuses: Vec<&str> = OrderStatus::HISTORY_STATES
            .iter()
            .map(|s| s.as_str())
            .collect();

        let rows = sqlx::query_as::<_, SalesStatRow>(
            r#"
            SELECT oi.product_id,
                   COALESCE(SUM(oi.quantity), 0)::bigint AS units_sold,
                   COUNT(DISTINCT oi.order_id)::bigint AS order_count
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE oi.product_id = ANY($1)
              AND o.created_at >= $2
              AND o.status = ANY($3)
            GROUP BY oi.product_id
            "#,
        )
        .bind(product_ids)
        .bind(since)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SalesStat {
                product_id: row.product_id,
                units_sold: u64::try_from(row.units_sold).unwrap_or(0),
                order_count: u64::try_from(row.order_count).unwrap_or(0),
            })
            .collect())
    }
}

#[async_trait]
impl SustainabilitySource for PostgresStore {
    async fn ratings(&self, product_ids: &[i64]) -> AppResult<Vec<RatingEntry>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT product_id, value::float8
            FROM sustainability_ratings
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, value)| RatingEntry { product_id, value })
            .collect())
    }
}

#[async_trait]
impl ImageSource for PostgresStore {
    async fn first_images(&self, product_ids: &[i64]) -> AppResult<HashMap<i64, String>> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (product_id) product_id, url
            FROM product_images
            WHERE product_id = ANY($1)
            ORDER BY product_id, position ASC, id ASC
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

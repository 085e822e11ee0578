//! Shipping methods and promotion codes.
use chrono::{DateTime, Utc};
use shop_common::Money;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewShippingMethod, Promotion, ShippingMethod},
    traits::StorefrontError,
};

#[derive(FromRow)]
struct ShippingMethodRow {
    id: i64,
    name: String,
    base_cost: Money,
    cost_per_kg: Money,
    free_over: Option<Money>,
    countries: String,
    is_active: bool,
}

impl TryFrom<ShippingMethodRow> for ShippingMethod {
    type Error = StorefrontError;

    fn try_from(row: ShippingMethodRow) -> Result<Self, Self::Error> {
        let countries = serde_json::from_str::<Vec<String>>(&row.countries)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            base_cost: row.base_cost,
            cost_per_kg: row.cost_per_kg,
            free_over: row.free_over,
            countries,
            is_active: row.is_active,
        })
    }
}

pub async fn insert_shipping_method(
    method: NewShippingMethod,
    conn: &mut SqliteConnection,
) -> Result<ShippingMethod, StorefrontError> {
    let countries = serde_json::to_string(&method.countries)?;
    let row: ShippingMethodRow = sqlx::query_as(
        r#"
            INSERT INTO shipping_methods (name, base_cost, cost_per_kg, free_over, countries, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(method.name)
    .bind(method.base_cost)
    .bind(method.cost_per_kg)
    .bind(method.free_over)
    .bind(countries)
    .bind(method.is_active)
    .fetch_one(conn)
    .await?;
    row.try_into()
}

pub async fn fetch_shipping_method(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ShippingMethod>, StorefrontError> {
    let row: Option<ShippingMethodRow> =
        sqlx::query_as("SELECT * FROM shipping_methods WHERE id = $1").bind(id).fetch_optional(conn).await?;
    row.map(ShippingMethod::try_from).transpose()
}

#[derive(FromRow)]
struct PromotionRow {
    code: String,
    percent_off_bps: Option<i64>,
    amount_off: Option<Money>,
    min_subtotal: Money,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        Self {
            code: row.code,
            percent_off_bps: row.percent_off_bps.and_then(|bps| u32::try_from(bps).ok()),
            amount_off: row.amount_off,
            min_subtotal: row.min_subtotal,
            expires_at: row.expires_at,
            is_active: row.is_active,
        }
    }
}

/// Inserts the promotion, replacing any existing promotion with the same code.
pub async fn upsert_promotion(promotion: Promotion, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT OR REPLACE INTO promotions (code, percent_off_bps, amount_off, min_subtotal, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(promotion.code)
    .bind(promotion.percent_off_bps.map(i64::from))
    .bind(promotion.amount_off)
    .bind(promotion.min_subtotal)
    .bind(promotion.expires_at)
    .bind(promotion.is_active)
    .execute(conn)
    .await?;
    Ok(())
}

/// Promotion codes are case-insensitive.
pub async fn fetch_promotion(code: &str, conn: &mut SqliteConnection) -> Result<Option<Promotion>, sqlx::Error> {
    let row: Option<PromotionRow> =
        sqlx::query_as("SELECT * FROM promotions WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(row.map(Promotion::from))
}

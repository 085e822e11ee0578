use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, Product};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (name, slug, image, price, stock_quantity, weight_grams, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(product.name)
    .bind(product.slug)
    .bind(product.image)
    .bind(product.price)
    .bind(product.stock_quantity)
    .bind(product.weight_grams)
    .bind(product.is_active)
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

/// Takes `quantity` units out of stock, but only if that many remain. Returns `false` (and changes nothing) if there
/// is not enough stock.
///
/// The check and the decrement are a single statement, so two orders competing for the last unit cannot both succeed.
pub async fn reserve_stock(product_id: i64, quantity: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE products SET stock_quantity = stock_quantity - $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND stock_quantity >= $1
        "#,
    )
    .bind(quantity)
    .bind(product_id)
    .execute(conn)
    .await?;
    trace!("📦️ Reserve {quantity} of product #{product_id}: {} rows affected", result.rows_affected());
    Ok(result.rows_affected() == 1)
}

pub async fn restock(product_id: i64, quantity: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(quantity)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

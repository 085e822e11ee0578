use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::db_types::{Cart, CartItem};

#[derive(FromRow)]
struct CartRow {
    product_id: i64,
    name: String,
    quantity: i64,
    updated_at: DateTime<Utc>,
}

/// The customer's cart, or `None` if they have nothing in it.
pub async fn fetch_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<Cart>, sqlx::Error> {
    let rows: Vec<CartRow> =
        sqlx::query_as("SELECT product_id, name, quantity, updated_at FROM cart_items WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_all(conn)
            .await?;
    let Some(updated_at) = rows.iter().map(|r| r.updated_at).max() else {
        return Ok(None);
    };
    let items = rows.into_iter().map(|r| CartItem { product_id: r.product_id, name: r.name, quantity: r.quantity });
    Ok(Some(Cart { customer_id: customer_id.to_string(), items: items.collect(), updated_at }))
}

/// Replaces the contents of the customer's cart.
pub async fn set_cart(customer_id: &str, items: &[CartItem], conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    clear_cart(customer_id, &mut *conn).await?;
    for item in items {
        sqlx::query("INSERT INTO cart_items (customer_id, product_id, name, quantity) VALUES ($1, $2, $3, $4)")
            .bind(customer_id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn remove_cart_line(customer_id: &str, product_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND product_id = $2")
        .bind(customer_id)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn clear_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(customer_id).execute(conn).await?;
    Ok(())
}

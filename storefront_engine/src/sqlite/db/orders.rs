//! Orders are stored as whole JSON documents, with a handful of projected columns for lookups. The `id` and `version`
//! columns are authoritative and always override the values inside the document.
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use super::is_unique_violation;
use crate::{
    db_types::{Order, PaymentMethodType},
    traits::{Pagination, StorefrontError},
};

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    version: i64,
    document: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorefrontError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let mut order = serde_json::from_str::<Order>(&row.document)?;
        order.id = row.id;
        order.version = row.version;
        Ok(order)
    }
}

fn payment_reference(order: &Order) -> Option<&str> {
    Some(order.payment_details.reference()).filter(|r| !r.is_empty())
}

/// Inserts a new order, assigning its id and setting its version to 1. This is not atomic. Embed the call inside a
/// transaction (passing `&mut *tx`) if it must succeed or fail along with other statements.
///
/// Fails with [`StorefrontError::DuplicatePayment`] if the payment reference is already attached to an order.
pub async fn insert_order(mut order: Order, conn: &mut SqliteConnection) -> Result<Order, StorefrontError> {
    order.version = 1;
    let reference = payment_reference(&order).map(String::from);
    let result = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                customer_email,
                status,
                payment_status,
                payment_method,
                payment_reference,
                total_amount,
                document,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{}', 1, $9, $10)
            RETURNING id;
        "#,
    )
    .bind(&order.order_number)
    .bind(&order.customer_id)
    .bind(&order.customer_email)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.payment_method.kind.as_str())
    .bind(&reference)
    .bind(order.total_amount)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(&mut *conn)
    .await;
    order.id = match result {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            debug!("📝️ Payment reference {reference:?} is already attached to an order");
            return Err(StorefrontError::DuplicatePayment(reference.unwrap_or_default()));
        },
        Err(e) => return Err(e.into()),
    };
    let document = serde_json::to_string(&order)?;
    sqlx::query("UPDATE orders SET document = $1 WHERE id = $2").bind(document).bind(order.id).execute(conn).await?;
    debug!("📝️ Order {} inserted with id {}", order.order_number, order.id);
    Ok(order)
}

/// Saves the order if the stored version matches `order.version`, bumping the version.
///
/// Fails with [`StorefrontError::ConcurrentModification`] if someone else saved the order first.
pub async fn update_order(mut order: Order, conn: &mut SqliteConnection) -> Result<Order, StorefrontError> {
    let expected = order.version;
    order.version += 1;
    let document = serde_json::to_string(&order)?;
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                status = $1,
                payment_status = $2,
                document = $3,
                version = $4,
                updated_at = $5
            WHERE id = $6 AND version = $7
        "#,
    )
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(document)
    .bind(order.version)
    .bind(order.updated_at)
    .bind(order.id)
    .bind(expected)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        debug!("📝️ Order #{} is no longer at version {expected}", order.id);
        return Err(StorefrontError::ConcurrentModification);
    }
    trace!("📝️ Order #{} saved at version {}", order.id, order.version);
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, StorefrontError> {
    let row: Option<OrderRow> = sqlx::query_as("SELECT id, version, document FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(Order::try_from).transpose()
}

pub async fn fetch_order_by_payment_reference(
    method: PaymentMethodType,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorefrontError> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT id, version, document FROM orders WHERE payment_method = $1 AND payment_reference = $2",
    )
    .bind(method.as_str())
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    row.map(Order::try_from).transpose()
}

/// Newest first.
pub async fn fetch_orders_for_customer(
    customer_id: &str,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Order>, i64), StorefrontError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
    let rows: Vec<OrderRow> = sqlx::query_as(
        r#"
            SELECT id, version, document FROM orders WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
        "#,
    )
    .bind(customer_id)
    .bind(i64::from(pagination.limit))
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    let orders = rows.into_iter().map(Order::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok((orders, total))
}

/// Unpaid crypto orders, oldest first.
pub async fn fetch_orders_awaiting_payment(conn: &mut SqliteConnection) -> Result<Vec<Order>, StorefrontError> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        r#"
            SELECT id, version, document FROM orders
            WHERE payment_status = 'pending' AND status = 'pending' AND payment_method IN ('bitcoin', 'monero')
            ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(Order::try_from).collect()
}

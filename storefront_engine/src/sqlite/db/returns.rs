use log::{debug, warn};
use sqlx::{FromRow, SqliteConnection};

use crate::{db_types::ReturnRequest, helpers::return_number_base, traits::StorefrontError};

#[derive(FromRow)]
struct ReturnRow {
    id: i64,
    return_request_number: i64,
    formatted_request_number: String,
    document: String,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = StorefrontError;

    fn try_from(row: ReturnRow) -> Result<Self, Self::Error> {
        let mut request = serde_json::from_str::<ReturnRequest>(&row.document)?;
        request.id = row.id;
        request.return_request_number = row.return_request_number;
        request.formatted_request_number = row.formatted_request_number;
        Ok(request)
    }
}

/// The highest daily sequence number. `RR-YYYYMMDD-NNNN` has room for four digits.
pub const MAX_DAILY_RETURN_REQUESTS: i64 = 9_999;

/// Inserts the return request and assigns its number: the next free number of the day it was submitted, counting up
/// from `YYYYMMDD * 10000 + 1`. Once the day's sequence is used up, no row is written and the request is refused.
///
/// The number is computed inside the INSERT statement itself. Call this inside a transaction.
pub async fn insert_return_request(
    mut request: ReturnRequest,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, StorefrontError> {
    let base = return_number_base(request.submitted_at);
    let inserted: Option<(i64, i64)> = sqlx::query_as(
        r#"
            INSERT INTO return_requests (
                return_request_number,
                order_id,
                customer_id,
                customer_email,
                status,
                document,
                created_at
            )
            SELECT next_number, $2, $3, $4, $5, '{}', $6 FROM (
                SELECT COALESCE(MAX(return_request_number), $1) + 1 AS next_number FROM return_requests
                    WHERE return_request_number > $1 AND return_request_number <= $1 + $7
            ) WHERE next_number <= $1 + $7
            RETURNING id, return_request_number;
        "#,
    )
    .bind(base)
    .bind(request.order_id)
    .bind(&request.customer_id)
    .bind(&request.customer_email)
    .bind(request.status.as_str())
    .bind(request.created_at)
    .bind(MAX_DAILY_RETURN_REQUESTS)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((id, number)) = inserted else {
        warn!("📝️ All {MAX_DAILY_RETURN_REQUESTS} return request numbers for today have been used");
        return Err(StorefrontError::InvalidState(
            "No more return requests can be accepted today. Please try again tomorrow".into(),
        ));
    };
    request.id = id;
    request.return_request_number = number;
    request.formatted_request_number = ReturnRequest::format_request_number(number);
    let document = serde_json::to_string(&request)?;
    sqlx::query("UPDATE return_requests SET formatted_request_number = $1, document = $2 WHERE id = $3")
        .bind(&request.formatted_request_number)
        .bind(document)
        .bind(id)
        .execute(conn)
        .await?;
    debug!("📝️ Return request {} saved with id {id}", request.formatted_request_number);
    Ok(request)
}

pub async fn fetch_return_request(id: i64, conn: &mut SqliteConnection) -> Result<Option<ReturnRequest>, StorefrontError> {
    let row: Option<ReturnRow> = sqlx::query_as(
        "SELECT id, return_request_number, formatted_request_number, document FROM return_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(ReturnRequest::try_from).transpose()
}

pub async fn fetch_return_requests_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReturnRequest>, StorefrontError> {
    let rows: Vec<ReturnRow> = sqlx::query_as(
        r#"
            SELECT id, return_request_number, formatted_request_number, document FROM return_requests
            WHERE order_id = $1 ORDER BY id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(ReturnRequest::try_from).collect()
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus, PaymentMethodType, PaymentStatus, RefundEntry};

/// What a payment observation did to its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// The payment was completed by this observation.
    Confirmed,
    /// The payment had already been completed. At most the confirmation count was updated.
    AlreadyConfirmed,
    /// Enough has been received but the transaction needs more confirmations.
    AwaitingConfirmations,
    /// Less than the expected amount (minus tolerance) has been received.
    Underpaid,
    /// The payment window closed before the payment was confirmed. The order has been cancelled.
    Expired,
    /// The order was already cancelled or its payment failed. Nothing was changed.
    OrderClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationResult {
    pub order: Order,
    pub outcome: ConfirmationOutcome,
}

/// A client-facing view of an asynchronous payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusReport {
    pub order_id: i64,
    pub order_number: String,
    pub method: PaymentMethodType,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub address: String,
    pub expected_amount: Decimal,
    pub received_amount: Decimal,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub expires_at: DateTime<Utc>,
    pub underpaid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub checked: usize,
    pub confirmed: usize,
    pub expired: usize,
    pub errors: usize,
}

/// An admin refund request, as received. Fields are optional so that missing ones can be reported by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_reason: Option<String>,
}

impl RefundRequest {
    pub fn new<S: Into<String>>(amount: Decimal, reason: S) -> Self {
        Self { refund_amount: Some(amount), refund_reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub order: Order,
    pub refund: RefundEntry,
}

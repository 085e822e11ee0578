use serde::{Deserialize, Serialize};
use storefront_engine::{
    db_types::{Order, OrderStatus, PaymentStatus},
    payment_objects::ConfirmationOutcome,
};

/// The envelope for every JSON success response. Failures use `{"success": false, "error": ...}`; see
/// [`crate::errors::ServerError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> JsonResponse<T> {
    pub fn data(data: T) -> Self {
        Self { success: true, message: None, data: Some(data) }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl JsonResponse<()> {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: Some(message.into()), data: None }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelOrderParams {
    #[serde(default)]
    pub reason: Option<String>,
}

/// What the chain gateway is told after it delivers a payment notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub order_id: i64,
    pub order_number: String,
    pub outcome: ConfirmationOutcome,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl WebhookAck {
    pub fn new(order: &Order, outcome: ConfirmationOutcome) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            outcome,
            status: order.status,
            payment_status: order.payment_status,
        }
    }
}

pub fn outcome_message(outcome: ConfirmationOutcome) -> &'static str {
    match outcome {
        ConfirmationOutcome::Confirmed => "Payment confirmed",
        ConfirmationOutcome::AlreadyConfirmed => "Payment already confirmed",
        ConfirmationOutcome::AwaitingConfirmations => "Payment received, awaiting confirmations",
        ConfirmationOutcome::Underpaid => "Payment received, but it is less than the amount due",
        ConfirmationOutcome::Expired => "The payment window has expired. The order has been cancelled",
        ConfirmationOutcome::OrderClosed => "The order is closed. No changes were made",
    }
}

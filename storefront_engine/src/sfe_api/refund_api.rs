use std::{fmt::Debug, sync::Arc};

use log::*;
use rust_decimal::Decimal;
use shop_common::Money;
use tokio::sync::Mutex;

use crate::{
    db_types::{Order, RefundEntry},
    events::{EventProducers, OrderRefundedEvent},
    helpers::{new_refund_id, Clock, SystemClock},
    payments::PaymentProviders,
    sfe_api::{
        payment_objects::{RefundRequest, RefundResult},
        MAX_WRITE_ATTEMPTS,
    },
    traits::{StorefrontDatabase, StorefrontError},
};

/// Admin refunds, partial or full, against an order's refundable balance.
///
/// Clones share one refund lock, so share a single instance (or its clones) across workers.
#[derive(Clone)]
pub struct RefundApi<B> {
    db: B,
    providers: PaymentProviders,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    in_flight: Arc<Mutex<()>>,
}

impl<B> Debug for RefundApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi ({:?})", self.providers)
    }
}

impl<B> RefundApi<B> {
    pub fn new(db: B, providers: PaymentProviders, producers: EventProducers) -> Self {
        Self { db, providers, producers, clock: Arc::new(SystemClock), in_flight: Arc::new(Mutex::new(())) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<B> RefundApi<B>
where B: StorefrontDatabase
{
    /// Refunds `refund_amount` of the order's total.
    ///
    /// The amount is checked against the refundable balance before the payment provider is asked to reverse
    /// anything. Card and PayPal payments are reversed through their provider. Crypto refunds are recorded with a
    /// `manual_refund_required` status and must be sent by hand.
    ///
    /// Refunds run one at a time: the balance is read, checked, reversed and saved while holding the refund lock, so
    /// two refunds can never both pass the check against the same balance.
    ///
    /// Refunding the whole remaining balance moves the order to `refunded`.
    pub async fn issue_refund(
        &self,
        order_id: i64,
        request: RefundRequest,
        actor: &str,
    ) -> Result<RefundResult, StorefrontError> {
        let (amount, reason) = validate_refund_request(&request)?;
        let _lock = self.in_flight.lock().await;
        let order = self.fetch_order(order_id).await?;
        order.check_refundable(amount)?;
        let method = order.payment_method.kind;
        let provider = self.providers.get(method)?;
        let reversal = provider.refund(&order.payment_details, amount, &order.currency).await.map_err(|e| {
            warn!("↩️ {method} refund of {amount} for {} failed. {e}", order.order_number);
            StorefrontError::from(e)
        })?;
        let now = self.clock.now();
        let entry = RefundEntry {
            refund_id: new_refund_id(now),
            amount,
            reason,
            actor: actor.to_string(),
            timestamp: now,
            provider_status: reversal.status,
            provider_refund_id: reversal.refund_id,
        };

        let order = self.record_refund(order, &entry).await.map_err(|e| {
            error!(
                "↩️ Refund {} of {amount} was sent to {method} (provider id {}) but could not be recorded on order \
                 #{order_id}. {e}",
                entry.refund_id,
                entry.provider_refund_id.as_deref().unwrap_or("none")
            );
            e
        })?;
        info!(
            "↩️ {actor} refunded {amount} on {}. {} refunded in total. Refund status: {}",
            order.order_number, order.total_refunded_amount, order.refund_status
        );
        self.producers.order_refunded(OrderRefundedEvent::new(order.clone(), entry.clone())).await;
        Ok(RefundResult { order, refund: entry })
    }

    /// Appends the refund and saves. Other writers (confirmations, status updates) may bump the version in the
    /// meantime, in which case the refund is re-applied to a fresh copy.
    async fn record_refund(&self, mut order: Order, entry: &RefundEntry) -> Result<Order, StorefrontError> {
        let order_id = order.id;
        let mut attempt = 0;
        loop {
            attempt += 1;
            order.apply_refund(entry.clone(), entry.timestamp)?;
            match self.db.update_order(order).await {
                Ok(order) => return Ok(order),
                Err(StorefrontError::ConcurrentModification) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("↩️ Order #{order_id} changed while recording refund {}. Retrying.", entry.refund_id);
                    order = self.fetch_order(order_id).await?;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order, StorefrontError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| StorefrontError::OrderNotFound(order_id.to_string()))
    }
}

fn validate_refund_request(request: &RefundRequest) -> Result<(Money, String), StorefrontError> {
    let amount = request
        .refund_amount
        .ok_or_else(|| StorefrontError::ValidationError("refundAmount is required".into()))?;
    if amount <= Decimal::ZERO {
        return Err(StorefrontError::ValidationError("refundAmount must be a positive number".into()));
    }
    let amount = Money::from_decimal(amount)
        .ok()
        .filter(|m| m.is_positive())
        .ok_or_else(|| StorefrontError::ValidationError("refundAmount must be a positive number".into()))?;
    let reason = request.refund_reason.as_deref().map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Err(StorefrontError::ValidationError("refundReason is required".into()));
    }
    Ok((amount, reason.to_string()))
}

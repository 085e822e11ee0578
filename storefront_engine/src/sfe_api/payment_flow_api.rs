use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{CustomerIdentity, Order, PaymentDetails, PaymentMethodType, PaymentStatus, Underpayment},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::{Clock, SystemClock},
    payments::{PaymentObservation, PaymentProvider, PaymentProviders},
    sfe_api::{
        payment_objects::{ConfirmationOutcome, ConfirmationResult, PaymentStatusReport, PollSummary},
        MAX_WRITE_ATTEMPTS,
    },
    traits::{StorefrontDatabase, StorefrontError},
};

/// Reconciles asynchronous (crypto) payments against their orders.
///
/// Observations arrive either as signed webhooks from the chain gateway or from polling the provider. Both paths end
/// in [`PaymentFlowApi::confirm_payment`], which is idempotent: replaying an observation that has already been
/// applied changes nothing and emits no events.
pub struct PaymentFlowApi<B> {
    db: B,
    providers: PaymentProviders,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi ({:?})", self.providers)
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(db: B, providers: PaymentProviders, producers: EventProducers) -> Self {
        Self { db, providers, producers, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<B> PaymentFlowApi<B>
where B: StorefrontDatabase
{
    /// Handles a payment notification for `method`. The signature is checked before the payload is even parsed, so
    /// an unsigned or forged notification never touches an order.
    pub async fn process_webhook(
        &self,
        method: PaymentMethodType,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ConfirmationResult, StorefrontError> {
        if !method.is_async() {
            return Err(StorefrontError::UnsupportedPaymentMethod(format!("{method} payment notifications")));
        }
        let provider = self.providers.get(method)?;
        let signature = signature.map(str::trim).unwrap_or_default();
        if !provider.verify_webhook_signature(payload, signature) {
            warn!("🔐️ Rejected a {method} payment notification with an invalid signature");
            return Err(StorefrontError::InvalidSignature);
        }
        trace!("🔐️ {method} notification signature verified");
        let observation = provider.parse_webhook(payload)?;
        debug!(
            "💰️ {method} notification for {}: {} received with {} confirmations",
            observation.reference, observation.received, observation.confirmations
        );
        self.confirm_payment(method, observation).await
    }

    /// Applies a payment observation to its order. Retries when a concurrent writer got to the order first.
    pub async fn confirm_payment(
        &self,
        method: PaymentMethodType,
        observation: PaymentObservation,
    ) -> Result<ConfirmationResult, StorefrontError> {
        let provider = self.providers.get(method)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.resolve_order(method, &observation).await?;
            match self.apply_observation(provider.as_ref(), order, &observation).await {
                Err(StorefrontError::ConcurrentModification) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("💰️ Order for {} changed while confirming payment. Retrying.", observation.reference);
                },
                result => return result,
            }
        }
    }

    /// Checks the payment status of one order with its provider, applying anything new.
    ///
    /// When `customer` is given, orders belonging to someone else are reported as not found.
    pub async fn refresh_payment_status(
        &self,
        customer: Option<&CustomerIdentity>,
        method: PaymentMethodType,
        order_id: i64,
    ) -> Result<PaymentStatusReport, StorefrontError> {
        let provider = self.providers.get(method)?;
        let not_found = || StorefrontError::OrderNotFound(order_id.to_string());
        let mut order = self.db.fetch_order(order_id).await?.ok_or_else(not_found)?;
        if customer.map(|c| !order.is_owned_by(c)).unwrap_or(false) {
            return Err(not_found());
        }
        if order.payment_method.kind != method || order.payment_details.crypto().is_none() {
            return Err(StorefrontError::ValidationError(format!("Order {order_id} is not a {method} order")));
        }
        if order.payment_status == PaymentStatus::Pending {
            let observation = provider.fetch_payment_status(&order.payment_details).await?;
            order = match observation {
                Some(mut obs) => {
                    obs.order_id = Some(order.id);
                    self.confirm_payment(method, obs).await?.order
                },
                None => self.expire_if_overdue(provider.as_ref(), order).await?,
            };
        }
        status_report(&order, provider.as_ref())
    }

    /// Polls the provider of every order still awaiting an asynchronous payment. Failures for one order are logged and
    /// counted, and do not stop the sweep.
    pub async fn poll_pending_payments(&self) -> Result<PollSummary, StorefrontError> {
        let orders = self.db.fetch_orders_awaiting_payment().await?;
        let mut summary = PollSummary::default();
        for order in orders {
            summary.checked += 1;
            let number = order.order_number.clone();
            match self.poll_order(order).await {
                Ok(ConfirmationOutcome::Confirmed) => summary.confirmed += 1,
                Ok(ConfirmationOutcome::Expired) => summary.expired += 1,
                Ok(_) => {},
                Err(e) => {
                    warn!("💰️ Could not check the payment status of {number}. {e}");
                    summary.errors += 1;
                },
            }
        }
        if summary.checked > 0 {
            info!(
                "💰️ Payment poll: {} checked, {} confirmed, {} expired, {} errors",
                summary.checked, summary.confirmed, summary.expired, summary.errors
            );
        }
        Ok(summary)
    }

    /// Cancels every order whose payment window has closed without a confirmed payment. Returns the cancelled orders.
    pub async fn expire_overdue_payments(&self) -> Result<Vec<Order>, StorefrontError> {
        let orders = self.db.fetch_orders_awaiting_payment().await?;
        let mut expired = Vec::new();
        for order in orders {
            let provider = match self.providers.get(order.payment_method.kind) {
                Ok(p) => p,
                Err(e) => {
                    warn!("💰️ Skipping expiry check for {}. {e}", order.order_number);
                    continue;
                },
            };
            let number = order.order_number.clone();
            match self.expire_if_overdue(provider.as_ref(), order).await {
                Ok(order) if order.payment_status == PaymentStatus::Failed => expired.push(order),
                Ok(_) => {},
                Err(e) => warn!("💰️ Could not expire {number}. {e}"),
            }
        }
        Ok(expired)
    }

    async fn poll_order(&self, order: Order) -> Result<ConfirmationOutcome, StorefrontError> {
        let method = order.payment_method.kind;
        let provider = self.providers.get(method)?;
        match provider.fetch_payment_status(&order.payment_details).await? {
            Some(mut obs) => {
                obs.order_id = Some(order.id);
                Ok(self.confirm_payment(method, obs).await?.outcome)
            },
            None => {
                let order = self.expire_if_overdue(provider.as_ref(), order).await?;
                match order.payment_status {
                    PaymentStatus::Failed => Ok(ConfirmationOutcome::Expired),
                    _ => Ok(ConfirmationOutcome::AwaitingConfirmations),
                }
            },
        }
    }

    async fn resolve_order(
        &self,
        method: PaymentMethodType,
        observation: &PaymentObservation,
    ) -> Result<Order, StorefrontError> {
        match observation.order_id {
            Some(id) => {
                let order =
                    self.db.fetch_order(id).await?.ok_or_else(|| StorefrontError::OrderNotFound(id.to_string()))?;
                if order.payment_method.kind != method || order.payment_details.reference() != observation.reference {
                    warn!("💰️ Payment to {} does not belong to order #{id}", observation.reference);
                    return Err(StorefrontError::ValidationError(format!(
                        "Address {} does not belong to order {id}",
                        observation.reference
                    )));
                }
                Ok(order)
            },
            None => self
                .db
                .fetch_order_by_payment_reference(method, &observation.reference)
                .await?
                .ok_or_else(|| StorefrontError::OrderNotFound(format!("for address {}", observation.reference))),
        }
    }

    async fn apply_observation(
        &self,
        provider: &dyn PaymentProvider,
        mut order: Order,
        observation: &PaymentObservation,
    ) -> Result<ConfirmationResult, StorefrontError> {
        let now = self.clock.now();
        let before = order.payment_details.clone();
        let number = order.order_number.clone();
        let Some(details) = order.payment_details.crypto_mut() else {
            return Err(StorefrontError::ValidationError(format!("Order {number} is not paid in crypto")));
        };

        if order.payment_status == PaymentStatus::Completed {
            if observation.confirmations <= details.confirmations {
                trace!("💰️ Replayed notification for {number}. Nothing to do.");
                return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::AlreadyConfirmed });
            }
            details.confirmations = observation.confirmations;
            let order = self.db.update_order(order).await?;
            return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::AlreadyConfirmed });
        }
        if matches!(order.payment_status, PaymentStatus::Failed | PaymentStatus::Refunded) || order.status.is_terminal()
        {
            info!("💰️ Payment to {} arrived for closed order {number}", observation.reference);
            return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::OrderClosed });
        }

        details.received_amount = observation.received;
        details.confirmations = observation.confirmations;
        if observation.txid.is_some() {
            details.txid = observation.txid.clone();
        }
        // A closed payment window is final, whatever the late observation says
        if provider.is_payment_expired(details.expires_at, now) {
            info!("💰️ Payment window for {number} closed at {}. Cancelling the order.", details.expires_at);
            let order = self.annul_expired(order, now).await?;
            return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::Expired });
        }
        let expected = details.expected_amount;
        let sufficient = provider.is_payment_sufficient(observation.received, expected);
        let confirmed = provider.is_payment_confirmed(observation.confirmations);

        if !sufficient {
            details.underpayment = Some(Underpayment { received: observation.received, expected, recorded_at: now });
            warn!("💰️ Underpayment on {number}: {} received, {expected} expected", observation.received);
            let order = self.save_if_changed(order, &before).await?;
            return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::Underpaid });
        }
        details.underpayment = None;
        if !confirmed {
            debug!(
                "💰️ {number} paid in full, waiting for {} of {} confirmations",
                observation.confirmations,
                provider.required_confirmations()
            );
            let order = self.save_if_changed(order, &before).await?;
            return Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::AwaitingConfirmations });
        }

        let note = match &observation.txid {
            Some(txid) => format!("Payment confirmed in transaction {txid}"),
            None => "Payment confirmed".to_string(),
        };
        order.complete_payment(now, &note)?;
        let order = self.db.update_order(order).await?;
        info!("💰️ Payment for {} confirmed. {} is now {}", observation.reference, order.order_number, order.status);
        self.producers.order_paid(OrderPaidEvent::new(order.clone())).await;
        Ok(ConfirmationResult { order, outcome: ConfirmationOutcome::Confirmed })
    }

    async fn save_if_changed(&self, order: Order, before: &PaymentDetails) -> Result<Order, StorefrontError> {
        if &order.payment_details == before {
            return Ok(order);
        }
        self.db.update_order(order).await
    }

    async fn expire_if_overdue(&self, provider: &dyn PaymentProvider, order: Order) -> Result<Order, StorefrontError> {
        let now = self.clock.now();
        let overdue = order
            .payment_details
            .crypto()
            .map(|d| provider.is_payment_expired(d.expires_at, now))
            .unwrap_or(false);
        if order.payment_status != PaymentStatus::Pending || !overdue {
            return Ok(order);
        }
        info!("💰️ Payment window for {} has closed. Cancelling the order.", order.order_number);
        self.annul_expired(order, now).await
    }

    async fn annul_expired(&self, mut order: Order, now: DateTime<Utc>) -> Result<Order, StorefrontError> {
        let reason = "Payment window expired";
        order.cancel(now, Some(reason.to_string()))?;
        let order = self.db.cancel_order(order).await?;
        self.producers.order_annulled(OrderAnnulledEvent::new(order.clone(), reason)).await;
        Ok(order)
    }
}

fn status_report(order: &Order, provider: &dyn PaymentProvider) -> Result<PaymentStatusReport, StorefrontError> {
    let details = order.payment_details.crypto().ok_or_else(|| {
        StorefrontError::ValidationError(format!("Order {} is not paid in crypto", order.order_number))
    })?;
    Ok(PaymentStatusReport {
        order_id: order.id,
        order_number: order.order_number.clone(),
        method: order.payment_method.kind,
        payment_status: order.payment_status,
        status: order.status,
        address: details.address.clone(),
        expected_amount: details.expected_amount,
        received_amount: details.received_amount,
        confirmations: details.confirmations,
        required_confirmations: provider.required_confirmations(),
        expires_at: details.expires_at,
        underpaid: details.underpayment.is_some(),
    })
}

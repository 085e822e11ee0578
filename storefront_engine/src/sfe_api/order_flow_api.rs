use std::{fmt::Debug, sync::Arc};

use log::*;
use shop_common::{Money, STORE_CURRENCY_CODE};

use crate::{
    db_types::{CustomerIdentity, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, ShippingSelection},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent, OrderPlacedEvent},
    helpers::{new_order_number, Clock, SystemClock},
    payments::{PaymentProviders, PaymentRequest},
    sfe_api::{
        order_objects::{OrderPage, OrderTotals, PlaceOrderRequest, PlacedOrder, UpdateStatusRequest},
        MAX_WRITE_ATTEMPTS,
    },
    traits::{Pagination, StorefrontDatabase, StorefrontError},
};

#[derive(Debug, Clone)]
pub struct OrderFlowConfig {
    /// Sales tax in basis points (2000 = 20%)
    pub tax_rate_bps: u32,
    pub currency: String,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self { tax_rate_bps: 0, currency: STORE_CURRENCY_CODE.to_string() }
    }
}

/// `OrderFlowApi` is the primary API for placing orders and moving them through their lifecycle.
pub struct OrderFlowApi<B> {
    db: B,
    providers: PaymentProviders,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    config: OrderFlowConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?}, {:?})", self.providers, self.config)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, providers: PaymentProviders, producers: EventProducers) -> Self {
        Self { db, providers, producers, clock: Arc::new(SystemClock), config: OrderFlowConfig::default() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: OrderFlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: StorefrontDatabase
{
    /// Turns the customer's cart into an order.
    ///
    /// Every cart line is checked against the current product record, the shipping method is priced for the
    /// destination, and the payment is set up with the selected provider before anything is written. The order, the
    /// stock reservations and the emptied cart are then persisted as one unit of work.
    ///
    /// Card and PayPal tokens can only ever pay for one order. Submitting the same token again returns the order it
    /// already paid for.
    pub async fn place_order(
        &self,
        customer: &CustomerIdentity,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, StorefrontError> {
        validate_place_order(customer, &request)?;
        let method = request.payment_method.method;
        let provider = self.providers.get(method)?;
        let token = request.payment_method.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        if !method.is_async() {
            let token = token.ok_or_else(|| {
                StorefrontError::ValidationError(format!("paymentMethod.token is required for {method} payments"))
            })?;
            if let Some(existing) = self.db.fetch_order_by_payment_reference(method, token).await? {
                return replay_of(existing, customer);
            }
        }

        let cart = self.db.fetch_cart(&customer.id).await?.filter(|c| !c.items.is_empty());
        let cart = cart.ok_or(StorefrontError::CartNotFound)?;
        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            if line.quantity <= 0 {
                return Err(StorefrontError::ValidationError(format!("Invalid quantity for {}", line.name)));
            }
            let product = match self.db.fetch_product(line.product_id).await? {
                Some(p) if p.is_active => p,
                _ => {
                    info!("🛒️ {} is no longer available. Removing it from {}'s cart", line.name, customer.id);
                    self.db.remove_cart_line(&customer.id, line.product_id).await?;
                    return Err(StorefrontError::ProductUnavailable(line.name.clone()));
                },
            };
            if product.stock_quantity < line.quantity {
                debug!("🛒️ {} has {} in stock, {} requested", product.name, product.stock_quantity, line.quantity);
                return Err(StorefrontError::InsufficientStock(product.name));
            }
            items.push(OrderItem {
                product_id: product.id,
                name: product.name,
                slug: product.slug,
                image: product.image,
                quantity: line.quantity,
                unit_price: product.price,
                line_total: product.price * line.quantity,
                weight_grams: product.weight_grams * line.quantity,
            });
        }

        let destination = request.shipping_address.country.trim().to_string();
        let shipping = self
            .db
            .fetch_shipping_method(request.shipping_method_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| {
                StorefrontError::ShippingUnavailable(format!(
                    "Shipping method {} is not available",
                    request.shipping_method_id
                ))
            })?;
        if !shipping.ships_to(&destination) {
            return Err(StorefrontError::ShippingUnavailable(format!("{} does not ship to {destination}", shipping.name)));
        }

        let now = self.clock.now();
        let subtotal = items.iter().map(|i| i.line_total).sum::<Money>();
        let weight = items.iter().map(|i| i.weight_grams).sum::<i64>();
        let promo_code = request.promotion_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let promotion = match promo_code {
            Some(code) => {
                let promo = self.db.fetch_promotion(code).await?.filter(|p| p.is_applicable(subtotal, now));
                Some(promo.ok_or_else(|| {
                    StorefrontError::ValidationError(format!("Promotion code {code} is not valid"))
                })?)
            },
            None => None,
        };
        let totals = OrderTotals::calculate(subtotal, weight, &shipping, promotion.as_ref(), self.config.tax_rate_bps);

        let order_number = new_order_number(now);
        let payment_request = PaymentRequest {
            order_number: order_number.clone(),
            amount: totals.total,
            currency: self.config.currency.clone(),
            provider_token: token.map(String::from),
        };
        let init = provider.create_payment(&payment_request).await.map_err(|e| {
            warn!("🛒️ Could not set up {method} payment for {order_number}. {e}");
            StorefrontError::from(e)
        })?;

        let billing_address = request.billing_address.clone().unwrap_or_else(|| request.shipping_address.clone());
        let mut order = Order {
            id: 0,
            order_number,
            customer_id: customer.id.clone(),
            customer_email: customer.email.clone(),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping_cost: totals.shipping_cost,
            discount: totals.discount,
            total_amount: totals.total,
            currency: self.config.currency.clone(),
            shipping_address: request.shipping_address,
            billing_address,
            shipping_method: ShippingSelection { id: shipping.id, name: shipping.name, cost: totals.shipping_cost },
            payment_method: PaymentMethod::from(method),
            payment_details: init.details,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            status_history: vec![],
            refund_status: Default::default(),
            refund_history: vec![],
            total_refunded_amount: Money::ZERO,
            tracking_number: None,
            tracking_url: None,
            return_request_ids: vec![],
            has_active_return: false,
            promotion_code: promotion.map(|p| p.code),
            delivered_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        order.record_status(OrderStatus::Pending, now, Some("Order placed"));
        if init.settled {
            order.complete_payment(now, &format!("Payment received via {}", method.display_name()))?;
        }

        let order = match self.db.place_order(order).await {
            Ok(order) => order,
            Err(StorefrontError::DuplicatePayment(reference)) => {
                // Lost a race against a concurrent submission of the same token
                let existing = self.db.fetch_order_by_payment_reference(method, &reference).await?;
                let existing = existing.ok_or(StorefrontError::DuplicatePayment(reference))?;
                return replay_of(existing, customer);
            },
            Err(e) => {
                if init.settled {
                    error!(
                        "🛒️ A {method} payment was captured for {} but the order could not be saved. It must be \
                         refunded manually. {e}",
                        customer.id
                    );
                }
                return Err(e);
            },
        };
        info!("🛒️ Order {} (#{}) placed by {} for {}", order.order_number, order.id, customer.id, order.total_amount);
        self.producers.order_placed(OrderPlacedEvent::new(order.clone())).await;
        if order.is_paid() {
            self.producers.order_paid(OrderPaidEvent::new(order.clone())).await;
        }
        Ok(PlacedOrder::from(&order))
    }

    pub async fn orders_for_customer(
        &self,
        customer: &CustomerIdentity,
        pagination: Pagination,
    ) -> Result<OrderPage, StorefrontError> {
        let (orders, total) = self.db.fetch_orders_for_customer(&customer.id, pagination).await?;
        trace!("🛒️ Fetched {} of {total} orders for {}", orders.len(), customer.id);
        Ok(OrderPage::new(orders, pagination, total))
    }

    /// Fetches an order. Orders belonging to someone else are reported as not found.
    pub async fn order_for_customer(&self, customer: &CustomerIdentity, order_id: i64) -> Result<Order, StorefrontError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_owned_by(customer) {
            debug!("🛒️ {} asked for order #{order_id}, which belongs to someone else", customer.id);
            return Err(StorefrontError::OrderNotFound(order_id.to_string()));
        }
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Order, StorefrontError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| StorefrontError::OrderNotFound(order_id.to_string()))
    }

    /// Customer-initiated cancellation. Only pending and processing orders can be cancelled. The items go back into
    /// stock.
    pub async fn cancel_order(
        &self,
        customer: &CustomerIdentity,
        order_id: i64,
        reason: Option<String>,
    ) -> Result<Order, StorefrontError> {
        let note = reason.filter(|r| !r.trim().is_empty()).unwrap_or_else(|| "Cancelled by customer".to_string());
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.order_for_customer(customer, order_id).await?;
            order.cancel(self.clock.now(), Some(note.clone()))?;
            match self.db.cancel_order(order).await {
                Ok(order) => {
                    info!("🛒️ Order {} cancelled by {}", order.order_number, customer.id);
                    self.producers.order_annulled(OrderAnnulledEvent::new(order.clone(), note)).await;
                    return Ok(order);
                },
                Err(StorefrontError::ConcurrentModification) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("🛒️ Order #{order_id} changed while cancelling. Retrying.");
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Admin status change, guarded by the transition table on [`Order`]. Cancelling restocks the items.
    pub async fn update_order_status(
        &self,
        order_id: i64,
        request: UpdateStatusRequest,
        actor: &str,
    ) -> Result<Order, StorefrontError> {
        let target = request.status.ok_or_else(|| StorefrontError::ValidationError("status is required".into()))?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.fetch_order(order_id).await?;
            let previous = order.status;
            let note = request.note.clone().or_else(|| Some(format!("Status changed to {target} by {actor}")));
            order.transition_to(target, self.clock.now(), note.clone())?;
            if let Some(number) = request.tracking_number.as_ref().filter(|n| !n.trim().is_empty()) {
                order.tracking_number = Some(number.trim().to_string());
            }
            if let Some(url) = request.tracking_url.as_ref().filter(|u| !u.trim().is_empty()) {
                order.tracking_url = Some(url.trim().to_string());
            }
            let saved = if target == OrderStatus::Cancelled {
                self.db.cancel_order(order).await
            } else {
                self.db.update_order(order).await
            };
            match saved {
                Ok(order) => {
                    info!("🛒️ Order {} moved from {previous} to {target} by {actor}", order.order_number);
                    if target == OrderStatus::Cancelled {
                        let reason = note.unwrap_or_default();
                        self.producers.order_annulled(OrderAnnulledEvent::new(order.clone(), reason)).await;
                    }
                    return Ok(order);
                },
                Err(StorefrontError::ConcurrentModification) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("🛒️ Order #{order_id} changed while updating its status. Retrying.");
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn validate_place_order(customer: &CustomerIdentity, request: &PlaceOrderRequest) -> Result<(), StorefrontError> {
    if customer.id.trim().is_empty() || customer.email.trim().is_empty() {
        return Err(StorefrontError::ValidationError("A customer id and email are required".into()));
    }
    if let Some(field) = request.shipping_address.missing_field("shippingAddress") {
        return Err(StorefrontError::ValidationError(format!("{field} is required")));
    }
    if let Some(field) = request.billing_address.as_ref().and_then(|a| a.missing_field("billingAddress")) {
        return Err(StorefrontError::ValidationError(format!("{field} is required")));
    }
    if request.shipping_method_id <= 0 {
        return Err(StorefrontError::ValidationError("shippingMethodId is required".into()));
    }
    Ok(())
}

/// A repeated submission of a payment token that already paid for `existing`.
fn replay_of(existing: Order, customer: &CustomerIdentity) -> Result<PlacedOrder, StorefrontError> {
    if existing.customer_id != customer.id {
        warn!("🛒️ {} tried to reuse the payment for order {}", customer.id, existing.order_number);
        return Err(StorefrontError::DuplicatePayment(existing.payment_details.reference().to_string()));
    }
    debug!("🛒️ Payment already used for {}. Returning the existing order.", existing.order_number);
    Ok(PlacedOrder::from(&existing))
}

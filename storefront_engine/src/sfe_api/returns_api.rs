use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{CustomerIdentity, Order, OrderStatus, ReturnItem, ReturnReason, ReturnRequest, ReturnStatus},
    events::{EventProducers, ReturnSubmittedEvent},
    helpers::{Clock, SystemClock},
    sfe_api::{
        return_objects::{ReturnItemRequest, SubmitReturnRequest},
        MAX_WRITE_ATTEMPTS,
    },
    traits::{StorefrontDatabase, StorefrontError},
};

/// Number of days after delivery during which a return can be requested.
pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;

/// Customer return requests for delivered orders.
pub struct ReturnsApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    return_window_days: i64,
}

impl<B> Debug for ReturnsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReturnsApi (window: {} days)", self.return_window_days)
    }
}

impl<B> ReturnsApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock), return_window_days: DEFAULT_RETURN_WINDOW_DAYS }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_return_window(mut self, days: i64) -> Self {
        self.return_window_days = days;
        self
    }

    pub fn return_window_days(&self) -> i64 {
        self.return_window_days
    }
}

/// A validated return line, before it is matched against the order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestedReturn {
    quantity: i64,
    reason_code: ReturnReason,
    reason: Option<String>,
}

impl<B> ReturnsApi<B>
where B: StorefrontDatabase
{
    /// Opens a return request for some or all of the items of a delivered order.
    ///
    /// Line data (names, prices) is taken from the order, never from the request. The refund for a line is the unit
    /// price times the quantity returned, capped at what was paid for the line. Items already claimed by an active
    /// return request cannot be returned again.
    pub async fn submit_return(
        &self,
        customer: &CustomerIdentity,
        request: SubmitReturnRequest,
    ) -> Result<ReturnRequest, StorefrontError> {
        let order_id = request
            .order_id
            .as_ref()
            .ok_or_else(|| StorefrontError::ValidationError("orderId is required".into()))?
            .parse()?;
        let requested = validate_items(&request.items)?;
        let images = request.images.into_iter().filter(|i| !i.trim().is_empty()).collect::<Vec<_>>();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.order_for_customer(customer, order_id).await?;
            let now = self.clock.now();
            if order.status != OrderStatus::Delivered {
                return Err(StorefrontError::InvalidState(format!(
                    "Only delivered orders can be returned. Current status: {}",
                    order.status
                )));
            }
            if !order.is_within_return_window(self.return_window_days, now) {
                debug!("📦️ Return for {} refused. Delivered {:?}", order.order_number, order.delivery_date());
                return Err(StorefrontError::ReturnWindowExpired { window: self.return_window_days });
            }
            let existing = self.db.fetch_return_requests_for_order(order.id).await?;
            let items = build_return_items(&order, &requested, &existing)?;
            let total_refund_amount = items.iter().map(|i| i.refund_amount).sum();
            let total_items_count = items.iter().map(|i| i.quantity).sum();
            let return_request = ReturnRequest {
                id: 0,
                return_request_number: 0,
                formatted_request_number: String::new(),
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_id: order.customer_id.clone(),
                customer_email: order.customer_email.clone(),
                status: ReturnStatus::PendingReview,
                items,
                total_refund_amount,
                total_items_count,
                return_window: self.return_window_days,
                images: images.clone(),
                submitted_at: now,
                created_at: now,
                updated_at: now,
            };
            match self.db.submit_return_request(return_request, order).await {
                Ok((return_request, order)) => {
                    info!(
                        "📦️ Return request {} opened on {} by {} for {}",
                        return_request.formatted_request_number,
                        order.order_number,
                        customer.id,
                        return_request.total_refund_amount
                    );
                    let event = ReturnSubmittedEvent::new(order, return_request.clone());
                    self.producers.return_submitted(event).await;
                    return Ok(return_request);
                },
                Err(StorefrontError::ConcurrentModification) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("📦️ Order #{order_id} changed while opening a return. Retrying.");
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches a return request. Requests on someone else's order are reported as not found.
    pub async fn return_request_for_customer(
        &self,
        customer: &CustomerIdentity,
        id: i64,
    ) -> Result<ReturnRequest, StorefrontError> {
        let not_found = || StorefrontError::ReturnRequestNotFound(id.to_string());
        let request = self.db.fetch_return_request(id).await?.ok_or_else(not_found)?;
        let owned = request.customer_id == customer.id || request.customer_email.eq_ignore_ascii_case(&customer.email);
        if !owned {
            return Err(not_found());
        }
        Ok(request)
    }

    async fn order_for_customer(&self, customer: &CustomerIdentity, order_id: i64) -> Result<Order, StorefrontError> {
        let not_found = || StorefrontError::OrderNotFound(order_id.to_string());
        let order = self.db.fetch_order(order_id).await?.ok_or_else(not_found)?;
        if !order.is_owned_by(customer) {
            return Err(not_found());
        }
        Ok(order)
    }
}

/// Checks each requested line and merges repeated products. Field names in errors point at the offending line.
fn validate_items(items: &[ReturnItemRequest]) -> Result<BTreeMap<i64, RequestedReturn>, StorefrontError> {
    if items.is_empty() {
        return Err(StorefrontError::ValidationError("items must contain at least one item".into()));
    }
    let mut requested = BTreeMap::<i64, RequestedReturn>::new();
    for (i, item) in items.iter().enumerate() {
        let invalid = |field: &str, problem: &str| StorefrontError::ValidationError(format!("items[{i}].{field} {problem}"));
        let product_id = item.product_id.filter(|id| *id > 0).ok_or_else(|| invalid("productId", "is required"))?;
        let quantity = item.quantity.ok_or_else(|| invalid("quantity", "is required"))?;
        if quantity <= 0 {
            return Err(invalid("quantity", "must be greater than zero"));
        }
        let reason_code = item.reason_code.ok_or_else(|| invalid("reasonCode", "is required"))?;
        let reason = item.reason.as_ref().map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        match requested.get_mut(&product_id) {
            Some(r) => {
                r.quantity = r.quantity.checked_add(quantity).ok_or_else(|| invalid("quantity", "is too large"))?;
            },
            None => {
                requested.insert(product_id, RequestedReturn { quantity, reason_code, reason });
            },
        }
    }
    Ok(requested)
}

fn build_return_items(
    order: &Order,
    requested: &BTreeMap<i64, RequestedReturn>,
    existing: &[ReturnRequest],
) -> Result<Vec<ReturnItem>, StorefrontError> {
    requested
        .iter()
        .map(|(&product_id, req)| {
            let line = order.item(product_id).ok_or_else(|| {
                StorefrontError::ValidationError(format!("Product {product_id} is not part of order {}", order.order_number))
            })?;
            let already_returned = existing
                .iter()
                .filter(|r| r.status.is_active())
                .flat_map(|r| r.items.iter())
                .filter(|i| i.product_id == product_id)
                .fold(0i64, |acc, i| acc.saturating_add(i.quantity));
            if already_returned.checked_add(req.quantity).map_or(true, |total| total > line.quantity) {
                let remaining = (line.quantity - already_returned).max(0);
                return Err(StorefrontError::DuplicateReturn(format!(
                    "A return has already been requested for {already_returned} of {} {}. At most {remaining} more \
                     can be returned",
                    line.quantity, line.name
                )));
            }
            let refund_amount = (line.unit_price * req.quantity).min(line.line_total);
            Ok(ReturnItem {
                product_id,
                name: line.name.clone(),
                slug: line.slug.clone(),
                image: line.image.clone(),
                quantity: req.quantity,
                unit_price: line.unit_price,
                refund_amount,
                reason_code: req.reason_code,
                reason: req.reason.clone(),
            })
        })
        .collect()
}

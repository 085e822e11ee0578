//! Behaviour of the [`Order`] aggregate.
//!
//! Every state change goes through one of these methods so that the invariants hold wherever an order is modified:
//! * `status_history` and `refund_history` are only ever appended to.
//! * `total_refunded_amount` never exceeds `total_amount`.
//! * `payment_status` becomes `completed` at most once.
//!
//! ## Status transitions
//!
//! | From \ To          | processing | shipped | out_for_delivery | delivered | cancelled | returned |
//! |--------------------|:----------:|:-------:|:----------------:|:---------:|:---------:|:--------:|
//! | pending            | paid       | paid    | paid             | paid      | yes       |          |
//! | processing         |            | paid    | paid             | paid      | yes       |          |
//! | shipped            |            |         | paid             | paid      |           | yes      |
//! | out_for_delivery   |            |         |                  | paid      |           | yes      |
//! | delivered          |            |         |                  |           |           | yes      |
//!
//! "paid" means the move is only allowed once the payment is completed. Cancelled, returned and refunded orders are
//! terminal. `refunded` is only reachable through [`Order::apply_refund`].
use chrono::{DateTime, Duration, Utc};
use log::*;
use shop_common::Money;

use crate::{
    db_types::{
        CustomerIdentity,
        Order,
        OrderItem,
        OrderStatus,
        PaymentStatus,
        RefundEntry,
        RefundStatus,
        StatusHistoryEntry,
    },
    traits::StorefrontError,
};

impl Order {
    /// Sets the status and appends the matching history entry.
    pub fn record_status<S: Into<String>>(&mut self, status: OrderStatus, now: DateTime<Utc>, note: Option<S>) {
        self.status = status;
        self.updated_at = now;
        self.status_history.push(StatusHistoryEntry { status, timestamp: now, note: note.map(Into::into) });
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }

    /// Whether `customer` may see this order. A match on either the customer id or the email is enough.
    pub fn is_owned_by(&self, customer: &CustomerIdentity) -> bool {
        self.customer_id == customer.id || self.customer_email.eq_ignore_ascii_case(&customer.email)
    }

    pub fn item(&self, product_id: i64) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Moves the order to `target`, following the transition table in the module docs.
    pub fn transition_to(
        &mut self,
        target: OrderStatus,
        now: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<(), StorefrontError> {
        let current = self.status;
        if current == target {
            return Err(StorefrontError::InvalidState(format!("Order is already {current}")));
        }
        if current.is_terminal() {
            return Err(StorefrontError::InvalidState(format!("Cannot change the status of a {current} order")));
        }
        match target {
            OrderStatus::Pending => {
                return Err(StorefrontError::InvalidState(format!("Cannot move a {current} order back to pending")));
            },
            OrderStatus::Refunded => {
                return Err(StorefrontError::InvalidState(
                    "Orders can only be marked as refunded by issuing a refund".into(),
                ));
            },
            OrderStatus::Cancelled => {
                return self.cancel(now, note);
            },
            OrderStatus::Returned => {
                if current.fulfilment_rank().unwrap_or_default() < 2 {
                    return Err(StorefrontError::InvalidState(format!(
                        "Cannot mark an order with status {current} as returned"
                    )));
                }
            },
            _ => {
                let (Some(from), Some(to)) = (current.fulfilment_rank(), target.fulfilment_rank()) else {
                    return Err(StorefrontError::InvalidState(format!("Cannot move order from {current} to {target}")));
                };
                if to < from {
                    return Err(StorefrontError::InvalidState(format!("Cannot move order from {current} to {target}")));
                }
                if !self.is_paid() {
                    return Err(StorefrontError::InvalidState(format!(
                        "Cannot move order to {target} while payment status is {}",
                        self.payment_status
                    )));
                }
                if target == OrderStatus::Delivered {
                    self.delivered_at = Some(now);
                }
            },
        }
        self.record_status(target, now, note);
        Ok(())
    }

    /// Cancels the order. Only pending or processing orders can be cancelled. An outstanding payment is marked as
    /// failed. Restocking is the storage layer's job.
    pub fn cancel(&mut self, now: DateTime<Utc>, note: Option<String>) -> Result<(), StorefrontError> {
        if !self.can_be_cancelled() {
            return Err(StorefrontError::InvalidState(format!("Cannot cancel an order with status: {}", self.status)));
        }
        if self.payment_status == PaymentStatus::Pending {
            self.payment_status = PaymentStatus::Failed;
        }
        self.record_status(OrderStatus::Cancelled, now, note);
        Ok(())
    }

    /// Marks the payment as completed and moves a pending order on to processing.
    pub fn complete_payment(&mut self, now: DateTime<Utc>, note: &str) -> Result<(), StorefrontError> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(StorefrontError::InvalidState(format!(
                "Cannot complete payment for an order with payment status: {}",
                self.payment_status
            )));
        }
        self.payment_status = PaymentStatus::Completed;
        if self.status == OrderStatus::Pending {
            self.record_status(OrderStatus::Processing, now, Some(note));
        } else {
            self.updated_at = now;
        }
        Ok(())
    }

    pub fn max_refundable(&self) -> Money {
        self.total_amount - self.total_refunded_amount
    }

    /// Checks that `amount` can be refunded right now, without changing anything.
    pub fn check_refundable(&self, amount: Money) -> Result<(), StorefrontError> {
        if !self.is_paid() {
            return Err(StorefrontError::InvalidState(format!(
                "Cannot refund order with payment status: {}",
                self.payment_status
            )));
        }
        let maximum = self.max_refundable();
        if amount > maximum {
            return Err(StorefrontError::RefundExceedsLimit { requested: amount, maximum });
        }
        Ok(())
    }

    /// Appends the refund to the history and updates the refund totals. Refunding the full balance also moves the
    /// payment and the order to `refunded`.
    pub fn apply_refund(&mut self, entry: RefundEntry, now: DateTime<Utc>) -> Result<(), StorefrontError> {
        self.check_refundable(entry.amount)?;
        self.total_refunded_amount += entry.amount;
        self.refund_history.push(entry);
        self.updated_at = now;
        if self.total_refunded_amount == self.total_amount {
            self.refund_status = RefundStatus::FullyRefunded;
            self.payment_status = PaymentStatus::Refunded;
            self.record_status(OrderStatus::Refunded, now, Some("Order fully refunded"));
            debug!("Order {} has been fully refunded", self.order_number);
        } else {
            self.refund_status = RefundStatus::PartialRefunded;
        }
        Ok(())
    }

    /// When the order was delivered. Older documents without `delivered_at` fall back to the history log.
    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivered_at.or_else(|| {
            self.status_history.iter().rev().find(|h| h.status == OrderStatus::Delivered).map(|h| h.timestamp)
        })
    }

    /// Whether a return may be opened at `now`, given a window of `window_days` days after delivery.
    pub fn is_within_return_window(&self, window_days: i64, now: DateTime<Utc>) -> bool {
        self.delivery_date().map(|d| now <= d + Duration::days(window_days)).unwrap_or(false)
    }

    pub fn link_return_request(&mut self, return_id: i64, now: DateTime<Utc>) {
        self.return_request_ids.push(return_id);
        self.has_active_return = true;
        self.updated_at = now;
    }
}

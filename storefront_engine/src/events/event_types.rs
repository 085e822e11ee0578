use serde::Serialize;

use crate::db_types::{Order, RefundEntry, ReturnRequest};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPlacedEvent {
    pub order: Order,
}

impl OrderPlacedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted exactly once per order, when its payment is first confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The order was cancelled, either by a person or because its payment expired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderAnnulledEvent {
    pub fn new<S: Into<String>>(order: Order, reason: S) -> Self {
        Self { order, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
    pub refund: RefundEntry,
}

impl OrderRefundedEvent {
    pub fn new(order: Order, refund: RefundEntry) -> Self {
        Self { order, refund }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSubmittedEvent {
    pub order: Order,
    pub return_request: ReturnRequest,
}

impl ReturnSubmittedEvent {
    pub fn new(order: Order, return_request: ReturnRequest) -> Self {
        Self { order, return_request }
    }
}

/// All events, in the shape they are sent to external notification endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EventType {
    OrderPlaced(OrderPlacedEvent),
    OrderPaid(OrderPaidEvent),
    OrderAnnulled(OrderAnnulledEvent),
    OrderRefunded(OrderRefundedEvent),
    ReturnSubmitted(ReturnSubmittedEvent),
}

impl EventType {
    pub fn order(&self) -> &Order {
        match self {
            Self::OrderPlaced(e) => &e.order,
            Self::OrderPaid(e) => &e.order,
            Self::OrderAnnulled(e) => &e.order,
            Self::OrderRefunded(e) => &e.order,
            Self::ReturnSubmitted(e) => &e.order,
        }
    }
}

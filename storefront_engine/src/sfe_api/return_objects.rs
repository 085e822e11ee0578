use serde::{Deserialize, Serialize};

use crate::{db_types::ReturnReason, traits::StorefrontError};

/// An order id as sent by clients: either a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderRef {
    Id(i64),
    Text(String),
}

impl OrderRef {
    pub fn parse(&self) -> Result<i64, StorefrontError> {
        let id = match self {
            OrderRef::Id(id) => Some(*id),
            OrderRef::Text(s) => s.trim().parse::<i64>().ok(),
        };
        id.filter(|id| *id > 0).ok_or_else(|| StorefrontError::ValidationError("orderId is not a valid order id".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemRequest {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub reason_code: Option<ReturnReason>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ReturnItemRequest {
    pub fn new(product_id: i64, quantity: i64, reason_code: ReturnReason) -> Self {
        Self { product_id: Some(product_id), quantity: Some(quantity), reason_code: Some(reason_code), reason: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReturnRequest {
    #[serde(default)]
    pub order_id: Option<OrderRef>,
    #[serde(default)]
    pub items: Vec<ReturnItemRequest>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl SubmitReturnRequest {
    pub fn new(order_id: i64, items: Vec<ReturnItemRequest>) -> Self {
        Self { order_id: Some(OrderRef::Id(order_id)), items, images: vec![] }
    }
}

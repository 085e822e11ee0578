use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_common::Money;

use crate::{
    db_types::{
        Address,
        CryptoAsset,
        Order,
        OrderStatus,
        PaymentDetails,
        PaymentMethodType,
        PaymentStatus,
        Promotion,
        ShippingMethod,
    },
    traits::Pagination,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSelection {
    #[serde(rename = "type")]
    pub method: PaymentMethodType,
    /// Payment intent id (card) or PayPal order id. Not used for crypto payments.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub shipping_address: Address,
    /// Defaults to the shipping address
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub shipping_method_id: i64,
    pub payment_method: PaymentSelection,
    #[serde(default)]
    pub promotion_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Tax is charged on the discounted subtotal. Shipping is priced on the undiscounted subtotal.
    pub fn calculate(
        subtotal: Money,
        weight_grams: i64,
        shipping: &ShippingMethod,
        promotion: Option<&Promotion>,
        tax_rate_bps: u32,
    ) -> Self {
        let discount = promotion.map(|p| p.discount_for(subtotal)).unwrap_or_default();
        let taxable = subtotal - discount;
        let tax = taxable.apply_basis_points(tax_rate_bps);
        let shipping_cost = shipping.calculate_cost(subtotal, weight_grams);
        let total = taxable + tax + shipping_cost;
        Self { subtotal, discount, tax, shipping_cost, total }
    }
}

/// The data a client needs to finish paying for an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientPaymentData {
    #[serde(rename_all = "camelCase")]
    Crypto {
        asset: CryptoAsset,
        symbol: String,
        address: String,
        amount: Decimal,
        exchange_rate: Decimal,
        qr_payload: String,
        expires_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Settled { method: PaymentMethodType, reference: String },
}

impl From<&PaymentDetails> for ClientPaymentData {
    fn from(details: &PaymentDetails) -> Self {
        match details {
            PaymentDetails::Bitcoin(c) | PaymentDetails::Monero(c) => {
                let asset = details.method().crypto_asset().unwrap_or(CryptoAsset::Bitcoin);
                Self::Crypto {
                    asset,
                    symbol: asset.symbol().to_string(),
                    address: c.address.clone(),
                    amount: c.expected_amount,
                    exchange_rate: c.exchange_rate,
                    qr_payload: c.qr_payload.clone(),
                    expires_at: c.expires_at,
                }
            },
            PaymentDetails::Card(_) | PaymentDetails::Paypal(_) => {
                Self::Settled { method: details.method(), reference: details.reference().to_string() }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: i64,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    pub currency: String,
    pub payment: ClientPaymentData,
}

impl From<&Order> for PlacedOrder {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            discount: order.discount,
            tax: order.tax,
            shipping_cost: order.shipping_cost,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            payment: ClientPaymentData::from(&order.payment_details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl UpdateStatusRequest {
    pub fn to(status: OrderStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn with_tracking<S: Into<String>>(mut self, number: S, url: Option<String>) -> Self {
        self.tracking_number = Some(number.into());
        self.tracking_url = url;
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl OrderPage {
    pub fn new(orders: Vec<Order>, pagination: Pagination, total: i64) -> Self {
        let limit = i64::from(pagination.limit.max(1));
        let total_pages = (total + limit - 1) / limit;
        Self { orders, page: pagination.page, limit: pagination.limit, total, total_pages }
    }
}

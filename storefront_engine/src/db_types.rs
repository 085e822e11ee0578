use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_common::Money;
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion from string: {0}")]
pub struct ConversionError(String);

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum using the given wire names.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("Invalid {}: {s}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Newly placed. Payment may still be outstanding.
    Pending,
    /// Paid and waiting to be fulfilled.
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    /// Cancelled by the customer, an admin, or by payment expiry.
    Cancelled,
    Returned,
    /// Fully refunded. Only the refund workflow sets this status.
    Refunded,
}

string_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Returned => "returned",
    Refunded => "refunded",
});

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned | Self::Refunded)
    }

    /// Position along the fulfilment path, or `None` for the side exits.
    pub fn fulfilment_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::OutForDelivery => Some(3),
            Self::Delivered => Some(4),
            _ => None,
        }
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

//--------------------------------------     RefundStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    None,
    PartialRefunded,
    FullyRefunded,
}

string_enum!(RefundStatus {
    None => "none",
    PartialRefunded => "partial_refunded",
    FullyRefunded => "fully_refunded",
});

//--------------------------------------   PaymentMethodType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Paypal,
    Bitcoin,
    Monero,
}

string_enum!(PaymentMethodType {
    Card => "card",
    Paypal => "paypal",
    Bitcoin => "bitcoin",
    Monero => "monero",
});

impl PaymentMethodType {
    pub fn crypto_asset(&self) -> Option<CryptoAsset> {
        match self {
            Self::Bitcoin => Some(CryptoAsset::Bitcoin),
            Self::Monero => Some(CryptoAsset::Monero),
            Self::Card | Self::Paypal => None,
        }
    }

    /// Asynchronous methods are settled by a later webhook or poll rather than at checkout.
    pub fn is_async(&self) -> bool {
        self.crypto_asset().is_some()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Card => "Credit/Debit Card",
            Self::Paypal => "PayPal",
            Self::Bitcoin => "Bitcoin",
            Self::Monero => "Monero",
        }
    }
}

//--------------------------------------      CryptoAsset      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoAsset {
    Bitcoin,
    Monero,
}

impl CryptoAsset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::Monero => "XMR",
        }
    }

    /// The number of decimal places between one whole coin and its smallest unit.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Bitcoin => 8,
            Self::Monero => 12,
        }
    }

    /// Identifier used by price APIs for this asset.
    pub fn price_id(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Monero => "monero",
        }
    }

    /// URI scheme used in QR payloads.
    pub fn uri_scheme(&self) -> &'static str {
        self.price_id()
    }

    pub fn method(&self) -> PaymentMethodType {
        match self {
            Self::Bitcoin => PaymentMethodType::Bitcoin,
            Self::Monero => PaymentMethodType::Monero,
        }
    }
}

impl Display for CryptoAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.price_id())
    }
}

impl FromStr for CryptoAsset {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Self::Bitcoin),
            "monero" | "xmr" => Ok(Self::Monero),
            _ => Err(ConversionError(format!("Unsupported crypto asset: {s}"))),
        }
    }
}

//--------------------------------------        Address        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Address {
    /// Returns the name of the first required field that is blank, prefixed with `prefix`.
    pub fn missing_field(&self, prefix: &str) -> Option<String> {
        let required = [
            ("fullName", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
        ];
        required.iter().find(|(_, v)| v.trim().is_empty()).map(|(name, _)| format!("{prefix}.{name}"))
    }
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
/// A line item, captured when the order is placed. Later product edits never change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    #[serde(default)]
    pub weight_grams: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSelection {
    pub id: i64,
    pub name: String,
    pub cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: PaymentMethodType,
    pub name: String,
}

impl From<PaymentMethodType> for PaymentMethod {
    fn from(kind: PaymentMethodType) -> Self {
        Self { kind, name: kind.display_name().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundEntry {
    pub refund_id: String,
    pub amount: Money,
    pub reason: String,
    /// Who issued the refund, usually the admin's user id.
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub provider_status: String,
    #[serde(default)]
    pub provider_refund_id: Option<String>,
}

//--------------------------------------    PaymentDetails     ---------------------------------------------------------
/// Provider-specific payment data, one variant per payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDetails {
    Card(CardDetails),
    Paypal(PayPalDetails),
    Bitcoin(CryptoPaymentDetails),
    Monero(CryptoPaymentDetails),
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethodType {
        match self {
            Self::Card(_) => PaymentMethodType::Card,
            Self::Paypal(_) => PaymentMethodType::Paypal,
            Self::Bitcoin(_) => PaymentMethodType::Bitcoin,
            Self::Monero(_) => PaymentMethodType::Monero,
        }
    }

    /// The value that correlates provider events with this order: the intent id, the PayPal order id or the
    /// receiving address.
    pub fn reference(&self) -> &str {
        match self {
            Self::Card(c) => c.payment_intent_id.as_str(),
            Self::Paypal(p) => p.paypal_order_id.as_str(),
            Self::Bitcoin(c) | Self::Monero(c) => c.address.as_str(),
        }
    }

    pub fn crypto(&self) -> Option<&CryptoPaymentDetails> {
        match self {
            Self::Bitcoin(c) | Self::Monero(c) => Some(c),
            _ => None,
        }
    }

    pub fn crypto_mut(&mut self) -> Option<&mut CryptoPaymentDetails> {
        match self {
            Self::Bitcoin(c) | Self::Monero(c) => Some(c),
            _ => None,
        }
    }

    pub fn for_crypto(asset: CryptoAsset, details: CryptoPaymentDetails) -> Self {
        match asset {
            CryptoAsset::Bitcoin => Self::Bitcoin(details),
            CryptoAsset::Monero => Self::Monero(details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub payment_intent_id: String,
    #[serde(default)]
    pub charge_id: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalDetails {
    pub paypal_order_id: String,
    #[serde(default)]
    pub capture_id: Option<String>,
    #[serde(default)]
    pub payer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoPaymentDetails {
    pub address: String,
    /// Amount of the asset the customer was asked to pay.
    pub expected_amount: Decimal,
    /// Units of the asset per unit of store currency at the time the invoice was created.
    pub exchange_rate: Decimal,
    pub rate_timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub qr_payload: String,
    #[serde(default)]
    pub received_amount: Decimal,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub underpayment: Option<Underpayment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Underpayment {
    pub received: Decimal,
    pub expected: Decimal,
    pub recorded_at: DateTime<Utc>,
}

//--------------------------------------         Order         ---------------------------------------------------------
/// The order aggregate. Behaviour lives in [`crate::order_aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: i64,
    pub order_number: String,
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingSelection,
    pub payment_method: PaymentMethod,
    pub payment_details: PaymentDetails,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub refund_status: RefundStatus,
    #[serde(default)]
    pub refund_history: Vec<RefundEntry>,
    #[serde(default)]
    pub total_refunded_amount: Money,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub return_request_ids: Vec<i64>,
    #[serde(default)]
    pub has_active_return: bool,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter. Bumped on every successful save.
    #[serde(default)]
    pub version: i64,
}

//--------------------------------------     ReturnRequest     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    PendingReview,
    Approved,
    Rejected,
    Refunded,
}

string_enum!(ReturnStatus {
    PendingReview => "pending_review",
    Approved => "approved",
    Rejected => "rejected",
    Refunded => "refunded",
});

impl ReturnStatus {
    /// Rejected requests no longer hold a claim on the order's items.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Damaged,
    Defective,
    WrongItem,
    NotAsDescribed,
    NoLongerNeeded,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    pub product_id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub refund_amount: Money,
    pub reason_code: ReturnReason,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    #[serde(default)]
    pub id: i64,
    /// `YYYYMMDD * 10000 + n`, where `n` is the request's position within its day.
    #[serde(default)]
    pub return_request_number: i64,
    /// `RR-YYYYMMDD-NNNN`
    #[serde(default)]
    pub formatted_request_number: String,
    pub order_id: i64,
    pub order_number: String,
    pub customer_id: String,
    pub customer_email: String,
    pub status: ReturnStatus,
    pub items: Vec<ReturnItem>,
    pub total_refund_amount: Money,
    pub total_items_count: i64,
    /// Length of the return window in days
    pub return_window: i64,
    #[serde(default)]
    pub images: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn format_request_number(number: i64) -> String {
        format!("RR-{:08}-{:04}", number / 10_000, number % 10_000)
    }
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock_quantity: i64,
    pub weight_grams: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock_quantity: i64,
    pub weight_grams: i64,
    pub is_active: bool,
}

impl NewProduct {
    pub fn new<S: Into<String>>(name: S, price: Money, stock_quantity: i64) -> Self {
        let name = name.into();
        let slug = name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
        Self { name, slug, image: None, price, stock_quantity, weight_grams: 0, is_active: true }
    }

    pub fn with_weight(mut self, grams: i64) -> Self {
        self.weight_grams = grams;
        self
    }

    pub fn with_image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

//--------------------------------------         Cart          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: i64,
    /// The product name when it was added to the cart, used in error messages if the product disappears.
    pub name: String,
    pub quantity: i64,
}

impl CartItem {
    pub fn new<S: Into<String>>(product_id: i64, name: S, quantity: i64) -> Self {
        Self { product_id, name: name.into(), quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub customer_id: String,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ShippingMethod     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    pub id: i64,
    pub name: String,
    pub base_cost: Money,
    /// Charged per started kilogram of the order weight.
    pub cost_per_kg: Money,
    pub free_over: Option<Money>,
    /// Destination country codes. Empty means every destination.
    pub countries: Vec<String>,
    pub is_active: bool,
}

impl ShippingMethod {
    pub fn ships_to(&self, country: &str) -> bool {
        self.countries.is_empty() || self.countries.iter().any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Shipping cost for a cart with the given (pre-discount) subtotal and total weight.
    pub fn calculate_cost(&self, subtotal: Money, weight_grams: i64) -> Money {
        if matches!(self.free_over, Some(threshold) if subtotal >= threshold) {
            return Money::ZERO;
        }
        let started_kgs = (weight_grams.max(0) + 999) / 1000;
        self.base_cost + self.cost_per_kg * started_kgs
    }
}

#[derive(Debug, Clone)]
pub struct NewShippingMethod {
    pub name: String,
    pub base_cost: Money,
    pub cost_per_kg: Money,
    pub free_over: Option<Money>,
    pub countries: Vec<String>,
    pub is_active: bool,
}

impl NewShippingMethod {
    pub fn flat_rate<S: Into<String>>(name: S, cost: Money) -> Self {
        Self {
            name: name.into(),
            base_cost: cost,
            cost_per_kg: Money::ZERO,
            free_over: None,
            countries: vec![],
            is_active: true,
        }
    }

    pub fn with_countries(mut self, countries: &[&str]) -> Self {
        self.countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_cost_per_kg(mut self, cost: Money) -> Self {
        self.cost_per_kg = cost;
        self
    }

    pub fn free_over(mut self, threshold: Money) -> Self {
        self.free_over = Some(threshold);
        self
    }
}

//--------------------------------------       Promotion       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub code: String,
    /// Percentage discount in basis points (1000 = 10%)
    pub percent_off_bps: Option<u32>,
    pub amount_off: Option<Money>,
    pub min_subtotal: Money,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Promotion {
    pub fn percent_off<S: Into<String>>(code: S, bps: u32) -> Self {
        Self {
            code: code.into(),
            percent_off_bps: Some(bps),
            amount_off: None,
            min_subtotal: Money::ZERO,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn amount_off<S: Into<String>>(code: S, amount: Money) -> Self {
        Self {
            code: code.into(),
            percent_off_bps: None,
            amount_off: Some(amount),
            min_subtotal: Money::ZERO,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn with_min_subtotal(mut self, min: Money) -> Self {
        self.min_subtotal = min;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_applicable(&self, subtotal: Money, now: DateTime<Utc>) -> bool {
        self.is_active && subtotal >= self.min_subtotal && self.expires_at.map(|t| now <= t).unwrap_or(true)
    }

    /// The discount for the given subtotal. Never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let pct = self.percent_off_bps.map(|bps| subtotal.apply_basis_points(bps)).unwrap_or_default();
        let fixed = self.amount_off.unwrap_or_default();
        (pct + fixed).min(subtotal)
    }
}

//--------------------------------------   CustomerIdentity    ---------------------------------------------------------
/// The authenticated customer on whose behalf a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub id: String,
    pub email: String,
}

impl CustomerIdentity {
    pub fn new<S: Into<String>, E: Into<String>>(id: S, email: E) -> Self {
        Self { id: id.into(), email: email.into() }
    }
}

use shop_common::Money;
use thiserror::Error;

use crate::{
    db_types::{Cart, Order, PaymentMethodType, Product, Promotion, ReturnRequest, ShippingMethod},
    traits::{ExchangeRateError, Pagination},
};

/// The storage contract for the storefront workflows.
///
/// Orders are stored as whole documents. Every method that writes an order compares the order's `version` with the
/// stored one and fails with [`StorefrontError::ConcurrentModification`] if another writer got there first. On
/// success the returned order carries the new version.
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn fetch_cart(&self, customer_id: &str) -> Result<Option<Cart>, StorefrontError>;

    /// Removes every line for `product_id` from the customer's cart.
    async fn remove_cart_line(&self, customer_id: &str, product_id: i64) -> Result<(), StorefrontError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StorefrontError>;

    async fn fetch_shipping_method(&self, id: i64) -> Result<Option<ShippingMethod>, StorefrontError>;

    async fn fetch_promotion(&self, code: &str) -> Result<Option<Promotion>, StorefrontError>;

    /// Persists a new order in a single atomic unit of work:
    /// * the stock of every line item is decremented, but only if enough stock remains. Otherwise the whole unit
    ///   fails with [`StorefrontError::InsufficientStock`] naming the product.
    /// * the order is inserted. A payment reference that is already attached to another order fails with
    ///   [`StorefrontError::DuplicatePayment`].
    /// * the customer's cart is cleared.
    ///
    /// Returns the stored order, with its new id and version.
    async fn place_order(&self, order: Order) -> Result<Order, StorefrontError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StorefrontError>;

    /// Finds the order whose payment details carry `reference` (a receiving address, intent id or PayPal order id).
    async fn fetch_order_by_payment_reference(
        &self,
        method: PaymentMethodType,
        reference: &str,
    ) -> Result<Option<Order>, StorefrontError>;

    /// A page of the customer's orders, newest first, along with the total number of orders they have.
    async fn fetch_orders_for_customer(
        &self,
        customer_id: &str,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, i64), StorefrontError>;

    /// Orders paid with an asynchronous method whose payment is still pending.
    async fn fetch_orders_awaiting_payment(&self) -> Result<Vec<Order>, StorefrontError>;

    /// Saves the order document if its version is current.
    async fn update_order(&self, order: Order) -> Result<Order, StorefrontError>;

    /// Saves an order that has just been cancelled and returns its items to stock, atomically.
    async fn cancel_order(&self, order: Order) -> Result<Order, StorefrontError>;

    async fn fetch_return_request(&self, id: i64) -> Result<Option<ReturnRequest>, StorefrontError>;

    async fn fetch_return_requests_for_order(&self, order_id: i64) -> Result<Vec<ReturnRequest>, StorefrontError>;

    /// Inserts the return request, links its new id onto `order` and saves the order, atomically. The request number
    /// is assigned by the backend.
    async fn submit_return_request(
        &self,
        request: ReturnRequest,
        order: Order,
    ) -> Result<(ReturnRequest, Order), StorefrontError>;
}

#[derive(Debug, Clone, Error)]
pub enum StorefrontError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Return request {0} not found")]
    ReturnRequestNotFound(String),
    #[error("Product {0} not found")]
    ProductNotFound(i64),
    #[error("Your cart is empty")]
    CartNotFound,
    #[error("{0} is no longer available and has been removed from your cart")]
    ProductUnavailable(String),
    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),
    #[error("{0}")]
    ShippingUnavailable(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("Refund amount {requested} exceeds the maximum refundable amount of {maximum}")]
    RefundExceedsLimit { requested: Money, maximum: Money },
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("The {window}-day return window for this order has expired")]
    ReturnWindowExpired { window: i64 },
    #[error("{0}")]
    DuplicateReturn(String),
    #[error("Payment {0} has already been used for another order")]
    DuplicatePayment(String),
    #[error("Payment method {0} is not supported")]
    UnsupportedPaymentMethod(String),
    #[error("The payment was declined: {0}")]
    PaymentDeclined(String),
    #[error("The payment provider did not respond in time")]
    ProviderTimeout,
    #[error("Could not fetch the exchange rate: {0}")]
    RateFetchError(String),
    #[error("Could not generate a payment address: {0}")]
    AddressGenerationError(String),
    #[error("The payment provider returned an error: {0}")]
    ProviderError(String),
    #[error("The order was modified by another request. Please try again.")]
    ConcurrentModification,
}

impl From<sqlx::Error> for StorefrontError {
    fn from(e: sqlx::Error) -> Self {
        StorefrontError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StorefrontError {
    fn from(e: serde_json::Error) -> Self {
        StorefrontError::DatabaseError(format!("Could not (de)serialize a stored document. {e}"))
    }
}

impl From<ExchangeRateError> for StorefrontError {
    fn from(e: ExchangeRateError) -> Self {
        match e {
            ExchangeRateError::Timeout => StorefrontError::ProviderTimeout,
            e => StorefrontError::RateFetchError(e.to_string()),
        }
    }
}

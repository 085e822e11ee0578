//! Storefront Engine
//!
//! The storefront engine holds the core logic of the shop: turning carts into orders, taking card, PayPal, Bitcoin and
//! Monero payments, and handling refunds and returns afterwards. It knows nothing about HTTP.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@sqlite`] and [`mod@traits`]). Workflows talk to storage through the [`StorefrontDatabase`]
//!    trait. SQLite is the supported backend. The data types shared by every backend live in [`mod@db_types`].
//! 2. Payment adapters ([`mod@payments`]). One [`payments::PaymentProvider`] per payment method, plus the exchange rate
//!    cache the crypto providers use to price orders.
//! 3. The public API ([`mod@sfe_api`]). These are the workflows themselves: order placement, payment confirmation,
//!    refunds and returns. The order state machine they share is implemented on [`db_types::Order`].
//!
//! The engine also emits events when orders are placed, paid, cancelled or refunded and when returns are opened. A
//! simple actor framework is used so that you can easily hook into these events and perform custom actions, such as
//! sending notifications.
pub mod db_types;
pub mod events;
pub mod helpers;
mod order_aggregate;
pub mod payments;
pub mod sfe_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use sfe_api::{
    order_objects,
    payment_objects,
    return_objects,
    ExchangeRateCache,
    OrderFlowApi,
    PaymentFlowApi,
    RefundApi,
    ReturnsApi,
};
pub use traits::{StorefrontDatabase, StorefrontError};

//! # Storefront engine public API
//!
//! The `sfe_api` module exposes the workflows of the storefront core. Each API is created by supplying a storage
//! backend that implements [`crate::traits::StorefrontDatabase`], plus the collaborators it needs.
//!
//! * [`OrderFlowApi`] places orders and handles customer cancellations and admin status changes.
//! * [`PaymentFlowApi`] reconciles asynchronous payments from webhooks and status polls.
//! * [`RefundApi`] issues admin refunds against the order's refundable balance.
//! * [`ReturnsApi`] takes customer return requests for delivered orders.
//! * [`ExchangeRateCache`] supplies fiat-to-crypto rates to the crypto payment providers.
//!
//! ```rust,ignore
//! let db = SqliteDatabase::new_with_url("sqlite://data/store.db", 5).await?;
//! let api = OrderFlowApi::new(db, providers, producers);
//! let placed = api.place_order(&customer, request).await?;
//! ```
pub mod exchange_objects;
pub mod exchange_rate_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_flow_api;
pub mod payment_objects;
pub mod rate_sources;
pub mod refund_api;
pub mod return_objects;
pub mod returns_api;

pub use exchange_rate_api::{ExchangeRateCache, RateCacheConfig};
pub use order_flow_api::{OrderFlowApi, OrderFlowConfig};
pub use payment_flow_api::PaymentFlowApi;
pub use rate_sources::{HttpRateSource, StaticRateSource, DEFAULT_RATE_API_URL};
pub use refund_api::RefundApi;
pub use returns_api::{ReturnsApi, DEFAULT_RETURN_WINDOW_DAYS};

/// How many times a read-modify-write is retried after losing an optimistic-concurrency race.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 3;

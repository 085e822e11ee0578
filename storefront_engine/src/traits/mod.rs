//! # Storage and rate-source contracts
//!
//! This module defines the behaviour that backends need to expose in order to drive the storefront workflows.
//!
//! * [`StorefrontDatabase`] is the storage contract. Methods that change more than one record (placing an order,
//!   cancelling an order, submitting a return) are atomic units of work: either every write lands, or none does.
//!   Order updates are optimistic: a save only succeeds if the stored `version` still matches the one that was read.
//! * [`RateSource`] supplies fiat-to-crypto exchange rates to the [`crate::sfe_api::ExchangeRateCache`].
mod data_objects;
mod exchange_rates;
mod storefront_database;

pub use data_objects::Pagination;
pub use exchange_rates::{ExchangeRateError, RateSource};
pub use storefront_database::{StorefrontDatabase, StorefrontError};

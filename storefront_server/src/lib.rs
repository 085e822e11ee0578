//! # Storefront server
//! This crate hosts the HTTP front end of the storefront engine. It is responsible for:
//! * Authenticating shoppers and administrators with signed access tokens.
//! * Exposing checkout, order history, cancellations, returns and admin order management.
//! * Receiving payment notifications from the Bitcoin and Monero chain gateways.
//! * Running the payment watcher, which re-checks pending crypto payments and expires overdue ones.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/user/orders/...` and `/user/returns/...`: Customer routes. The caller only ever sees their own orders.
//! * `/admin/orders/...`: Order details, status changes and refunds. Requires the `admin` role.
//! * `/payment/{bitcoin|monero}/webhook`: Payment notifications, authenticated by an HMAC signature.
//! * `/payment/{bitcoin|monero}/status/{order_id}`: Payment status polling for the checkout page.
//! * `/payment/rates/{bitcoin|monero}`: Current exchange rates.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod payment_watcher;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;

//! # Payment provider adapters
//!
//! Each payment network is wrapped behind the [`PaymentProvider`] trait, and the workflows pick the right adapter
//! from a [`PaymentProviders`] registry keyed by [`crate::db_types::PaymentMethodType`].
//!
//! * [`CryptoProvider`] handles Bitcoin and Monero. Payments are asynchronous: the customer is given a receiving
//!   address and an amount, and the payment is confirmed later by a webhook or a status poll.
//! * [`CardProvider`] (Stripe-style payment intents) and [`PayPalProvider`] (Orders v2 captures) are synchronous: the
//!   client completes the payment with the provider and hands over a token, which is verified at checkout.
mod card;
mod chain_gateway;
mod crypto;
mod paypal;
mod provider;

pub use card::{CardProvider, CardProviderConfig, DEFAULT_CARD_API_URL};
pub use chain_gateway::{AddressActivity, ChainGateway, HttpChainGateway};
pub use crypto::{asset_to_subunits, subunits_to_asset, CryptoProvider, CryptoSettings, DEFAULT_PAYMENT_EXPIRY_HOURS};
pub use paypal::{PayPalProvider, PayPalProviderConfig, DEFAULT_PAYPAL_API_URL};
pub use provider::{
    PaymentInit,
    PaymentObservation,
    PaymentProvider,
    PaymentProviderError,
    PaymentProviders,
    PaymentRequest,
    ProviderRefund,
    MANUAL_REFUND_REQUIRED,
};

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shop_common::Money;
use thiserror::Error;

use crate::{
    db_types::{PaymentDetails, PaymentMethodType},
    helpers::HttpCallError,
    traits::{ExchangeRateError, StorefrontError},
};

/// Provider status recorded for refunds that have to be sent by hand.
pub const MANUAL_REFUND_REQUIRED: &str = "manual_refund_required";

#[derive(Debug, Clone, Error)]
pub enum PaymentProviderError {
    #[error("{0}")]
    AddressGeneration(String),
    #[error("{0}")]
    RateFetch(String),
    #[error("The payment provider did not respond in time")]
    Timeout,
    #[error("{0}")]
    Declined(String),
    #[error("{0}")]
    Gateway(String),
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0} is not supported by this payment provider")]
    Unsupported(String),
}

impl From<HttpCallError> for PaymentProviderError {
    fn from(e: HttpCallError) -> Self {
        match e {
            HttpCallError::Timeout => Self::Timeout,
            e => Self::Gateway(e.to_string()),
        }
    }
}

impl From<ExchangeRateError> for PaymentProviderError {
    fn from(e: ExchangeRateError) -> Self {
        match e {
            ExchangeRateError::Timeout => Self::Timeout,
            e => Self::RateFetch(e.to_string()),
        }
    }
}

impl From<PaymentProviderError> for StorefrontError {
    fn from(e: PaymentProviderError) -> Self {
        match e {
            PaymentProviderError::AddressGeneration(s) => StorefrontError::AddressGenerationError(s),
            PaymentProviderError::RateFetch(s) => StorefrontError::RateFetchError(s),
            PaymentProviderError::Timeout => StorefrontError::ProviderTimeout,
            PaymentProviderError::Declined(s) => StorefrontError::PaymentDeclined(s),
            PaymentProviderError::InvalidPayload(s) => StorefrontError::ValidationError(s),
            PaymentProviderError::Unsupported(s) => StorefrontError::UnsupportedPaymentMethod(s),
            PaymentProviderError::Gateway(s) => StorefrontError::ProviderError(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_number: String,
    pub amount: Money,
    pub currency: String,
    /// The client-side token for synchronous providers: a payment intent id or a PayPal order id.
    pub provider_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInit {
    pub details: PaymentDetails,
    /// True when the provider has already captured the full amount.
    pub settled: bool,
}

/// What a provider has seen on the network for one payment, from a webhook or a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentObservation {
    pub order_id: Option<i64>,
    /// The receiving address
    pub reference: String,
    pub txid: Option<String>,
    /// Total received at the address, in whole units of the asset
    pub received: Decimal,
    pub confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRefund {
    pub status: String,
    pub refund_id: Option<String>,
}

impl ProviderRefund {
    pub fn manual() -> Self {
        Self { status: MANUAL_REFUND_REQUIRED.to_string(), refund_id: None }
    }
}

/// The contract every payment adapter fulfils.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethodType;

    /// Sets up a payment for an order that is about to be placed.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentProviderError>;

    /// The number of confirmations at which a payment counts as final. Zero for synchronous providers.
    fn required_confirmations(&self) -> u32;

    /// The fraction of the expected amount that a payment may fall short by.
    fn tolerance(&self) -> Decimal;

    fn is_payment_confirmed(&self, confirmations: u32) -> bool {
        confirmations >= self.required_confirmations()
    }

    fn is_payment_expired(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > expires_at
    }

    fn is_payment_sufficient(&self, received: Decimal, expected: Decimal) -> bool {
        received >= expected * (Decimal::ONE - self.tolerance())
    }

    /// Never fails. A missing secret or malformed signature is simply `false`.
    fn verify_webhook_signature(&self, _payload: &[u8], _signature: &str) -> bool {
        false
    }

    fn parse_webhook(&self, _payload: &[u8]) -> Result<PaymentObservation, PaymentProviderError> {
        Err(PaymentProviderError::Unsupported("Webhook delivery".into()))
    }

    /// Polling counterpart of the webhook. Synchronous providers have nothing to report.
    async fn fetch_payment_status(
        &self,
        _details: &PaymentDetails,
    ) -> Result<Option<PaymentObservation>, PaymentProviderError> {
        Ok(None)
    }

    async fn refund(
        &self,
        details: &PaymentDetails,
        amount: Money,
        currency: &str,
    ) -> Result<ProviderRefund, PaymentProviderError>;
}

/// Payment adapters, keyed by the payment method they serve.
#[derive(Clone, Default)]
pub struct PaymentProviders {
    providers: HashMap<PaymentMethodType, Arc<dyn PaymentProvider>>,
}

impl Debug for PaymentProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods = self.methods();
        methods.sort_by_key(|m| m.as_str());
        write!(f, "PaymentProviders({methods:?})")
    }
}

impl PaymentProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.method(), provider);
        self
    }

    pub fn get(&self, method: PaymentMethodType) -> Result<Arc<dyn PaymentProvider>, StorefrontError> {
        self.providers
            .get(&method)
            .cloned()
            .ok_or_else(|| StorefrontError::UnsupportedPaymentMethod(method.to_string()))
    }

    pub fn methods(&self) -> Vec<PaymentMethodType> {
        self.providers.keys().copied().collect()
    }
}

//! Bitcoin and Monero payments.
//!
//! The customer is shown a fresh receiving address, the amount due in the asset and an expiry. The chain gateway
//! later reports what arrived at the address, and with how many confirmations, through a signed webhook or a poll.
use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::Duration;
use log::*;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Deserialize;
use shop_common::{Money, Secret};

use crate::{
    db_types::{CryptoAsset, CryptoPaymentDetails, PaymentDetails, PaymentMethodType},
    helpers::{verify_hmac_signature, Clock},
    payments::{
        ChainGateway,
        PaymentInit,
        PaymentObservation,
        PaymentProvider,
        PaymentProviderError,
        PaymentRequest,
        ProviderRefund,
    },
    sfe_api::ExchangeRateCache,
};

pub const DEFAULT_PAYMENT_EXPIRY_HOURS: i64 = 24;

/// Converts an amount in the asset's smallest unit (satoshi, piconero) into whole units.
pub fn subunits_to_asset(subunits: u64, asset: CryptoAsset) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(subunits), asset.decimals())
}

/// Converts whole units into the asset's smallest unit, rounding any excess precision half away from zero.
pub fn asset_to_subunits(amount: Decimal, asset: CryptoAsset) -> Result<u64, PaymentProviderError> {
    let scale = Decimal::from(10u64.pow(asset.decimals()));
    amount
        .checked_mul(scale)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_u64())
        .ok_or_else(|| PaymentProviderError::InvalidPayload(format!("{amount} {} is out of range", asset.symbol())))
}

#[derive(Debug, Clone)]
pub struct CryptoSettings {
    pub required_confirmations: u32,
    /// Allowed shortfall as a fraction of the expected amount
    pub tolerance: Decimal,
    pub payment_expiry: Duration,
    pub webhook_secret: Secret<String>,
}

impl CryptoSettings {
    pub fn bitcoin() -> Self {
        Self::with_confirmations(2)
    }

    pub fn monero() -> Self {
        Self::with_confirmations(10)
    }

    fn with_confirmations(required_confirmations: u32) -> Self {
        Self {
            required_confirmations,
            tolerance: Decimal::new(1, 2),
            payment_expiry: Duration::hours(DEFAULT_PAYMENT_EXPIRY_HOURS),
            webhook_secret: Secret::default(),
        }
    }

    pub fn with_webhook_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.webhook_secret = Secret::new(secret.into());
        self
    }
}

/// Webhook body sent by the chain gateway. `value` is in the asset's smallest unit.
#[derive(Debug, Deserialize)]
struct CryptoWebhook {
    #[serde(default)]
    order_id: Option<i64>,
    address: String,
    #[serde(default)]
    txid: Option<String>,
    value: u64,
    confirmations: u32,
}

pub struct CryptoProvider {
    asset: CryptoAsset,
    settings: CryptoSettings,
    gateway: Arc<dyn ChainGateway>,
    rates: Arc<ExchangeRateCache>,
    clock: Arc<dyn Clock>,
}

impl Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CryptoProvider({}, {:?})", self.asset, self.settings)
    }
}

impl CryptoProvider {
    pub fn new(
        asset: CryptoAsset,
        settings: CryptoSettings,
        gateway: Arc<dyn ChainGateway>,
        rates: Arc<ExchangeRateCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { asset, settings, gateway, rates, clock }
    }

    pub fn asset(&self) -> CryptoAsset {
        self.asset
    }

    fn qr_payload(&self, address: &str, amount: Decimal) -> String {
        let amount = amount.normalize();
        match self.asset {
            CryptoAsset::Bitcoin => format!("bitcoin:{address}?amount={amount}"),
            CryptoAsset::Monero => format!("monero:{address}?tx_amount={amount}"),
        }
    }
}

#[async_trait]
impl PaymentProvider for CryptoProvider {
    fn method(&self) -> PaymentMethodType {
        self.asset.method()
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentProviderError> {
        let conversion = self.rates.convert_fiat_to_crypto(request.amount, self.asset).await?;
        let address = self.gateway.new_address(&request.order_number).await.map_err(|e| match e {
            PaymentProviderError::Timeout => PaymentProviderError::Timeout,
            e => PaymentProviderError::AddressGeneration(e.to_string()),
        })?;
        let expires_at = self.clock.now() + self.settings.payment_expiry;
        info!(
            "💰️ {} payment for {}: {} {} to {address}, expiring {expires_at}",
            self.asset,
            request.order_number,
            conversion.crypto_amount,
            self.asset.symbol()
        );
        let details = CryptoPaymentDetails {
            qr_payload: self.qr_payload(&address, conversion.crypto_amount),
            address,
            expected_amount: conversion.crypto_amount,
            exchange_rate: conversion.exchange_rate,
            rate_timestamp: conversion.rate_timestamp,
            expires_at,
            received_amount: Decimal::ZERO,
            confirmations: 0,
            txid: None,
            underpayment: None,
        };
        Ok(PaymentInit { details: PaymentDetails::for_crypto(self.asset, details), settled: false })
    }

    fn required_confirmations(&self) -> u32 {
        self.settings.required_confirmations
    }

    fn tolerance(&self) -> Decimal {
        self.settings.tolerance
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_hmac_signature(payload, signature, self.settings.webhook_secret.reveal())
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<PaymentObservation, PaymentProviderError> {
        let hook = serde_json::from_slice::<CryptoWebhook>(payload)
            .map_err(|e| PaymentProviderError::InvalidPayload(format!("Invalid webhook payload. {e}")))?;
        Ok(PaymentObservation {
            order_id: hook.order_id,
            reference: hook.address,
            txid: hook.txid,
            received: subunits_to_asset(hook.value, self.asset),
            confirmations: hook.confirmations,
        })
    }

    async fn fetch_payment_status(
        &self,
        details: &PaymentDetails,
    ) -> Result<Option<PaymentObservation>, PaymentProviderError> {
        let Some(crypto) = details.crypto() else {
            return Ok(None);
        };
        let activity = self.gateway.address_activity(&crypto.address).await?;
        Ok(activity.map(|a| PaymentObservation {
            order_id: None,
            reference: crypto.address.clone(),
            txid: a.txid,
            received: subunits_to_asset(a.value, self.asset),
            confirmations: a.confirmations,
        }))
    }

    /// On-chain payments cannot be reversed. The refund is recorded and has to be sent by hand.
    async fn refund(
        &self,
        details: &PaymentDetails,
        amount: Money,
        _currency: &str,
    ) -> Result<ProviderRefund, PaymentProviderError> {
        warn!("💰️ {amount} refund to be sent manually for {} payment to {}", self.asset, details.reference());
        Ok(ProviderRefund::manual())
    }
}

//! A process-wide cache of fiat-to-crypto exchange rates.
//!
//! A rate younger than its asset's freshness window is served from memory without touching the network. Once the
//! window has passed the next request fetches a fresh rate, which replaces the cached one. A stale rate is never
//! served: if the fetch fails, the caller gets the error.
//!
//! Concurrent callers may race to refresh the same asset. That costs a few redundant fetches but is otherwise harmless.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;
use shop_common::{Money, STORE_CURRENCY_CODE};
use tokio::sync::RwLock;

use crate::{
    db_types::CryptoAsset,
    helpers::{Clock, SystemClock},
    sfe_api::exchange_objects::{CryptoConversion, ExchangeRate, RateQuote},
    traits::{ExchangeRateError, RateSource},
};

pub const BITCOIN_RATE_TTL_SECS: i64 = 5 * 60;
pub const MONERO_RATE_TTL_SECS: i64 = 20 * 60;

#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    pub fiat: String,
    pub bitcoin_ttl: Duration,
    pub monero_ttl: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            fiat: STORE_CURRENCY_CODE.to_string(),
            bitcoin_ttl: Duration::seconds(BITCOIN_RATE_TTL_SECS),
            monero_ttl: Duration::seconds(MONERO_RATE_TTL_SECS),
        }
    }
}

impl RateCacheConfig {
    pub fn ttl(&self, asset: CryptoAsset) -> Duration {
        match asset {
            CryptoAsset::Bitcoin => self.bitcoin_ttl,
            CryptoAsset::Monero => self.monero_ttl,
        }
    }
}

pub struct ExchangeRateCache {
    config: RateCacheConfig,
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    rates: RwLock<HashMap<CryptoAsset, ExchangeRate>>,
}

impl Debug for ExchangeRateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeRateCache ({})", self.config.fiat)
    }
}

impl ExchangeRateCache {
    pub fn new(source: Arc<dyn RateSource>, config: RateCacheConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn RateSource>, config: RateCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, source, clock, rates: RwLock::new(HashMap::new()) }
    }

    pub fn fiat(&self) -> &str {
        self.config.fiat.as_str()
    }

    /// The current rate for `asset`, from the cache if it is still fresh.
    pub async fn get_exchange_rate(&self, asset: CryptoAsset) -> Result<RateQuote, ExchangeRateError> {
        let now = self.clock.now();
        if let Some(rate) = self.rates.read().await.get(&asset).filter(|r| r.is_fresh(now)) {
            trace!("💱️ Serving cached {asset} rate: {rate}");
            return Ok(RateQuote { rate: rate.clone(), cached: true });
        }
        debug!("💱️ No fresh {asset} rate in the cache. Fetching a new one.");
        let value = self.source.fetch_rate(asset, &self.config.fiat).await.map_err(|e| {
            warn!("💱️ Could not fetch the {asset} rate. {e}");
            e
        })?;
        let fetched_at = self.clock.now();
        let rate = ExchangeRate {
            asset,
            fiat: self.config.fiat.clone(),
            rate: value,
            fetched_at,
            valid_until: fetched_at + self.config.ttl(asset),
        };
        info!("💱️ New {asset} rate: {rate}");
        self.rates.write().await.insert(asset, rate.clone());
        Ok(RateQuote { rate, cached: false })
    }

    /// Converts a store-currency amount into `asset` at the current rate.
    pub async fn convert_fiat_to_crypto(
        &self,
        amount: Money,
        asset: CryptoAsset,
    ) -> Result<CryptoConversion, ExchangeRateError> {
        let quote = self.get_exchange_rate(asset).await?;
        let crypto_amount = quote.rate.convert(amount)?;
        trace!("💱️ {amount} => {crypto_amount} {}", asset.symbol());
        Ok(CryptoConversion { crypto_amount, exchange_rate: quote.rate.rate, rate_timestamp: quote.rate.fetched_at })
    }
}

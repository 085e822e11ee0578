//! [`RateSource`] implementations.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::*;
use reqwest::Client;
use rust_decimal::Decimal;

use crate::{
    db_types::CryptoAsset,
    helpers::{build_http_client, send_json, HttpCallError},
    traits::{ExchangeRateError, RateSource},
};

pub const DEFAULT_RATE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Fetches prices from a CoinGecko-style `simple/price` endpoint and inverts them into rates.
///
/// The endpoint is queried as `?ids=bitcoin&vs_currencies=gbp` and answers `{"bitcoin": {"gbp": 51234.12}}`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: Client,
    url: String,
}

impl HttpRateSource {
    pub fn new<S: Into<String>>(url: S, timeout: Duration) -> Result<Self, ExchangeRateError> {
        let client = build_http_client(timeout).map_err(|e| ExchangeRateError::FetchFailed(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_rate(&self, asset: CryptoAsset, fiat: &str) -> Result<Decimal, ExchangeRateError> {
        let fiat = fiat.to_lowercase();
        let request = self.client.get(&self.url).query(&[("ids", asset.price_id()), ("vs_currencies", fiat.as_str())]);
        let prices = send_json::<HashMap<String, HashMap<String, Decimal>>>(request).await.map_err(|e| match e {
            HttpCallError::Timeout => ExchangeRateError::Timeout,
            HttpCallError::Json(s) => ExchangeRateError::MalformedResponse(s),
            e => ExchangeRateError::FetchFailed(e.to_string()),
        })?;
        let price = prices
            .get(asset.price_id())
            .and_then(|p| p.get(&fiat))
            .copied()
            .ok_or_else(|| ExchangeRateError::MalformedResponse(format!("No {fiat} price for {asset}")))?;
        trace!("💱️ 1 {} = {price} {fiat}", asset.symbol());
        if price <= Decimal::ZERO {
            return Err(ExchangeRateError::MalformedResponse(format!("Non-positive price for {asset}: {price}")));
        }
        Decimal::ONE
            .checked_div(price)
            .ok_or_else(|| ExchangeRateError::Overflow(format!("Cannot invert a price of {price}")))
    }
}

/// Serves fixed rates. Used in development and tests. Counts how often it is asked so that caching can be observed.
#[derive(Debug, Default)]
pub struct StaticRateSource {
    rates: HashMap<CryptoAsset, Decimal>,
    failure: Mutex<Option<ExchangeRateError>>,
    fetches: AtomicUsize,
}

impl StaticRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, asset: CryptoAsset, rate: Decimal) -> Self {
        self.rates.insert(asset, rate);
        self
    }

    /// Makes every subsequent fetch fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<ExchangeRateError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_rate(&self, asset: CryptoAsset, fiat: &str) -> Result<Decimal, ExchangeRateError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(e);
        }
        self.rates
            .get(&asset)
            .copied()
            .ok_or_else(|| ExchangeRateError::FetchFailed(format!("No static {asset} rate configured for {fiat}")))
    }
}

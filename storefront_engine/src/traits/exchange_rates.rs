use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::db_types::CryptoAsset;

#[derive(Debug, Clone, Error)]
pub enum ExchangeRateError {
    #[error("The rate service returned an error: {0}")]
    FetchFailed(String),
    #[error("The rate service did not respond in time")]
    Timeout,
    #[error("The rate service returned an unexpected response: {0}")]
    MalformedResponse(String),
    #[error("The amount cannot be converted: {0}")]
    Overflow(String),
}

/// A live source of exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch the number of units of `asset` that one unit of the fiat currency `fiat` buys.
    async fn fetch_rate(&self, asset: CryptoAsset, fiat: &str) -> Result<Decimal, ExchangeRateError>;
}

use std::fmt::Display;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use shop_common::Money;

use crate::{db_types::CryptoAsset, traits::ExchangeRateError};

/// A fiat-to-crypto rate, as fetched from a [`crate::traits::RateSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub asset: CryptoAsset,
    pub fiat: String,
    /// Units of the asset bought by one unit of the fiat currency.
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl ExchangeRate {
    /// Converts a fiat amount into the asset, rounded half away from zero to the asset's precision.
    pub fn convert(&self, amount: Money) -> Result<Decimal, ExchangeRateError> {
        let crypto = amount.to_decimal().checked_mul(self.rate).ok_or_else(|| {
            ExchangeRateError::Overflow(format!("{amount} at a rate of {} overflows", self.rate))
        })?;
        Ok(crypto.round_dp_with_strategy(self.asset.decimals(), RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1 {} => {} {}", self.fiat, self.rate, self.asset.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    #[serde(flatten)]
    pub rate: ExchangeRate,
    /// True if the rate came from the cache rather than a fresh fetch
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoConversion {
    pub crypto_amount: Decimal,
    pub exchange_rate: Decimal,
    pub rate_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;

    fn rate(asset: CryptoAsset, rate: Decimal) -> ExchangeRate {
        let now = Utc::now();
        ExchangeRate { asset, fiat: "GBP".into(), rate, fetched_at: now, valid_until: now + Duration::minutes(5) }
    }

    #[test]
    fn converts_to_asset_precision() {
        let btc = rate(CryptoAsset::Bitcoin, dec!(0.005));
        assert_eq!(btc.convert(Money::from_pence(19999)).unwrap(), dec!(0.99995));
        let btc = rate(CryptoAsset::Bitcoin, dec!(0.0000123456789));
        assert_eq!(btc.convert(Money::from_pounds(1)).unwrap(), dec!(0.00001235));
        let xmr = rate(CryptoAsset::Monero, dec!(0.00612345678912345));
        assert_eq!(xmr.convert(Money::from_pounds(1)).unwrap(), dec!(0.006123456789));
        assert_eq!(format!("{btc}"), "1 GBP => 0.0000123456789 BTC");
    }

    #[test]
    fn extreme_amounts_stay_finite() {
        let btc = rate(CryptoAsset::Bitcoin, dec!(0.005));
        let huge = btc.convert(Money::from_pence(i64::MAX)).unwrap();
        assert!(huge > Decimal::ZERO);
        assert_eq!(btc.convert(Money::from_pence(1)).unwrap(), dec!(0.00005));
        let big_rate = rate(CryptoAsset::Bitcoin, Decimal::MAX);
        assert!(matches!(big_rate.convert(Money::from_pounds(2)), Err(ExchangeRateError::Overflow(_))));
    }
}

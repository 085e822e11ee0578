//! A fully wired storefront on a fresh SQLite database, with fake payment services and a manual clock.
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use log::*;
use shop_common::Money;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    db_types::{CartItem, CryptoAsset, CustomerIdentity, NewProduct, NewShippingMethod, Product, ShippingMethod},
    events::EventProducers,
    helpers::ManualClock,
    payments::{CryptoProvider, CryptoSettings, PaymentProviders},
    sfe_api::{
        ExchangeRateCache,
        OrderFlowApi,
        PaymentFlowApi,
        RateCacheConfig,
        RefundApi,
        ReturnsApi,
        StaticRateSource,
    },
    test_utils::{
        fakes::{FakeChainGateway, FakeSyncProvider},
        prepare_env::{prepare_test_env, random_db_path},
    },
    SqliteDatabase,
    StorefrontDatabase,
};

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestStore {
    pub db: SqliteDatabase,
    pub clock: ManualClock,
    pub btc_gateway: Arc<FakeChainGateway>,
    pub xmr_gateway: Arc<FakeChainGateway>,
    pub card: Arc<FakeSyncProvider>,
    pub paypal: Arc<FakeSyncProvider>,
    pub rate_source: Arc<StaticRateSource>,
    pub providers: PaymentProviders,
    pub producers: EventProducers,
    /// Free, ships everywhere
    pub shipping: ShippingMethod,
}

impl TestStore {
    /// 1 GBP buys 0.005 BTC or 0.0125 XMR. The clock starts at 2024-05-01 12:00 UTC.
    pub async fn new() -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let rate_source = Arc::new(
            StaticRateSource::new()
                .with_rate(CryptoAsset::Bitcoin, Decimal::new(5, 3))
                .with_rate(CryptoAsset::Monero, Decimal::new(125, 4)),
        );
        let rates = Arc::new(ExchangeRateCache::with_clock(
            rate_source.clone(),
            RateCacheConfig::default(),
            Arc::new(clock.clone()),
        ));
        let btc_gateway = Arc::new(FakeChainGateway::new("BTC"));
        let xmr_gateway = Arc::new(FakeChainGateway::new("XMR"));
        let card = Arc::new(FakeSyncProvider::card());
        let paypal = Arc::new(FakeSyncProvider::paypal());
        let btc = CryptoProvider::new(
            CryptoAsset::Bitcoin,
            CryptoSettings::bitcoin().with_webhook_secret(WEBHOOK_SECRET),
            btc_gateway.clone(),
            rates.clone(),
            Arc::new(clock.clone()),
        );
        let xmr = CryptoProvider::new(
            CryptoAsset::Monero,
            CryptoSettings::monero().with_webhook_secret(WEBHOOK_SECRET),
            xmr_gateway.clone(),
            rates,
            Arc::new(clock.clone()),
        );
        let providers = PaymentProviders::new()
            .with_provider(card.clone())
            .with_provider(paypal.clone())
            .with_provider(Arc::new(btc))
            .with_provider(Arc::new(xmr));
        let shipping = db
            .insert_shipping_method(NewShippingMethod::flat_rate("Standard", Money::ZERO))
            .await
            .expect("Error adding shipping method");
        Self {
            db,
            clock,
            btc_gateway,
            xmr_gateway,
            card,
            paypal,
            rate_source,
            providers,
            producers: EventProducers::default(),
            shipping,
        }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }

    pub fn order_api(&self) -> OrderFlowApi<SqliteDatabase> {
        OrderFlowApi::new(self.db.clone(), self.providers.clone(), self.producers.clone())
            .with_clock(Arc::new(self.clock.clone()))
    }

    pub fn payment_api(&self) -> PaymentFlowApi<SqliteDatabase> {
        PaymentFlowApi::new(self.db.clone(), self.providers.clone(), self.producers.clone())
            .with_clock(Arc::new(self.clock.clone()))
    }

    pub fn refund_api(&self) -> RefundApi<SqliteDatabase> {
        RefundApi::new(self.db.clone(), self.providers.clone(), self.producers.clone())
            .with_clock(Arc::new(self.clock.clone()))
    }

    pub fn returns_api(&self) -> ReturnsApi<SqliteDatabase> {
        ReturnsApi::new(self.db.clone(), self.producers.clone()).with_clock(Arc::new(self.clock.clone()))
    }

    pub async fn add_product(&self, name: &str, price: Money, stock: i64) -> Product {
        self.db.insert_product(NewProduct::new(name, price, stock)).await.expect("Error adding product")
    }

    pub async fn fill_cart(&self, customer: &CustomerIdentity, lines: &[(&Product, i64)]) {
        let items = lines.iter().map(|(p, qty)| CartItem::new(p.id, p.name.clone(), *qty)).collect::<Vec<_>>();
        self.db.set_cart(&customer.id, &items).await.expect("Error filling cart");
    }

    /// Closes the database and deletes its file.
    pub async fn tear_down(self) {
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(self.db.url()).await {
            warn!("🚀️ Could not remove test database {}: {e}", self.db.url());
        }
    }

    pub async fn stock_of(&self, product: &Product) -> i64 {
        self.db.fetch_product(product.id).await.expect("Error fetching product").map(|p| p.stock_quantity).unwrap_or(0)
    }
}

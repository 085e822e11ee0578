use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use shop_common::STORE_CURRENCY_CODE;
use storefront_engine::{
    db_types::CryptoAsset,
    events::EventProducers,
    helpers::SystemClock,
    payments::{
        CardProvider,
        CardProviderConfig,
        CryptoProvider,
        HttpChainGateway,
        PayPalProvider,
        PayPalProviderConfig,
        PaymentProviders,
    },
    sfe_api::{HttpRateSource, OrderFlowConfig, RateCacheConfig},
    ExchangeRateCache,
    OrderFlowApi,
    PaymentFlowApi,
    RefundApi,
    ReturnsApi,
    SqliteDatabase,
};

use crate::{
    auth::TokenValidator,
    config::{CryptoGatewayConfig, PaymentsConfig, ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::notifications::{create_notification_handlers, Notifier},
    payment_watcher::start_payment_watcher,
    routes::{
        exchange_rate,
        health,
        AdminOrderRoute,
        CancelOrderRoute,
        CryptoWebhookRoute,
        MyOrderRoute,
        MyOrdersRoute,
        MyReturnRoute,
        PaymentStatusRoute,
        PlaceOrderRoute,
        RefundOrderRoute,
        SubmitReturnRoute,
        UpdateOrderStatusRoute,
    },
};

/// Everything the request handlers share, built once at start-up.
#[derive(Clone)]
pub struct ServerContext {
    pub db: SqliteDatabase,
    pub providers: PaymentProviders,
    pub producers: EventProducers,
    pub rates: Arc<ExchangeRateCache>,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Database migration failed. {e}")))?;

    let rates = build_rate_cache(&config.payments)?;
    let providers = build_payment_providers(&config.payments, rates.clone())?;
    info!("🚀️ Payment providers ready: {providers:?}");

    let notifier = Notifier::new(config.notification_url.clone(), config.payments.http_timeout)?;
    let handlers = create_notification_handlers(notifier, config.event_buffer_size);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let watcher_api = PaymentFlowApi::new(db.clone(), providers.clone(), producers.clone());
    let watcher = start_payment_watcher(watcher_api, config.payment_poll_interval);

    let context = ServerContext { db, providers, producers, rates };
    let srv = create_server_instance(config, context)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    watcher.abort();
    result
}

pub fn create_server_instance(config: ServerConfig, context: ServerContext) -> Result<Server, ServerError> {
    let validator = TokenValidator::new(&config.auth);
    let options = ServerOptions::from_config(&config);
    let order_config = OrderFlowConfig { tax_rate_bps: config.tax_rate_bps, currency: STORE_CURRENCY_CODE.to_string() };
    let return_window = config.return_window_days;
    // One refund API for every worker, so refunds on an order are serialised process-wide
    let refund_api =
        web::Data::new(RefundApi::new(context.db.clone(), context.providers.clone(), context.producers.clone()));
    let srv = HttpServer::new(move || {
        let ServerContext { db, providers, producers, rates } = context.clone();
        let orders_api = OrderFlowApi::new(db.clone(), providers.clone(), producers.clone())
            .with_config(order_config.clone());
        let payments_api = PaymentFlowApi::new(db.clone(), providers, producers.clone());
        let returns_api = ReturnsApi::new(db, producers).with_return_window(return_window);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sf::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(payments_api))
            .app_data(refund_api.clone())
            .app_data(web::Data::new(returns_api))
            .app_data(web::Data::from(rates))
            .app_data(web::Data::new(validator.clone()))
            .app_data(web::Data::new(options))
            .configure(configure_extractors)
            .configure(configure_routes)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route against the SQLite backend.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(exchange_rate)
        .service(PlaceOrderRoute::<SqliteDatabase>::new())
        .service(MyOrdersRoute::<SqliteDatabase>::new())
        .service(MyOrderRoute::<SqliteDatabase>::new())
        .service(CancelOrderRoute::<SqliteDatabase>::new())
        .service(SubmitReturnRoute::<SqliteDatabase>::new())
        .service(MyReturnRoute::<SqliteDatabase>::new())
        .service(AdminOrderRoute::<SqliteDatabase>::new())
        .service(UpdateOrderStatusRoute::<SqliteDatabase>::new())
        .service(RefundOrderRoute::<SqliteDatabase>::new())
        .service(CryptoWebhookRoute::<SqliteDatabase>::new())
        .service(PaymentStatusRoute::<SqliteDatabase>::new());
}

/// Malformed bodies, paths and queries get the same JSON error shape as every other failure.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| ServerError::InvalidQuery(err.to_string()).into()));
}

fn build_rate_cache(config: &PaymentsConfig) -> Result<Arc<ExchangeRateCache>, ServerError> {
    let source = HttpRateSource::new(config.rate_api_url.clone(), config.http_timeout)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the exchange rate source. {e}")))?;
    Ok(Arc::new(ExchangeRateCache::new(Arc::new(source), RateCacheConfig::default())))
}

/// Card and PayPal are always registered. Each crypto asset is only offered once its chain gateway is configured.
pub fn build_payment_providers(
    config: &PaymentsConfig,
    rates: Arc<ExchangeRateCache>,
) -> Result<PaymentProviders, ServerError> {
    let init_err = |e: &dyn std::fmt::Display| ServerError::InitializeError(e.to_string());
    let card = CardProvider::new(CardProviderConfig {
        api_url: config.card_api_url.clone(),
        secret_key: config.card_secret_key.clone(),
        timeout: config.http_timeout,
    })
    .map_err(|e| init_err(&e))?;
    let paypal = PayPalProvider::new(PayPalProviderConfig {
        api_url: config.paypal_api_url.clone(),
        client_id: config.paypal_client_id.clone(),
        client_secret: config.paypal_client_secret.clone(),
        timeout: config.http_timeout,
    })
    .map_err(|e| init_err(&e))?;
    let mut providers = PaymentProviders::new().with_provider(Arc::new(card)).with_provider(Arc::new(paypal));
    for (asset, gateway) in [(CryptoAsset::Bitcoin, &config.bitcoin), (CryptoAsset::Monero, &config.monero)] {
        match crypto_provider(asset, gateway, rates.clone(), config.http_timeout)? {
            Some(provider) => providers = providers.with_provider(Arc::new(provider)),
            None => debug!("🚀️ {asset} payments are disabled"),
        }
    }
    Ok(providers)
}

fn crypto_provider(
    asset: CryptoAsset,
    config: &CryptoGatewayConfig,
    rates: Arc<ExchangeRateCache>,
    timeout: Duration,
) -> Result<Option<CryptoProvider>, ServerError> {
    if config.gateway_url.is_empty() {
        return Ok(None);
    }
    let gateway = HttpChainGateway::new(config.gateway_url.clone(), config.api_key.clone(), timeout)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the {asset} chain gateway. {e}")))?;
    let provider =
        CryptoProvider::new(asset, config.settings.clone(), Arc::new(gateway), rates, Arc::new(SystemClock));
    Ok(Some(provider))
}

#[cfg(test)]
mod test {
    use storefront_engine::{db_types::PaymentMethodType, sfe_api::StaticRateSource};

    use super::*;

    fn rates() -> Arc<ExchangeRateCache> {
        Arc::new(ExchangeRateCache::new(Arc::new(StaticRateSource::new()), RateCacheConfig::default()))
    }

    #[test]
    fn crypto_methods_need_a_gateway() {
        let mut config = PaymentsConfig::default();
        let providers = build_payment_providers(&config, rates()).unwrap();
        let methods = providers.methods();
        assert_eq!(methods.len(), 2);
        assert!(methods.contains(&PaymentMethodType::Card));
        assert!(methods.contains(&PaymentMethodType::Paypal));

        config.bitcoin.gateway_url = "http://127.0.0.1:18443".into();
        let providers = build_payment_providers(&config, rates()).unwrap();
        let methods = providers.methods();
        assert_eq!(methods.len(), 3);
        assert!(methods.contains(&PaymentMethodType::Bitcoin));
        assert!(!methods.contains(&PaymentMethodType::Monero));
    }
}

use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use shop_common::Money;
use storefront_engine::{
    db_types::{CryptoAsset, PaymentMethodType, PaymentStatus},
    helpers::sign_payload,
    sfe_api::{RateCacheConfig, StaticRateSource},
    test_utils::{
        fixtures::{alice, bob, place_order_request},
        test_store::{TestStore, WEBHOOK_SECRET},
    },
    traits::ExchangeRateError,
    ExchangeRateCache,
};

use super::helpers::{assert_error, checkout, get, issue_token, send_json, store_routes};
use crate::{auth::Role, routes::exchange_rate};

const TXID: &str = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";

/// Checks out a £199.99 kettle with Bitcoin. At 0.005 BTC/GBP that is 0.99995 BTC to `BTC-addr-1`.
async fn bitcoin_checkout(store: &TestStore) -> Value {
    let kettle = store.add_product("Kettle", Money::from_pence(19_999), 3).await;
    store.fill_cart(&alice(), &[(&kettle, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Bitcoin, None);
    checkout(store, &alice(), &request).await
}

fn webhook(method: &str, body: &Value, secret: &str) -> TestRequest {
    let payload = serde_json::to_vec(body).unwrap();
    let signature = sign_payload(&payload, secret);
    TestRequest::post()
        .uri(&format!("/payment/{method}/webhook"))
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Webhook-Signature", signature))
        .set_payload(payload)
}

fn notification(order_id: i64, value: u64, confirmations: u32) -> Value {
    json!({
        "order_id": order_id,
        "address": "BTC-addr-1",
        "txid": TXID,
        "value": value,
        "confirmations": confirmations,
    })
}

#[actix_web::test]
async fn bitcoin_checkout_and_confirmation() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let body = bitcoin_checkout(&store).await;
    let placed = &body["data"];
    assert_eq!(placed["status"], "pending");
    assert_eq!(placed["paymentStatus"], "pending");
    assert_eq!(placed["payment"]["kind"], "crypto");
    assert_eq!(placed["payment"]["address"], "BTC-addr-1");
    assert_eq!(placed["payment"]["symbol"], "BTC");
    assert_eq!(placed["payment"]["amount"], "0.99995");
    let order_id = placed["orderId"].as_i64().unwrap();

    // One confirmation is not enough
    let pending = webhook("bitcoin", &notification(order_id, 99_995_000, 1), WEBHOOK_SECRET);
    let (status, body) = send_json(pending, store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["outcome"], "awaiting_confirmations");
    assert_eq!(body["data"]["paymentStatus"], "pending");
    assert_eq!(body["message"], "Payment received, awaiting confirmations");

    let confirmed = webhook("bitcoin", &notification(order_id, 99_995_000, 2), WEBHOOK_SECRET);
    let (status, body) = send_json(confirmed, store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["outcome"], "confirmed");
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["paymentStatus"], "completed");
    assert_eq!(body["data"]["orderNumber"], placed["orderNumber"]);

    // Gateways retry. A replay is acknowledged without changing anything.
    let replay = webhook("bitcoin", &notification(order_id, 99_995_000, 2), WEBHOOK_SECRET);
    let (status, body) = send_json(replay, store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "already_confirmed");
    store.tear_down().await;
}

#[actix_web::test]
async fn forged_notifications_are_rejected() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let body = bitcoin_checkout(&store).await;
    let order_id = body["data"]["orderId"].as_i64().unwrap();

    let forged = webhook("bitcoin", &notification(order_id, 99_995_000, 6), "not-the-secret");
    let (status, body) = send_json(forged, store_routes(&store)).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "Invalid webhook signature");

    let unsigned = TestRequest::post()
        .uri("/payment/bitcoin/webhook")
        .set_payload(serde_json::to_vec(&notification(order_id, 99_995_000, 6)).unwrap());
    let (status, _) = send_json(unsigned, store_routes(&store)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = store.order_api().fetch_order(order_id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.payment_details.crypto().unwrap().txid.is_none());
    store.tear_down().await;
}

#[actix_web::test]
async fn notifications_for_other_methods() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let (status, body) =
        send_json(webhook("card", &json!({ "id": "evt_1" }), WEBHOOK_SECRET), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) =
        send_json(webhook("dogecoin", &json!({ "id": "evt_1" }), WEBHOOK_SECRET), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Could not read request path"));
    store.tear_down().await;
}

#[actix_web::test]
async fn payment_status_polling() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let body = bitcoin_checkout(&store).await;
    let order_id = body["data"]["orderId"].as_i64().unwrap();
    let path = format!("/payment/bitcoin/status/{order_id}");
    let token = issue_token(&alice(), &[Role::Customer]);

    let (status, body) = send_json(get(&path, &token), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["paymentStatus"], "pending");
    assert_eq!(body["data"]["confirmations"], 0);
    assert_eq!(body["data"]["requiredConfirmations"], 2);

    // The watcher's view of the chain is picked up when the customer polls
    store.btc_gateway.set_activity("BTC-addr-1", TXID, 99_995_000, 3);
    let (status, body) = send_json(get(&path, &token), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["paymentStatus"], "completed");
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["confirmations"], 3);

    let bob_token = issue_token(&bob(), &[Role::Customer]);
    let (status, body) = send_json(get(&path, &bob_token), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, &format!("Order {order_id} not found"));
    store.tear_down().await;
}

fn rates_app(rates: Arc<ExchangeRateCache>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::from(rates)).service(exchange_rate);
    }
}

#[actix_web::test]
async fn exchange_rates() {
    let _ = env_logger::try_init().ok();
    let source = Arc::new(StaticRateSource::new().with_rate(CryptoAsset::Bitcoin, dec!(0.005)));
    let rates = Arc::new(ExchangeRateCache::new(source.clone(), RateCacheConfig::default()));

    let (status, body) = send_json(get("/payment/rates/btc", ""), rates_app(rates.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["asset"], "bitcoin");
    assert_eq!(body["data"]["fiat"], "GBP");
    assert_eq!(body["data"]["rate"], "0.005");
    assert_eq!(body["data"]["cached"], false);

    let (_, body) = send_json(get("/payment/rates/bitcoin", ""), rates_app(rates.clone())).await;
    assert_eq!(body["data"]["cached"], true);
    assert_eq!(source.fetch_count(), 1);

    let (status, body) = send_json(get("/payment/rates/doge", ""), rates_app(rates.clone())).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "Could not read request path: Invalid conversion from string: Unsupported crypto asset: doge");

    source.fail_with(Some(ExchangeRateError::FetchFailed("HTTP 429".into())));
    let (status, body) = send_json(get("/payment/rates/monero", ""), rates_app(rates)).await;
    assert_error(status, &body, StatusCode::BAD_GATEWAY, "Server error while fetching the exchange rate");
}

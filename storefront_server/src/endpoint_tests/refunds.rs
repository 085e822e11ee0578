use actix_web::http::StatusCode;
use serde_json::json;
use shop_common::Money;
use storefront_engine::{
    db_types::PaymentMethodType,
    test_utils::{
        fixtures::{alice, place_order_request},
        test_store::TestStore,
    },
};

use super::helpers::{admin_token, assert_error, checkout, issue_token, post, send_json, store_routes};
use crate::auth::Role;

async fn card_order(store: &TestStore, price: Money, token: &str) -> i64 {
    let chair = store.add_product("Chair", price, 2).await;
    store.fill_cart(&alice(), &[(&chair, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some(token));
    let body = checkout(store, &alice(), &request).await;
    body["data"]["orderId"].as_i64().unwrap()
}

#[actix_web::test]
async fn partial_refunds_until_fully_refunded() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = card_order(&store, Money::from_pounds(100), "ok_chair").await;
    let path = format!("/admin/orders/{order_id}/refund");

    let refund = json!({ "refundAmount": "50.00", "refundReason": "Scratched leg" });
    let (status, body) = send_json(post(&path, &admin_token(), &refund), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Refund processed successfully");
    assert_eq!(body["data"]["refund"]["amount"], 50.0);
    assert_eq!(body["data"]["refund"]["actor"], "admin-1");
    assert_eq!(body["data"]["order"]["refundStatus"], "partial_refunded");
    assert_eq!(body["data"]["order"]["totalRefundedAmount"], 50.0);

    let too_much = json!({ "refundAmount": "50.01", "refundReason": "Too much" });
    let (status, body) = send_json(post(&path, &admin_token(), &too_much), store_routes(&store)).await;
    assert_error(
        status,
        &body,
        StatusCode::BAD_REQUEST,
        "Refund amount £50.01 exceeds the maximum refundable amount of £50.00",
    );

    let rest = json!({ "refundAmount": 50, "refundReason": "Returned" });
    let (status, body) = send_json(post(&path, &admin_token(), &rest), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["refundStatus"], "fully_refunded");
    assert_eq!(body["data"]["order"]["status"], "refunded");
    assert_eq!(store.card.refunds().len(), 2);
    store.tear_down().await;
}

#[actix_web::test]
async fn refund_requests_are_validated() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = card_order(&store, Money::from_pounds(100), "ok_desk").await;
    let path = format!("/admin/orders/{order_id}/refund");

    let cases = [
        (json!({ "refundAmount": 150, "refundReason": "Oops" }), "Refund amount £150.00 exceeds the maximum refundable amount of £100.00"),
        (json!({ "refundReason": "No amount" }), "refundAmount is required"),
        (json!({ "refundAmount": -5, "refundReason": "Negative" }), "refundAmount must be a positive number"),
        (json!({ "refundAmount": 5, "refundReason": "  " }), "refundReason is required"),
    ];
    for (request, message) in cases {
        let (status, body) = send_json(post(&path, &admin_token(), &request), store_routes(&store)).await;
        assert_error(status, &body, StatusCode::BAD_REQUEST, message);
    }
    let (status, body) = send_json(post(&path, &admin_token(), &json!({ "refundAmount": "lots" })), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Could not read request body"));
    assert!(store.card.refunds().is_empty());

    let (status, body) =
        send_json(post("/admin/orders/999/refund", &admin_token(), &json!({ "refundAmount": 5, "refundReason": "?" })), store_routes(&store))
            .await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "Order 999 not found");
    store.tear_down().await;
}

#[actix_web::test]
async fn customers_cannot_refund_themselves() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let order_id = card_order(&store, Money::from_pounds(30), "ok_lamp").await;
    let token = issue_token(&alice(), &[Role::Customer]);
    let refund = json!({ "refundAmount": 30, "refundReason": "Please" });
    let (status, body) =
        send_json(post(&format!("/admin/orders/{order_id}/refund"), &token, &refund), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::FORBIDDEN, "Insufficient permissions");
    assert!(store.card.refunds().is_empty());
    store.tear_down().await;
}

use actix_web::http::StatusCode;
use chrono::Duration;
use serde_json::{json, Value};
use shop_common::Money;
use storefront_engine::{
    db_types::{PaymentMethodType, Product},
    test_utils::{
        fixtures::{alice, bob, place_order_request},
        test_store::TestStore,
    },
};

use super::helpers::{admin_token, assert_error, checkout, get, issue_token, post, put, send_json, store_routes};
use crate::auth::Role;

/// Buys two of `product` with a card and has the admin mark the order as delivered.
async fn delivered_order(store: &TestStore, product: &Product) -> i64 {
    store.fill_cart(&alice(), &[(product, 2)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some("ok_returns"));
    let body = checkout(store, &alice(), &request).await;
    let order_id = body["data"]["orderId"].as_i64().unwrap();
    let path = format!("/admin/orders/{order_id}/status");
    let (status, body) =
        send_json(put(&path, &admin_token(), &json!({ "status": "delivered" })), store_routes(store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    order_id
}

fn return_request(order_id: i64, product_id: i64, quantity: i64) -> Value {
    json!({
        "orderId": order_id.to_string(),
        "items": [{ "productId": product_id, "quantity": quantity, "reasonCode": "damaged", "reason": "Cracked" }],
        "images": ["https://img.example.com/crack.jpg"],
    })
}

#[actix_web::test]
async fn submit_and_fetch_a_return() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let plate = store.add_product("Plate", Money::from_pounds(12), 10).await;
    let order_id = delivered_order(&store, &plate).await;
    let token = issue_token(&alice(), &[Role::Customer]);

    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(order_id, plate.id, 1)), store_routes(&store)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Return request submitted");
    let request = &body["data"];
    assert_eq!(request["status"], "pending_review");
    assert_eq!(request["totalRefundAmount"], 12.0);
    assert_eq!(request["totalItemsCount"], 1);
    assert!(request["formattedRequestNumber"].as_str().unwrap().starts_with("RR-"));
    let id = request["id"].as_i64().unwrap();

    let (status, body) = send_json(get(&format!("/user/returns/{id}"), &token), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orderId"], order_id);

    let bob_token = issue_token(&bob(), &[Role::Customer]);
    let (status, body) = send_json(get(&format!("/user/returns/{id}"), &bob_token), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, &format!("Return request {id} not found"));

    // The second plate can still be returned, but not both again
    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(order_id, plate.id, 2)), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(order_id, plate.id, 1)), store_routes(&store)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    store.tear_down().await;
}

#[actix_web::test]
async fn returns_close_after_thirty_days() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let bowl = store.add_product("Bowl", Money::from_pounds(8), 10).await;
    let first = delivered_order(&store, &bowl).await;
    let second = delivered_order(&store, &bowl).await;
    let token = issue_token(&alice(), &[Role::Customer]);

    store.clock.advance(Duration::days(30));
    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(first, bowl.id, 1)), store_routes(&store)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    store.clock.advance(Duration::days(1));
    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(second, bowl.id, 1)), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "The 30-day return window for this order has expired");
    store.tear_down().await;
}

#[actix_web::test]
async fn undelivered_orders_cannot_be_returned() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let cup = store.add_product("Cup", Money::from_pounds(5), 10).await;
    store.fill_cart(&alice(), &[(&cup, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some("ok_cup"));
    let body = checkout(&store, &alice(), &request).await;
    let order_id = body["data"]["orderId"].as_i64().unwrap();
    let token = issue_token(&alice(), &[Role::Customer]);

    let (status, body) =
        send_json(post("/user/returns", &token, &return_request(order_id, cup.id, 1)), store_routes(&store)).await;
    assert_error(
        status,
        &body,
        StatusCode::BAD_REQUEST,
        "Only delivered orders can be returned. Current status: processing",
    );

    let (status, body) = send_json(post("/user/returns", &token, &json!({ "items": [] })), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "orderId is required");
    store.tear_down().await;
}

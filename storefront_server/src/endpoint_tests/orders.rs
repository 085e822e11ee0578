use actix_web::{http::StatusCode, web, web::ServiceConfig};
use mockall::predicate::eq;
use serde_json::json;
use shop_common::Money;
use storefront_engine::{
    db_types::PaymentMethodType,
    events::EventProducers,
    payments::PaymentProviders,
    test_utils::{
        fixtures::{alice, bob, place_order_request, sample_order},
        test_store::TestStore,
    },
    OrderFlowApi,
    StorefrontError,
};

use super::{
    helpers::{admin_token, assert_error, checkout, get, issue_token, post, put, send_json, store_routes},
    mocks::MockStorefrontDb,
};
use crate::{
    auth::Role,
    routes::{AdminOrderRoute, MyOrderRoute, MyOrdersRoute},
};

fn configure_with(db: MockStorefrontDb) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = OrderFlowApi::new(db, PaymentProviders::new(), EventProducers::default());
        cfg.app_data(web::Data::new(api))
            .service(MyOrdersRoute::<MockStorefrontDb>::new())
            .service(MyOrderRoute::<MockStorefrontDb>::new())
            .service(AdminOrderRoute::<MockStorefrontDb>::new());
    }
}

fn db_with_sample_order() -> MockStorefrontDb {
    let mut db = MockStorefrontDb::new();
    db.expect_fetch_order()
        .with(eq(1))
        .times(1)
        .returning(|_| Ok(Some(sample_order(Money::from_pounds(25), PaymentMethodType::Card))));
    db
}

#[actix_web::test]
async fn fetch_my_order() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(get("/user/orders/1", &format!("cookie:{token}")), configure_with(db_with_sample_order())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["orderNumber"], "ORD-20240501-TEST01");
    assert_eq!(body["data"]["customerId"], "cust-1");
    assert_eq!(body["data"]["totalAmount"], 25.0);
}

#[actix_web::test]
async fn other_customers_orders_are_not_found() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&bob(), &[Role::Customer]);
    let (status, body) = send_json(get("/user/orders/1", &token), configure_with(db_with_sample_order())).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "Order 1 not found");
}

#[actix_web::test]
async fn admins_can_fetch_any_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_json(get("/admin/orders/1", &admin_token()), configure_with(db_with_sample_order())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["customerEmail"], "alice@example.com");
}

#[actix_web::test]
async fn fetch_my_orders_paged() {
    let _ = env_logger::try_init().ok();
    let mut db = MockStorefrontDb::new();
    db.expect_fetch_orders_for_customer()
        .withf(|id, page| id == "cust-1" && page.page == 2 && page.limit == 5)
        .times(1)
        .returning(|_, _| Ok((vec![sample_order(Money::from_pounds(25), PaymentMethodType::Card)], 6)));
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(get("/user/orders?page=2&limit=5", &token), configure_with(db)).await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"];
    assert_eq!(page["page"], 2);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["total"], 6);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["orders"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn malformed_paths_and_queries() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(get("/user/orders/abc", &token), configure_with(MockStorefrontDb::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Could not read request path"));

    let (status, body) =
        send_json(get("/user/orders?page=first", &token), configure_with(MockStorefrontDb::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Could not read query parameters"));
}

#[actix_web::test]
async fn database_errors_are_not_leaked() {
    let _ = env_logger::try_init().ok();
    let mut db = MockStorefrontDb::new();
    db.expect_fetch_order().returning(|_| Err(StorefrontError::DatabaseError("database is locked".into())));
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(get("/user/orders/1", &token), configure_with(db)).await;
    assert_error(status, &body, StatusCode::INTERNAL_SERVER_ERROR, "Server error while fetching the order");
}

#[actix_web::test]
async fn order_lifecycle() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let lamp = store.add_product("Lamp", Money::from_pounds(40), 3).await;
    store.fill_cart(&alice(), &[(&lamp, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some("ok_lamp"));
    let body = checkout(&store, &alice(), &request).await;
    assert_eq!(body["message"], "Order placed successfully");
    let placed = &body["data"];
    assert_eq!(placed["status"], "processing");
    assert_eq!(placed["paymentStatus"], "completed");
    assert_eq!(placed["totalAmount"], 40.0);
    let order_id = placed["orderId"].as_i64().unwrap();
    assert_eq!(store.stock_of(&lamp).await, 2);

    // The cart was cleared by checkout
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(post("/user/orders/place-order", &token, &request), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "Your cart is empty");

    let update = json!({ "status": "shipped", "trackingNumber": "1Z999AA10123456784" });
    let path = format!("/admin/orders/{order_id}/status");
    let (status, body) = send_json(put(&path, &admin_token(), &update), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "shipped");
    assert_eq!(body["data"]["trackingNumber"], "1Z999AA10123456784");

    // Shipped orders can no longer be cancelled by the customer
    let cancel = format!("/user/orders/{order_id}/cancel");
    let (status, body) = send_json(post(&cancel, &token, &json!({})), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Nor can an order go back to pending
    let (status, _) = send_json(put(&path, &admin_token(), &json!({ "status": "pending" })), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(get("/user/orders", &token), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    store.tear_down().await;
}

#[actix_web::test]
async fn cancelling_restocks_the_order() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let mug = store.add_product("Mug", Money::from_pence(850), 10).await;
    store.fill_cart(&alice(), &[(&mug, 4)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Paypal, Some("ok_paypal"));
    let body = checkout(&store, &alice(), &request).await;
    let order_id = body["data"]["orderId"].as_i64().unwrap();
    assert_eq!(store.stock_of(&mug).await, 6);

    // Bob cannot cancel Alice's order
    let path = format!("/user/orders/{order_id}/cancel");
    let bob_token = issue_token(&bob(), &[Role::Customer]);
    let (status, body) = send_json(post(&path, &bob_token, &json!({})), store_routes(&store)).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, &format!("Order {order_id} not found"));

    let token = issue_token(&alice(), &[Role::Customer]);
    let reason = json!({ "reason": "Ordered the wrong colour" });
    let (status, body) = send_json(post(&path, &token, &reason), store_routes(&store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(store.stock_of(&mug).await, 10);
    store.tear_down().await;
}

#[actix_web::test]
async fn declined_payments_leave_stock_alone() {
    let _ = env_logger::try_init().ok();
    let store = TestStore::new().await;
    let vase = store.add_product("Vase", Money::from_pounds(60), 1).await;
    store.fill_cart(&alice(), &[(&vase, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some("card_declined"));
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(post("/user/orders/place-order", &token, &request), store_routes(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(store.stock_of(&vase).await, 1);
    store.tear_down().await;
}

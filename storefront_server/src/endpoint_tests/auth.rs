use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Duration;
use storefront_engine::{
    events::EventProducers,
    payments::PaymentProviders,
    test_utils::fixtures::alice,
    OrderFlowApi,
};

use super::{
    helpers::{assert_error, get, issue_token, issue_token_with_lifetime, send, send_json},
    mocks::MockStorefrontDb,
};
use crate::{
    auth::Role,
    routes::{health, AdminOrderRoute, MyOrdersRoute},
};

// No expectations are set, so any database call fails the test.
fn configure(cfg: &mut ServiceConfig) {
    let api = OrderFlowApi::new(MockStorefrontDb::new(), PaymentProviders::new(), EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .service(health)
        .service(MyOrdersRoute::<MockStorefrontDb>::new())
        .service(AdminOrderRoute::<MockStorefrontDb>::new());
}

#[actix_web::test]
async fn health_check_is_public() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send(get("/health", ""), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn fetch_my_orders_without_a_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_json(get("/user/orders", ""), configure).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "Authentication required");
}

#[actix_web::test]
async fn fetch_my_orders_with_invalid_signature() {
    let _ = env_logger::try_init().ok();
    let mut token = issue_token(&alice(), &[Role::Customer]);
    token.replace_range(token.len() - 10..token.len() - 5, "AAAAA");
    let (status, body) = send_json(get("/user/orders", &token), configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid access token."));
}

#[actix_web::test]
async fn fetch_my_orders_with_expired_token() {
    let _ = env_logger::try_init().ok();
    let token = issue_token_with_lifetime(&alice(), &[Role::Customer], Duration::seconds(-120));
    let (status, body) = send_json(get("/user/orders", &token), configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn garbage_tokens_are_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_json(get("/user/orders", "cookie:not-a-jwt"), configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn customers_cannot_use_admin_routes() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&alice(), &[Role::Customer]);
    let (status, body) = send_json(get("/admin/orders/1", &token), configure).await;
    assert_error(status, &body, StatusCode::FORBIDDEN, "Insufficient permissions");
}

#[actix_web::test]
async fn admins_without_the_customer_role_cannot_use_customer_routes() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&alice(), &[Role::Admin]);
    let (status, body) = send_json(get("/user/orders", &token), configure).await;
    assert_error(status, &body, StatusCode::FORBIDDEN, "Insufficient permissions");
}

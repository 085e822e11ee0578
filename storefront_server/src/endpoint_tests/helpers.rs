use actix_web::{
    body::MessageBody,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use storefront_engine::{db_types::CustomerIdentity, order_objects::PlaceOrderRequest, test_utils::test_store::TestStore};

use crate::{
    auth::{JwtClaims, Role, TokenIssuer, TokenValidator, ACCESS_TOKEN_HEADER},
    config::AuthConfig,
    server::{configure_extractors, configure_routes},
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new("c0ffee-endpoint-tests-only-8f3b2a91d7e4c650")
}

pub fn issue_token(customer: &CustomerIdentity, roles: &[Role]) -> String {
    issue_token_with_lifetime(customer, roles, Duration::hours(1))
}

pub fn issue_token_with_lifetime(customer: &CustomerIdentity, roles: &[Role], lifetime: Duration) -> String {
    let claims = JwtClaims::new(customer.id.clone(), customer.email.clone(), roles.to_vec());
    TokenIssuer::new(&get_auth_config()).issue_token(claims, Some(lifetime)).expect("Failed to sign token")
}

pub fn get(path: &str, token: &str) -> TestRequest {
    with_token(TestRequest::get().uri(path), token)
}

pub fn post<T: Serialize>(path: &str, token: &str, body: &T) -> TestRequest {
    with_token(TestRequest::post().uri(path).set_json(body), token)
}

pub fn put<T: Serialize>(path: &str, token: &str, body: &T) -> TestRequest {
    with_token(TestRequest::put().uri(path).set_json(body), token)
}

/// Tokens go in the bearer header. Prefix the token with `cookie:` to send it in the `sf_access_token` header
/// instead.
fn with_token(req: TestRequest, token: &str) -> TestRequest {
    match token {
        "" => req,
        t => match t.strip_prefix("cookie:") {
            Some(t) => req.insert_header((ACCESS_TOKEN_HEADER, t)),
            None => req.insert_header((header::AUTHORIZATION, format!("Bearer {t}"))),
        },
    }
}

/// Sends `req` to an app built by `configure` and returns the status and body. Errors raised by middleware are
/// rendered the same way actix would render them for a real client.
pub async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new()
        .app_data(web::Data::new(TokenValidator::new(&get_auth_config())))
        .configure(configure_extractors)
        .configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let (status, body) = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            (status, test::read_body(res).await)
        },
        Err(e) => {
            let res = e.error_response();
            (res.status(), res.into_body().try_into_bytes().unwrap_or_default())
        },
    };
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// Like [`send`], but parses the body as JSON.
pub async fn send_json<F>(req: TestRequest, configure: F) -> (StatusCode, Value)
where F: FnOnce(&mut ServiceConfig) {
    let (status, body) = send(req, configure).await;
    let json = serde_json::from_str(&body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"));
    (status, json)
}

pub fn assert_error(status: StatusCode, body: &Value, expected_status: StatusCode, message: &str) {
    assert_eq!(status, expected_status, "Unexpected status. Body: {body}");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], message);
}

/// Wires every route to the APIs of a [`TestStore`], so that requests run against its SQLite database, fake payment
/// services and manual clock.
pub fn store_routes(store: &TestStore) -> impl FnOnce(&mut ServiceConfig) {
    let orders = store.order_api();
    let payments = store.payment_api();
    let refunds = store.refund_api();
    let returns = store.returns_api();
    move |cfg| {
        cfg.app_data(web::Data::new(orders))
            .app_data(web::Data::new(payments))
            .app_data(web::Data::new(refunds))
            .app_data(web::Data::new(returns));
        configure_routes(cfg);
    }
}

/// Places an order for `customer` through the checkout route and returns the response body.
pub async fn checkout(store: &TestStore, customer: &CustomerIdentity, request: &PlaceOrderRequest) -> Value {
    let token = issue_token(customer, &[Role::Customer]);
    let (status, body) =
        send_json(post("/user/orders/place-order", &token, request), store_routes(store)).await;
    assert_eq!(status, StatusCode::CREATED, "Checkout failed: {body}");
    body
}

pub fn admin_token() -> String {
    issue_token(&CustomerIdentity::new("admin-1", "admin@example.com"), &[Role::Admin])
}

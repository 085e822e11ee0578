use std::str::FromStr;

use chrono::Duration;
use cucumber::{then, when};
use rust_decimal::Decimal;
use serde_json::json;
use storefront_engine::{
    db_types::{OrderStatus, PaymentMethodType, PaymentStatus, ReturnReason},
    helpers::sign_payload,
    order_objects::UpdateStatusRequest,
    payment_objects::RefundRequest,
    return_objects::{ReturnItemRequest, SubmitReturnRequest},
    test_utils::{fixtures::place_order_request, test_store::WEBHOOK_SECRET},
    StorefrontDatabase,
};

use crate::cucumber::{world::customer, StorefrontWorld};

#[when(expr = "'{word}' pays by card with token '{word}'")]
async fn pay_by_card(world: &mut StorefrontWorld, name: String, token: String) {
    let request = place_order_request(world.store().shipping.id, PaymentMethodType::Card, Some(&token));
    let result = world.store().order_api().place_order(&customer(&name), request).await;
    if let Some(order) = world.record(result) {
        world.last_order = Some(order);
    }
}

#[when(expr = "'{word}' checks out with {word}")]
async fn checkout_with_crypto(world: &mut StorefrontWorld, name: String, method: String) {
    let method = PaymentMethodType::from_str(&method).expect("Not a payment method");
    let request = place_order_request(world.store().shipping.id, method, None);
    let result = world.store().order_api().place_order(&customer(&name), request).await;
    if let Some(order) = world.record(result) {
        world.last_order = Some(order);
    }
}

#[when(expr = "the {word} gateway reports {int} subunits with {int} confirmations for the last order")]
async fn gateway_webhook(world: &mut StorefrontWorld, method: String, value: u64, confirmations: u32) {
    let method = PaymentMethodType::from_str(&method).expect("Not a payment method");
    let order = world.store().db.fetch_order(world.last_order_id()).await.expect("Error fetching order");
    let order = order.expect("Order does not exist");
    let payload = json!({
        "address": order.payment_details.reference(),
        "txid": "tx-cucumber",
        "value": value,
        "confirmations": confirmations,
    });
    let payload = serde_json::to_vec(&payload).expect("Error serializing webhook");
    let signature = sign_payload(&payload, WEBHOOK_SECRET);
    let result = world.store().payment_api().process_webhook(method, &payload, Some(&signature)).await;
    world.record(result);
}

#[when(expr = "{int} hours pass")]
async fn hours_pass(world: &mut StorefrontWorld, hours: i64) {
    world.store().clock.advance(Duration::hours(hours));
}

#[when(expr = "{int} days pass")]
async fn days_pass(world: &mut StorefrontWorld, days: i64) {
    world.store().clock.advance(Duration::days(days));
}

#[when("the payment sweep runs")]
async fn payment_sweep(world: &mut StorefrontWorld) {
    let result = world.store().payment_api().expire_overdue_payments().await;
    world.record(result);
}

#[when(expr = "the admin marks the last order as {word}")]
async fn admin_update_status(world: &mut StorefrontWorld, status: String) {
    let status = OrderStatus::from_str(&status).expect("Not an order status");
    let id = world.last_order_id();
    let result = world.store().order_api().update_order_status(id, UpdateStatusRequest::to(status), "admin").await;
    world.record(result);
}

#[when(expr = "'{word}' cancels the last order")]
async fn customer_cancels(world: &mut StorefrontWorld, name: String) {
    let id = world.last_order_id();
    let result = world.store().order_api().cancel_order(&customer(&name), id, None).await;
    world.record(result);
}

#[when(expr = "the admin refunds {word} pounds because {string}")]
async fn admin_refund(world: &mut StorefrontWorld, amount: String, reason: String) {
    let amount = Decimal::from_str(&amount).expect("Not a decimal amount");
    let id = world.last_order_id();
    let result = world.store().refund_api().issue_refund(id, RefundRequest::new(amount, reason), "admin").await;
    world.record(result);
}

#[when(expr = "'{word}' returns {int} '{word}' as {word}")]
async fn customer_return(world: &mut StorefrontWorld, name: String, quantity: i64, product: String, reason: String) {
    let reason = serde_json::from_value::<ReturnReason>(json!(reason)).expect("Not a return reason");
    let product_id = world.product(&product).id;
    let request =
        SubmitReturnRequest::new(world.last_order_id(), vec![ReturnItemRequest::new(product_id, quantity, reason)]);
    let result = world.store().returns_api().submit_return(&customer(&name), request).await;
    if let Some(rr) = world.record(result) {
        world.last_return = Some(rr);
    }
}

#[then(expr = "the last order is {word} with payment {word}")]
async fn check_order_status(world: &mut StorefrontWorld, status: String, payment: String) {
    let order = world.store().db.fetch_order(world.last_order_id()).await.expect("Error fetching order");
    let order = order.expect("Order does not exist");
    assert_eq!(order.status, OrderStatus::from_str(&status).expect("Not an order status"));
    assert_eq!(order.payment_status, PaymentStatus::from_str(&payment).expect("Not a payment status"));
}

#[then(expr = "the last order has {int} refunds totalling {word} pounds")]
async fn check_refunds(world: &mut StorefrontWorld, count: usize, total: String) {
    let order = world.store().db.fetch_order(world.last_order_id()).await.expect("Error fetching order");
    let order = order.expect("Order does not exist");
    assert_eq!(order.refund_history.len(), count);
    assert_eq!(order.total_refunded_amount.to_decimal(), Decimal::from_str(&total).expect("Not a decimal amount"));
}

#[then(expr = "'{word}' has {int} in stock")]
async fn check_stock(world: &mut StorefrontWorld, product: String, stock: i64) {
    let product = world.product(&product).clone();
    assert_eq!(world.store().stock_of(&product).await, stock);
}

#[then(expr = "the request fails with {string}")]
async fn check_error(world: &mut StorefrontWorld, message: String) {
    assert_eq!(world.last_error.as_deref(), Some(message.as_str()));
}

#[then("the request succeeds")]
async fn check_success(world: &mut StorefrontWorld) {
    assert!(world.last_error.is_none(), "Request failed: {:?}", world.last_error);
}

#[then(expr = "the last return request is numbered {word}")]
async fn check_return_number(world: &mut StorefrontWorld, number: String) {
    let rr = world.last_return.as_ref().expect("No return request has been submitted");
    assert_eq!(rr.formatted_request_number, number);
}

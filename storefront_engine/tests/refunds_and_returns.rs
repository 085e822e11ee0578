use chrono::Duration;
use rust_decimal_macros::dec;
use shop_common::Money;
use storefront_engine::{
    db_types::{OrderStatus, PaymentMethodType, PaymentStatus, Product, RefundStatus, ReturnReason, ReturnStatus},
    events::{EventProducer, EventProducers, OrderRefundedEvent},
    order_objects::{PlacedOrder, UpdateStatusRequest},
    payment_objects::RefundRequest,
    payments::MANUAL_REFUND_REQUIRED,
    return_objects::{ReturnItemRequest, SubmitReturnRequest},
    test_utils::{
        fixtures::{alice, bob, place_order_request},
        test_store::TestStore,
    },
    StorefrontDatabase,
    StorefrontError,
};
use tokio::sync::mpsc;

async fn card_order(store: &TestStore, lines: &[(&Product, i64)], token: &str) -> PlacedOrder {
    store.fill_cart(&alice(), lines).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Card, Some(token));
    store.order_api().place_order(&alice(), request).await.expect("Error placing card order")
}

async fn deliver(store: &TestStore, order_id: i64) {
    store
        .order_api()
        .update_order_status(order_id, UpdateStatusRequest::to(OrderStatus::Delivered), "admin@example.com")
        .await
        .expect("Error marking order as delivered");
}

#[tokio::test]
async fn two_partial_refunds_fully_refund_the_order() {
    let (refund_tx, mut refund_rx) = mpsc::channel::<OrderRefundedEvent>(10);
    let mut producers = EventProducers::default();
    producers.order_refunded_producer.push(EventProducer::new(refund_tx));
    let store = TestStore::new().await.with_producers(producers);
    let chair = store.add_product("Chair", Money::from_pounds(100), 2).await;
    let placed = card_order(&store, &[(&chair, 1)], "ok_chair").await;
    let api = store.refund_api();

    let first = api.issue_refund(placed.order_id, RefundRequest::new(dec!(50), "Scratched leg"), "admin").await.unwrap();
    assert_eq!(first.order.refund_status, RefundStatus::PartialRefunded);
    assert_eq!(first.order.total_refunded_amount, Money::from_pounds(50));
    assert_eq!(first.order.status, OrderStatus::Processing);
    assert_eq!(first.refund.provider_status, "succeeded");
    assert_eq!(first.refund.actor, "admin");

    let err = api.issue_refund(placed.order_id, RefundRequest::new(dec!(50.01), "Too much"), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "Refund amount £50.01 exceeds the maximum refundable amount of £50.00");

    let second = api.issue_refund(placed.order_id, RefundRequest::new(dec!(50), "Returned"), "admin").await.unwrap();
    assert_eq!(second.order.refund_status, RefundStatus::FullyRefunded);
    assert_eq!(second.order.payment_status, PaymentStatus::Refunded);
    assert_eq!(second.order.status, OrderStatus::Refunded);
    assert_eq!(second.order.refund_history.len(), 2);
    assert_ne!(first.refund.refund_id, second.refund.refund_id);

    let refunds = store.card.refunds();
    assert_eq!(refunds, vec![
        ("ok_chair".to_string(), Money::from_pounds(50)),
        ("ok_chair".to_string(), Money::from_pounds(50)),
    ]);
    assert!(refund_rx.try_recv().is_ok());
    assert!(refund_rx.try_recv().is_ok());
    assert!(refund_rx.try_recv().is_err());

    let err = api.issue_refund(placed.order_id, RefundRequest::new(dec!(1), "Again"), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot refund order with payment status: refunded");
    store.tear_down().await;
}

#[tokio::test]
async fn refunds_are_validated_before_the_provider_is_called() {
    let store = TestStore::new().await;
    let desk = store.add_product("Desk", Money::from_pounds(100), 2).await;
    let placed = card_order(&store, &[(&desk, 1)], "ok_desk").await;
    let api = store.refund_api();

    let err = api.issue_refund(placed.order_id, RefundRequest::new(dec!(150), "Oops"), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "Refund amount £150.00 exceeds the maximum refundable amount of £100.00");

    let err = api.issue_refund(placed.order_id, RefundRequest::default(), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "refundAmount is required");
    let err = api.issue_refund(placed.order_id, RefundRequest::new(dec!(-5), "Negative"), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "refundAmount must be a positive number");
    let err = api.issue_refund(placed.order_id, RefundRequest::new(dec!(5), "   "), "admin").await.unwrap_err();
    assert_eq!(err.to_string(), "refundReason is required");
    let err = api.issue_refund(9999, RefundRequest::new(dec!(5), "Missing"), "admin").await.unwrap_err();
    assert!(matches!(err, StorefrontError::OrderNotFound(_)));

    assert!(store.card.refunds().is_empty());
    let order = store.db.fetch_order(placed.order_id).await.unwrap().unwrap();
    assert_eq!(order.total_refunded_amount, Money::ZERO);
    store.tear_down().await;
}

#[tokio::test]
async fn unpaid_orders_cannot_be_refunded() {
    let store = TestStore::new().await;
    let lamp = store.add_product("Lamp", Money::from_pounds(20), 2).await;
    store.fill_cart(&alice(), &[(&lamp, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Monero, None);
    let placed = store.order_api().place_order(&alice(), request).await.unwrap();

    let err = store
        .refund_api()
        .issue_refund(placed.order_id, RefundRequest::new(dec!(5), "Goodwill"), "admin")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot refund order with payment status: pending");
    store.tear_down().await;
}

#[tokio::test]
async fn crypto_refunds_are_recorded_for_manual_payout() {
    let store = TestStore::new().await;
    let lamp = store.add_product("Lamp", Money::from_pounds(20), 2).await;
    store.fill_cart(&alice(), &[(&lamp, 1)]).await;
    let request = place_order_request(store.shipping.id, PaymentMethodType::Bitcoin, None);
    let placed = store.order_api().place_order(&alice(), request).await.unwrap();
    store.btc_gateway.set_activity("BTC-addr-1", "tx-lamp", 10_000_000, 6);
    store.payment_api().poll_pending_payments().await.unwrap();

    let result = store
        .refund_api()
        .issue_refund(placed.order_id, RefundRequest::new(dec!(5), "Goodwill"), "admin")
        .await
        .unwrap();
    assert_eq!(result.refund.provider_status, MANUAL_REFUND_REQUIRED);
    assert!(result.refund.provider_refund_id.is_none());
    assert_eq!(result.order.max_refundable(), Money::from_pounds(15));
    store.tear_down().await;
}

#[tokio::test]
async fn returns_are_accepted_until_the_window_closes() {
    let store = TestStore::new().await;
    let teapot = store.add_product("Teapot", Money::from_pounds(25), 10).await;
    let cups = store.add_product("Cup", Money::from_pounds(5), 10).await;
    let first = card_order(&store, &[(&teapot, 1), (&cups, 4)], "ok_first").await;
    let second = card_order(&store, &[(&teapot, 1)], "ok_second").await;
    deliver(&store, first.order_id).await;
    deliver(&store, second.order_id).await;
    let api = store.returns_api();

    store.clock.advance(Duration::days(30));
    let request = SubmitReturnRequest::new(first.order_id, vec![
        ReturnItemRequest::new(cups.id, 1, ReturnReason::Damaged),
        ReturnItemRequest::new(cups.id, 1, ReturnReason::Damaged),
    ]);
    let rr = api.submit_return(&alice(), request).await.unwrap();
    assert_eq!(rr.formatted_request_number, "RR-20240531-0001");
    assert_eq!(rr.return_request_number, 20240531_0001);
    assert_eq!(rr.status, ReturnStatus::PendingReview);
    assert_eq!(rr.items.len(), 1);
    assert_eq!(rr.items[0].quantity, 2);
    assert_eq!(rr.total_refund_amount, Money::from_pounds(10));
    assert_eq!(rr.total_items_count, 2);
    assert_eq!(rr.return_window, 30);

    let order = store.db.fetch_order(first.order_id).await.unwrap().unwrap();
    assert!(order.has_active_return);
    assert_eq!(order.return_request_ids, vec![rr.id]);

    let fetched = api.return_request_for_customer(&alice(), rr.id).await.unwrap();
    assert_eq!(fetched, rr);
    let err = api.return_request_for_customer(&bob(), rr.id).await.unwrap_err();
    assert!(matches!(err, StorefrontError::ReturnRequestNotFound(_)));

    let rr2 = api
        .submit_return(&alice(), SubmitReturnRequest::new(second.order_id, vec![ReturnItemRequest::new(
            teapot.id,
            1,
            ReturnReason::NoLongerNeeded,
        )]))
        .await
        .unwrap();
    assert_eq!(rr2.formatted_request_number, "RR-20240531-0002");

    store.clock.advance(Duration::days(1));
    let request = SubmitReturnRequest::new(first.order_id, vec![ReturnItemRequest::new(
        teapot.id,
        1,
        ReturnReason::WrongItem,
    )]);
    let err = api.submit_return(&alice(), request).await.unwrap_err();
    assert_eq!(err.to_string(), "The 30-day return window for this order has expired");
    store.tear_down().await;
}

#[tokio::test]
async fn items_cannot_be_returned_twice() {
    let store = TestStore::new().await;
    let cups = store.add_product("Cup", Money::from_pounds(5), 10).await;
    let placed = card_order(&store, &[(&cups, 3)], "ok_cups").await;
    let api = store.returns_api();

    let request = SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(cups.id, 1, ReturnReason::Damaged)]);
    let err = api.submit_return(&alice(), request.clone()).await.unwrap_err();
    assert_eq!(err.to_string(), "Only delivered orders can be returned. Current status: processing");

    deliver(&store, placed.order_id).await;
    api.submit_return(&alice(), request.clone()).await.unwrap();
    let two_more = SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(cups.id, 2, ReturnReason::Damaged)]);
    api.submit_return(&alice(), two_more).await.unwrap();

    let err = api.submit_return(&alice(), request.clone()).await.unwrap_err();
    assert!(matches!(err, StorefrontError::DuplicateReturn(_)), "{err:?}");

    let err = api.submit_return(&bob(), request).await.unwrap_err();
    assert!(matches!(err, StorefrontError::OrderNotFound(_)));

    let stranger = SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(
        cups.id + 100,
        1,
        ReturnReason::Other,
    )]);
    let err = api.submit_return(&alice(), stranger).await.unwrap_err();
    assert!(matches!(err, StorefrontError::ValidationError(_)));

    let requests = store.db.fetch_return_requests_for_order(placed.order_id).await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests.iter().map(|r| r.total_items_count).sum::<i64>(), 3);
    store.tear_down().await;
}

#[tokio::test]
async fn oversized_return_quantities_are_rejected() {
    let store = TestStore::new().await;
    let chair = store.add_product("Chair", Money::from_pounds(40), 5).await;
    let placed = card_order(&store, &[(&chair, 2)], "ok_chairs").await;
    deliver(&store, placed.order_id).await;
    let api = store.returns_api();

    let doubled = SubmitReturnRequest::new(placed.order_id, vec![
        ReturnItemRequest::new(chair.id, i64::MAX, ReturnReason::Damaged),
        ReturnItemRequest::new(chair.id, i64::MAX, ReturnReason::Damaged),
    ]);
    let err = api.submit_return(&alice(), doubled).await.unwrap_err();
    assert!(matches!(err, StorefrontError::ValidationError(_)), "{err:?}");

    let one = SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(chair.id, 1, ReturnReason::Damaged)]);
    api.submit_return(&alice(), one).await.unwrap();
    let huge =
        SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(chair.id, i64::MAX, ReturnReason::Damaged)]);
    let err = api.submit_return(&alice(), huge).await.unwrap_err();
    assert!(matches!(err, StorefrontError::DuplicateReturn(_)), "{err:?}");
    assert_eq!(store.db.fetch_return_requests_for_order(placed.order_id).await.unwrap().len(), 1);
    store.tear_down().await;
}

#[tokio::test]
async fn concurrent_refunds_cannot_overdraw_the_order() {
    let store = TestStore::new().await;
    let lamp = store.add_product("Lamp", Money::from_pounds(100), 2).await;
    let placed = card_order(&store, &[(&lamp, 1)], "ok_lamp").await;
    let api = store.refund_api();
    let shared = api.clone();

    let (a, b) = tokio::join!(
        api.issue_refund(placed.order_id, RefundRequest::new(dec!(60), "Dented"), "admin-a"),
        shared.issue_refund(placed.order_id, RefundRequest::new(dec!(60), "Dented"), "admin-b"),
    );
    let (ok, err) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        other => panic!("Exactly one refund should succeed. Got {other:?}"),
    };
    assert_eq!(ok.order.total_refunded_amount, Money::from_pounds(60));
    assert_eq!(err.to_string(), "Refund amount £60.00 exceeds the maximum refundable amount of £40.00");

    // Only the refund that was recorded reached the provider
    assert_eq!(store.card.refunds(), vec![("ok_lamp".to_string(), Money::from_pounds(60))]);
    let order = store.db.fetch_order(placed.order_id).await.unwrap().unwrap();
    assert_eq!(order.refund_history.len(), 1);
    assert_eq!(order.total_refunded_amount, Money::from_pounds(60));
    store.tear_down().await;
}

#[tokio::test]
async fn the_daily_return_sequence_is_capped() {
    let store = TestStore::new().await;
    let kettle = store.add_product("Kettle", Money::from_pounds(20), 5).await;
    let placed = card_order(&store, &[(&kettle, 1)], "ok_kettle").await;
    let other = card_order(&store, &[(&kettle, 1)], "ok_kettle_2").await;
    deliver(&store, placed.order_id).await;

    // Someone has already used the last number of the day
    sqlx::query(
        "INSERT INTO return_requests (return_request_number, formatted_request_number, order_id, customer_id, \
         customer_email, status, document, created_at) VALUES ($1, 'RR-20240501-9999', $2, 'x', 'x@example.com', \
         'pending_review', '{}', CURRENT_TIMESTAMP)",
    )
    .bind(20240501_9999i64)
    .bind(other.order_id)
    .execute(store.db.pool())
    .await
    .unwrap();

    let request = SubmitReturnRequest::new(placed.order_id, vec![ReturnItemRequest::new(
        kettle.id,
        1,
        ReturnReason::Defective,
    )]);
    let err = store.returns_api().submit_return(&alice(), request).await.unwrap_err();
    assert!(matches!(err, StorefrontError::InvalidState(_)), "{err:?}");
    let order = store.db.fetch_order(placed.order_id).await.unwrap().unwrap();
    assert!(order.return_request_ids.is_empty());
    assert!(!order.has_active_return);
    store.tear_down().await;
}

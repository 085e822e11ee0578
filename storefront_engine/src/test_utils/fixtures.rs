use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use shop_common::{Money, STORE_CURRENCY_CODE};

use crate::{
    db_types::{
        Address,
        CardDetails,
        CryptoAsset,
        CryptoPaymentDetails,
        CustomerIdentity,
        Order,
        OrderItem,
        OrderStatus,
        PayPalDetails,
        PaymentDetails,
        PaymentMethod,
        PaymentMethodType,
        PaymentStatus,
        ShippingSelection,
    },
    order_objects::{PaymentSelection, PlaceOrderRequest},
};

pub fn alice() -> CustomerIdentity {
    CustomerIdentity::new("cust-1", "alice@example.com")
}

pub fn bob() -> CustomerIdentity {
    CustomerIdentity::new("cust-2", "bob@example.com")
}

pub fn sample_address() -> Address {
    Address {
        full_name: "Alice Liddell".into(),
        line1: "1 Rabbit Hole Lane".into(),
        line2: None,
        city: "Oxford".into(),
        state: None,
        postal_code: "OX1 1AA".into(),
        country: "GB".into(),
        phone: None,
    }
}

pub fn place_order_request(shipping_method_id: i64, method: PaymentMethodType, token: Option<&str>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        shipping_address: sample_address(),
        billing_address: None,
        shipping_method_id,
        payment_method: PaymentSelection { method, token: token.map(String::from) },
        promotion_code: None,
    }
}

/// Payment details as a provider would have produced them for a fresh order.
pub fn sample_payment_details(method: PaymentMethodType, amount: Decimal) -> PaymentDetails {
    let now = Utc::now();
    match method {
        PaymentMethodType::Card => PaymentDetails::Card(CardDetails {
            payment_intent_id: "pi_test".into(),
            charge_id: None,
            card_brand: Some("visa".into()),
            last4: Some("4242".into()),
        }),
        PaymentMethodType::Paypal => PaymentDetails::Paypal(PayPalDetails {
            paypal_order_id: "PAYPAL-TEST".into(),
            capture_id: Some("CAPTURE-TEST".into()),
            payer_email: None,
        }),
        PaymentMethodType::Bitcoin | PaymentMethodType::Monero => {
            let asset = method.crypto_asset().unwrap_or(CryptoAsset::Bitcoin);
            PaymentDetails::for_crypto(asset, CryptoPaymentDetails {
                address: format!("{}-addr-test", asset.symbol()),
                expected_amount: amount,
                exchange_rate: Decimal::new(5, 3),
                rate_timestamp: now,
                expires_at: now + Duration::hours(24),
                qr_payload: String::new(),
                received_amount: Decimal::ZERO,
                confirmations: 0,
                txid: None,
                underpayment: None,
            })
        },
    }
}

/// A pending, unpaid order for [`alice`] with a single line item (product 1) priced at `total`.
pub fn sample_order(total: Money, method: PaymentMethodType) -> Order {
    let now = Utc::now();
    let customer = alice();
    let mut order = Order {
        id: 1,
        order_number: "ORD-20240501-TEST01".into(),
        customer_id: customer.id,
        customer_email: customer.email,
        items: vec![OrderItem {
            product_id: 1,
            name: "Tea Set".into(),
            slug: "tea-set".into(),
            image: None,
            quantity: 1,
            unit_price: total,
            line_total: total,
            weight_grams: 500,
        }],
        subtotal: total,
        tax: Money::ZERO,
        shipping_cost: Money::ZERO,
        discount: Money::ZERO,
        total_amount: total,
        currency: STORE_CURRENCY_CODE.into(),
        shipping_address: sample_address(),
        billing_address: sample_address(),
        shipping_method: ShippingSelection { id: 1, name: "Standard".into(), cost: Money::ZERO },
        payment_method: PaymentMethod::from(method),
        payment_details: sample_payment_details(method, total.to_decimal() * Decimal::new(5, 3)),
        payment_status: PaymentStatus::Pending,
        status: OrderStatus::Pending,
        status_history: vec![],
        refund_status: Default::default(),
        refund_history: vec![],
        total_refunded_amount: Money::ZERO,
        tracking_number: None,
        tracking_url: None,
        return_request_ids: vec![],
        has_active_return: false,
        promotion_code: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
        version: 1,
    };
    order.record_status(OrderStatus::Pending, now, Some("Order placed"));
    order
}

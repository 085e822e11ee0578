//! PayPal payments through the Orders v2 API.
//!
//! The client approves a PayPal order and sends its id with the checkout. Checkout captures the order (or, if it was
//! already captured, reads it back) and accepts it if the completed capture matches the order total.
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use shop_common::{Money, Secret};

use crate::{
    db_types::{PayPalDetails, PaymentDetails, PaymentMethodType},
    helpers::{build_http_client, path_segment, send_json, HttpCallError},
    payments::{PaymentInit, PaymentProvider, PaymentProviderError, PaymentRequest, ProviderRefund},
};

pub const DEFAULT_PAYPAL_API_URL: &str = "https://api-m.paypal.com";

#[derive(Debug, Clone)]
pub struct PayPalProviderConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PayPalProvider {
    client: Client,
    config: PayPalProviderConfig,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PayPalOrder {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    payer: Option<Payer>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    status: String,
    amount: PayPalAmount,
}

#[derive(Debug, Deserialize)]
struct PayPalAmount {
    currency_code: String,
    value: Decimal,
}

#[derive(Debug, Deserialize)]
struct Payer {
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

impl PayPalProvider {
    pub fn new(mut config: PayPalProviderConfig) -> Result<Self, PaymentProviderError> {
        let client = build_http_client(config.timeout)?;
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    async fn access_token(&self) -> Result<String, PaymentProviderError> {
        let url = format!("{}/v1/oauth2/token", self.config.api_url);
        let request = self
            .client
            .post(url)
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.reveal()))
            .form(&[("grant_type", "client_credentials")]);
        let token = send_json::<AccessToken>(request).await?;
        Ok(token.access_token)
    }

    /// Captures the order. An order that has already been captured is read back instead.
    async fn capture(&self, token: &str, order_id: &str) -> Result<PayPalOrder, PaymentProviderError> {
        let url = format!("{}/v2/checkout/orders/{order_id}/capture", self.config.api_url);
        let request = self.client.post(url).bearer_auth(token).json(&json!({}));
        match send_json::<PayPalOrder>(request).await {
            Ok(order) => Ok(order),
            Err(HttpCallError::QueryError { status, message })
                if status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() && message.contains("ORDER_ALREADY_CAPTURED") =>
            {
                debug!("💰️ PayPal order {order_id} was already captured. Fetching it.");
                let url = format!("{}/v2/checkout/orders/{order_id}", self.config.api_url);
                Ok(send_json::<PayPalOrder>(self.client.get(url).bearer_auth(token)).await?)
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PaymentProvider for PayPalProvider {
    fn method(&self) -> PaymentMethodType {
        PaymentMethodType::Paypal
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentProviderError> {
        let order_id = request
            .provider_token
            .as_deref()
            .ok_or_else(|| PaymentProviderError::InvalidPayload("A PayPal order id is required".into()))?;
        let order_id = path_segment(order_id)
            .ok_or_else(|| PaymentProviderError::InvalidPayload("The PayPal order id is malformed".into()))?;
        let token = self.access_token().await?;
        let order = self.capture(&token, order_id).await?;
        if order.status != "COMPLETED" {
            return Err(PaymentProviderError::Declined(format!("PayPal order is {}", order.status)));
        }
        let capture = order
            .purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .find(|c| c.status == "COMPLETED")
            .ok_or_else(|| PaymentProviderError::Declined("PayPal order has no completed capture".into()))?;
        let expected = request.amount.to_decimal();
        if capture.amount.value != expected || !capture.amount.currency_code.eq_ignore_ascii_case(&request.currency) {
            warn!(
                "💰️ PayPal capture {} is for {} {} but order {} is for {}",
                capture.id, capture.amount.value, capture.amount.currency_code, request.order_number, request.amount
            );
            return Err(PaymentProviderError::Declined("The PayPal payment does not match the order total".into()));
        }
        let details = PayPalDetails {
            paypal_order_id: order.id.clone(),
            capture_id: Some(capture.id.clone()),
            payer_email: order.payer.and_then(|p| p.email_address),
        };
        debug!("💰️ PayPal order {} captured for {}", details.paypal_order_id, request.order_number);
        Ok(PaymentInit { details: PaymentDetails::Paypal(details), settled: true })
    }

    fn required_confirmations(&self) -> u32 {
        0
    }

    fn tolerance(&self) -> Decimal {
        Decimal::ZERO
    }

    async fn refund(
        &self,
        details: &PaymentDetails,
        amount: Money,
        currency: &str,
    ) -> Result<ProviderRefund, PaymentProviderError> {
        let PaymentDetails::Paypal(paypal) = details else {
            return Err(PaymentProviderError::InvalidPayload("Not a PayPal payment".into()));
        };
        let capture_id = paypal
            .capture_id
            .as_deref()
            .ok_or_else(|| PaymentProviderError::InvalidPayload("The PayPal payment has no capture to refund".into()))?;
        let token = self.access_token().await?;
        let url = format!("{}/v2/payments/captures/{capture_id}/refund", self.config.api_url);
        let body = json!({ "amount": { "value": format!("{:.2}", amount.to_decimal()), "currency_code": currency } });
        let refund = send_json::<RefundResponse>(self.client.post(url).bearer_auth(token).json(&body)).await?;
        if refund.status == "FAILED" || refund.status == "CANCELLED" {
            return Err(PaymentProviderError::Declined(format!("The PayPal refund {} {}", refund.id, refund.status)));
        }
        info!("💰️ PayPal refund {} for capture {capture_id} is {}", refund.id, refund.status);
        Ok(ProviderRefund { status: refund.status.to_lowercase(), refund_id: Some(refund.id) })
    }
}

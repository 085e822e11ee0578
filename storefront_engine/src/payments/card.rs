//! Card payments through a Stripe-style PaymentIntents API.
//!
//! The client confirms the payment intent with the provider, then sends its id with the order. Checkout retrieves the
//! intent and only accepts it if it has succeeded for exactly the order total.
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use shop_common::{Money, Secret};

use crate::{
    db_types::{CardDetails, PaymentDetails, PaymentMethodType},
    helpers::{build_http_client, path_segment, send_json},
    payments::{PaymentInit, PaymentProvider, PaymentProviderError, PaymentRequest, ProviderRefund},
};

pub const DEFAULT_CARD_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct CardProviderConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CardProvider {
    client: Client,
    api_url: String,
    secret_key: Secret<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    /// In minor units
    amount: i64,
    currency: String,
    #[serde(default)]
    latest_charge: Option<String>,
    #[serde(default)]
    payment_method_details: Option<CardMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct CardMethodDetails {
    #[serde(default)]
    card: Option<CardSummary>,
}

#[derive(Debug, Deserialize)]
struct CardSummary {
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

impl CardProvider {
    pub fn new(config: CardProviderConfig) -> Result<Self, PaymentProviderError> {
        let client = build_http_client(config.timeout)?;
        let api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(Self { client, api_url, secret_key: config.secret_key })
    }

    async fn fetch_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentProviderError> {
        let url = format!("{}/v1/payment_intents/{intent_id}", self.api_url);
        let request = self.client.get(url).bearer_auth(self.secret_key.reveal());
        Ok(send_json::<PaymentIntent>(request).await?)
    }
}

#[async_trait]
impl PaymentProvider for CardProvider {
    fn method(&self) -> PaymentMethodType {
        PaymentMethodType::Card
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentProviderError> {
        let intent_id = request
            .provider_token
            .as_deref()
            .ok_or_else(|| PaymentProviderError::InvalidPayload("A payment intent id is required".into()))?;
        let intent_id = path_segment(intent_id)
            .ok_or_else(|| PaymentProviderError::InvalidPayload("The payment intent id is malformed".into()))?;
        let intent = self.fetch_intent(intent_id).await?;
        if intent.status != "succeeded" {
            info!("💰️ Payment intent {intent_id} for {} has status {}", request.order_number, intent.status);
            return Err(PaymentProviderError::Declined(format!("Card payment has not succeeded ({})", intent.status)));
        }
        if intent.amount != request.amount.value() || !intent.currency.eq_ignore_ascii_case(&request.currency) {
            warn!(
                "💰️ Payment intent {intent_id} is for {} {} but order {} is for {}",
                intent.amount, intent.currency, request.order_number, request.amount
            );
            return Err(PaymentProviderError::Declined("The card payment does not match the order total".into()));
        }
        let card = intent.payment_method_details.and_then(|d| d.card);
        let details = CardDetails {
            payment_intent_id: intent.id,
            charge_id: intent.latest_charge,
            card_brand: card.as_ref().and_then(|c| c.brand.clone()),
            last4: card.and_then(|c| c.last4),
        };
        debug!("💰️ Card payment {} verified for {}", details.payment_intent_id, request.order_number);
        Ok(PaymentInit { details: PaymentDetails::Card(details), settled: true })
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
        _currency: &str,
    ) -> Result<ProviderRefund, PaymentProviderError> {
        let PaymentDetails::Card(card) = details else {
            return Err(PaymentProviderError::InvalidPayload("Not a card payment".into()));
        };
        let url = format!("{}/v1/refunds", self.api_url);
        let amount = amount.value().to_string();
        let form = [("payment_intent", card.payment_intent_id.as_str()), ("amount", amount.as_str())];
        let request = self.client.post(url).bearer_auth(self.secret_key.reveal()).form(&form);
        let refund = send_json::<RefundResponse>(request).await?;
        if refund.status == "failed" || refund.status == "canceled" {
            return Err(PaymentProviderError::Declined(format!("The card refund {} {}", refund.id, refund.status)));
        }
        info!("💰️ Card refund {} for intent {} is {}", refund.id, card.payment_intent_id, refund.status);
        Ok(ProviderRefund { status: refund.status, refund_id: Some(refund.id) })
    }
}

use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use shop_common::Secret;

use crate::{
    helpers::{build_http_client, send_json, HttpCallError},
    payments::PaymentProviderError,
};

/// Activity seen at a receiving address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressActivity {
    pub txid: Option<String>,
    /// Total received, in the asset's smallest unit
    pub value: u64,
    pub confirmations: u32,
}

/// A wallet or block-explorer service that hands out receiving addresses and reports what they have received.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Allocates a fresh receiving address, labelled with the order number.
    async fn new_address(&self, label: &str) -> Result<String, PaymentProviderError>;

    /// `None` if nothing has been sent to the address yet.
    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, PaymentProviderError>;
}

/// A [`ChainGateway`] that talks to a JSON HTTP service with bearer-token auth.
///
/// * `POST {base}/new_address` with `{"label": ...}` returns `{"address": ...}`
/// * `GET {base}/address/{address}` returns an [`AddressActivity`], or 404 if the address has seen nothing.
#[derive(Debug, Clone)]
pub struct HttpChainGateway {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
}

#[derive(Deserialize)]
struct NewAddressResponse {
    address: String,
}

impl HttpChainGateway {
    pub fn new<S: Into<String>>(
        base_url: S,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentProviderError> {
        let client = build_http_client(timeout).map_err(|e| PaymentProviderError::Gateway(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, api_key })
    }
}

#[async_trait]
impl ChainGateway for HttpChainGateway {
    async fn new_address(&self, label: &str) -> Result<String, PaymentProviderError> {
        let url = format!("{}/new_address", self.base_url);
        let request = self.client.post(url).bearer_auth(self.api_key.reveal()).json(&json!({ "label": label }));
        let response = send_json::<NewAddressResponse>(request).await.map_err(|e| match e {
            HttpCallError::Timeout => PaymentProviderError::Timeout,
            e => PaymentProviderError::AddressGeneration(e.to_string()),
        })?;
        if response.address.trim().is_empty() {
            return Err(PaymentProviderError::AddressGeneration("The gateway returned an empty address".into()));
        }
        debug!("💰️ New receiving address {} for {label}", response.address);
        Ok(response.address)
    }

    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, PaymentProviderError> {
        let url = format!("{}/address/{address}", self.base_url);
        let request = self.client.get(url).bearer_auth(self.api_key.reveal());
        match send_json::<AddressActivity>(request).await {
            Ok(activity) => Ok(Some(activity)),
            Err(HttpCallError::QueryError { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

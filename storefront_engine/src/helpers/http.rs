use std::time::Duration;

use log::*;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HttpCallError {
    #[error("Could not initialise the HTTP client: {0}")]
    Initialization(String),
    #[error("The remote service did not respond in time")]
    Timeout,
    #[error("Error sending request: {0}")]
    Transport(String),
    #[error("Remote service returned status {status}: {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not deserialize the response: {0}")]
    Json(String),
}

impl From<reqwest::Error> for HttpCallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// A client whose every request gives up after `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<Client, HttpCallError> {
    Client::builder().timeout(timeout).build().map_err(|e| HttpCallError::Initialization(e.to_string()))
}

/// Returns `value` if it can be placed in a URL path as-is: 1 to 255 ASCII letters, digits, `_` or `-`.
pub fn path_segment(value: &str) -> Option<&str> {
    let valid = !value.is_empty()
        && value.len() <= 255
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    valid.then_some(value)
}

/// Sends the request and deserializes a successful JSON response. Non-success statuses carry the response text.
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, HttpCallError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        trace!("Remote call successful. {status}");
        let body = response.text().await?;
        serde_json::from_str::<T>(&body).map_err(|e| HttpCallError::Json(e.to_string()))
    } else {
        let message = response.text().await.unwrap_or_default();
        debug!("Remote call failed with status {status}: {message}");
        Err(HttpCallError::QueryError { status: status.as_u16(), message })
    }
}

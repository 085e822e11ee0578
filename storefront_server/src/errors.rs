use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::{error, warn};
use serde_json::json;
use storefront_engine::StorefrontError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Could not read query parameters: {0}")]
    InvalidQuery(String),
    #[error("{0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Could not issue access token. {0}")]
    CouldNotSerializeAccessToken(String),
    #[error("{}", public_message(.error, .context))]
    EngineError { error: StorefrontError, context: &'static str },
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// Wraps an engine error. `context` completes the sentence "Server error while ..." and is only shown when the
    /// error is an internal one.
    pub fn engine(error: StorefrontError, context: &'static str) -> Self {
        Self::EngineError { error, context }
    }
}

impl From<StorefrontError> for ServerError {
    fn from(error: StorefrontError) -> Self {
        Self::engine(error, "processing the request")
    }
}

/// Attaches a "while doing X" context to engine results.
pub trait ErrorContext<T> {
    fn context(self, context: &'static str) -> Result<T, ServerError>;
}

impl<T> ErrorContext<T> for Result<T, StorefrontError> {
    fn context(self, context: &'static str) -> Result<T, ServerError> {
        self.map_err(|e| ServerError::engine(e, context))
    }
}

fn engine_status(error: &StorefrontError) -> StatusCode {
    use StorefrontError::*;
    match error {
        ValidationError(_) |
        CartNotFound |
        ProductUnavailable(_) |
        InsufficientStock(_) |
        ShippingUnavailable(_) |
        InvalidState(_) |
        RefundExceedsLimit { .. } |
        ReturnWindowExpired { .. } |
        DuplicateReturn(_) |
        DuplicatePayment(_) |
        UnsupportedPaymentMethod(_) |
        PaymentDeclined(_) => StatusCode::BAD_REQUEST,
        InvalidSignature => StatusCode::UNAUTHORIZED,
        OrderNotFound(_) | ReturnRequestNotFound(_) | ProductNotFound(_) => StatusCode::NOT_FOUND,
        ConcurrentModification => StatusCode::CONFLICT,
        ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
        RateFetchError(_) | AddressGenerationError(_) | ProviderError(_) => StatusCode::BAD_GATEWAY,
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Business-rule failures are shown to the caller verbatim. Anything that went wrong on our side, or with a provider,
/// gets a generic message.
fn public_message(error: &StorefrontError, context: &str) -> String {
    if engine_status(error).is_server_error() {
        format!("Server error while {context}")
    } else {
        error.to_string()
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            },
            Self::EngineError { error, .. } => engine_status(error),
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CouldNotSerializeAccessToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if let Self::EngineError { error, context } = self {
            if status.is_server_error() {
                error!("💻️ Server error while {context}. {error}");
            } else {
                warn!("💻️ Request rejected while {context}. {error}");
            }
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(json!({ "success": false, "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid access token. {0}")]
    InvalidToken(String),
    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

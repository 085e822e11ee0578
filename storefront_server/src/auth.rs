//! Access tokens.
//!
//! Tokens are HS256 JWTs signed with the server's shared secret. The `sub` claim is the customer id, and `roles` lists
//! what the bearer may do. The token is read from the `Authorization: Bearer ...` header, or from the
//! `sf_access_token` header.
use std::{
    fmt::Display,
    future::{ready, Ready},
};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpMessage, HttpRequest};
use chrono::Duration;
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    AlgorithmExt,
    Claims,
    Header,
    TimeOptions,
    UntrustedToken,
};
use log::*;
use serde::{Deserialize, Serialize};
use storefront_engine::db_types::CustomerIdentity;

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

pub const ACCESS_TOKEN_HEADER: &str = "sf_access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Customer => f.write_str("customer"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The customer id
    pub sub: String,
    pub email: String,
    pub roles: Vec<Role>,
}

impl JwtClaims {
    pub fn new<S: Into<String>, E: Into<String>>(sub: S, email: E, roles: Vec<Role>) -> Self {
        Self { sub: sub.into(), email: email.into(), roles }
    }

    pub fn has_roles(&self, required: &[Role]) -> bool {
        required.iter().all(|role| self.roles.contains(role))
    }

    pub fn customer(&self) -> CustomerIdentity {
        CustomerIdentity::new(self.sub.clone(), self.email.clone())
    }
}

/// Handlers can take `JwtClaims` as an argument on any route guarded by the ACL middleware, which puts the validated
/// claims into the request extensions.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or_else(|| {
            warn!("💻️ No access token claims were found for {}. Is the route missing its ACL?", req.path());
            ServerError::AuthenticationError(AuthError::MissingToken)
        }))
    }
}

/// Pulls the raw token out of the request headers.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    bearer
        .or_else(|| headers.get(ACCESS_TOKEN_HEADER).and_then(|v| v.to_str().ok()).map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
}

/// Checks access token signatures and expiry.
#[derive(Clone)]
pub struct TokenValidator {
    key: Hs256Key,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: Hs256Key::new(config.jwt_secret.reveal().as_bytes()) }
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let untrusted = UntrustedToken::new(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let token = Hs256
            .validator::<JwtClaims>(&self.key)
            .validate(&untrusted)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let claims = token.claims();
        // Tokens without an expiry are not accepted
        claims.validate_expiration(&TimeOptions::default()).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        trace!("🔐️ Access token validated for {}", claims.custom.sub);
        Ok(claims.custom.clone())
    }
}

/// Signs access tokens. The storefront's identity provider issues tokens in production; this is used by tooling and
/// tests that need a token for a given customer.
pub struct TokenIssuer {
    key: Hs256Key,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: Hs256Key::new(config.jwt_secret.reveal().as_bytes()), lifetime: config.token_lifetime }
    }

    /// Issue a new access token for the given claims. This method DOES NOT check that the bearer is entitled to the
    /// claims. That must be done before calling `issue_token`.
    pub fn issue_token(&self, claims: JwtClaims, duration: Option<Duration>) -> Result<String, AuthError> {
        let header = Header::empty().with_token_type("JWT");
        let claims = Claims::new(claims)
            .set_duration_and_issuance(&TimeOptions::default(), duration.unwrap_or(self.lifetime));
        Hs256.token(&header, &claims, &self.key).map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

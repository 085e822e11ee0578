//! HMAC-SHA256 webhook signatures.
//!
//! Providers sign the raw request body with a shared secret and send the hex-encoded digest, optionally prefixed with
//! `sha256=`.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks `signature` against the HMAC-SHA256 of `payload`.
///
/// A missing secret, or a signature that is not valid hex, returns `false`. The digest comparison is constant-time.
pub fn verify_hmac_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        warn!("🔐️ No webhook secret has been configured. Rejecting signature.");
        return false;
    }
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        debug!("🔐️ Webhook signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

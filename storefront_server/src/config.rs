use std::{env, io::Write, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use rand::{thread_rng, RngCore};
use shop_common::{
    helpers::{env_or_default, optional_env, parse_boolean_flag},
    Secret,
};
use storefront_engine::{
    payments::{CryptoSettings, DEFAULT_PAYMENT_EXPIRY_HOURS},
    sfe_api::{DEFAULT_RATE_API_URL, DEFAULT_RETURN_WINDOW_DAYS},
};
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_SF_HOST: &str = "127.0.0.1";
const DEFAULT_SF_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/storefront.db";
const DEFAULT_TAX_RATE_BPS: u32 = 0;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PAYMENT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;
const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// Tax charged on the discounted subtotal, in basis points.
    pub tax_rate_bps: u32,
    pub return_window_days: i64,
    /// How often the payment watcher re-polls pending crypto payments and expires overdue ones.
    pub payment_poll_interval: StdDuration,
    /// If set, order events are POSTed to this URL as JSON.
    pub notification_url: Option<String>,
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SF_HOST.to_string(),
            port: DEFAULT_SF_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            auth: AuthConfig::default(),
            payments: PaymentsConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            return_window_days: DEFAULT_RETURN_WINDOW_DAYS,
            payment_poll_interval: StdDuration::from_secs(DEFAULT_PAYMENT_POLL_INTERVAL_SECS),
            notification_url: None,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = optional_env("SF_HOST").unwrap_or_else(|| DEFAULT_SF_HOST.into());
        let port = env_or_default("SF_PORT", DEFAULT_SF_PORT);
        let database_url = optional_env("SF_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ SF_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let payments = PaymentsConfig::from_env_or_defaults();
        let use_x_forwarded_for = parse_boolean_flag(env::var("SF_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SF_USE_FORWARDED").ok(), false);
        let tax_rate_bps = env_or_default("SF_TAX_RATE_BPS", DEFAULT_TAX_RATE_BPS);
        let return_window_days = match env_or_default("SF_RETURN_WINDOW_DAYS", DEFAULT_RETURN_WINDOW_DAYS) {
            days if days > 0 => days,
            days => {
                warn!("🪛️ SF_RETURN_WINDOW_DAYS must be positive, not {days}. Using {DEFAULT_RETURN_WINDOW_DAYS}.");
                DEFAULT_RETURN_WINDOW_DAYS
            },
        };
        let poll_secs = match env_or_default("SF_PAYMENT_POLL_INTERVAL", DEFAULT_PAYMENT_POLL_INTERVAL_SECS) {
            0 => {
                warn!("🪛️ SF_PAYMENT_POLL_INTERVAL cannot be zero. Using {DEFAULT_PAYMENT_POLL_INTERVAL_SECS}s.");
                DEFAULT_PAYMENT_POLL_INTERVAL_SECS
            },
            secs => secs,
        };
        let notification_url = optional_env("SF_NOTIFICATION_URL");
        match &notification_url {
            Some(url) => info!("🪛️ Order events will be sent to {url}"),
            None => info!("🪛️ SF_NOTIFICATION_URL is not set. Order events will only be logged."),
        }
        let event_buffer_size = env_or_default("SF_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE).max(1);
        Self {
            host,
            port,
            database_url,
            auth,
            payments,
            use_x_forwarded_for,
            use_forwarded,
            tax_rate_bps,
            return_window_days,
            payment_poll_interval: StdDuration::from_secs(poll_secs),
            notification_url,
            event_buffer_size,
        }
    }
}

//-------------------------------------------------  PaymentsConfig  ---------------------------------------------------
/// Endpoints and credentials for the payment providers and the exchange rate service.
#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub card_api_url: String,
    pub card_secret_key: Secret<String>,
    pub paypal_api_url: String,
    pub paypal_client_id: String,
    pub paypal_client_secret: Secret<String>,
    pub bitcoin: CryptoGatewayConfig,
    pub monero: CryptoGatewayConfig,
    pub rate_api_url: String,
    /// Applied to every outbound call to a provider or the rate service.
    pub http_timeout: StdDuration,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            card_api_url: storefront_engine::payments::DEFAULT_CARD_API_URL.to_string(),
            card_secret_key: Secret::default(),
            paypal_api_url: storefront_engine::payments::DEFAULT_PAYPAL_API_URL.to_string(),
            paypal_client_id: String::default(),
            paypal_client_secret: Secret::default(),
            bitcoin: CryptoGatewayConfig::new(CryptoSettings::bitcoin()),
            monero: CryptoGatewayConfig::new(CryptoSettings::monero()),
            rate_api_url: DEFAULT_RATE_API_URL.to_string(),
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Settings for one chain gateway (the wallet service that hands out receiving addresses and reports payments).
#[derive(Clone, Debug)]
pub struct CryptoGatewayConfig {
    pub gateway_url: String,
    pub api_key: Secret<String>,
    pub settings: CryptoSettings,
}

impl CryptoGatewayConfig {
    fn new(settings: CryptoSettings) -> Self {
        Self { gateway_url: String::default(), api_key: Secret::default(), settings }
    }

    /// Reads `SF_{prefix}_GATEWAY_URL`, `SF_{prefix}_GATEWAY_API_KEY`, `SF_{prefix}_WEBHOOK_SECRET` and
    /// `SF_{prefix}_CONFIRMATIONS`.
    fn from_env(prefix: &str, defaults: CryptoSettings, payment_expiry: Duration) -> Self {
        let url_var = format!("SF_{prefix}_GATEWAY_URL");
        let gateway_url = optional_env(&url_var).unwrap_or_else(|| {
            warn!("🪛️ {url_var} is not set. {prefix} payments are disabled until it is configured.");
            String::default()
        });
        let api_key = Secret::new(optional_env(&format!("SF_{prefix}_GATEWAY_API_KEY")).unwrap_or_default());
        let secret_var = format!("SF_{prefix}_WEBHOOK_SECRET");
        let webhook_secret = optional_env(&secret_var).unwrap_or_else(|| {
            error!("🪛️ {secret_var} is not set. Every {prefix} payment notification will be rejected.");
            String::default()
        });
        let mut settings = defaults.with_webhook_secret(webhook_secret);
        settings.required_confirmations =
            env_or_default(&format!("SF_{prefix}_CONFIRMATIONS"), settings.required_confirmations).max(1);
        settings.payment_expiry = payment_expiry;
        Self { gateway_url, api_key, settings }
    }
}

impl PaymentsConfig {
    pub fn from_env_or_defaults() -> Self {
        let defaults = Self::default();
        let card_api_url = optional_env("SF_CARD_API_URL").unwrap_or(defaults.card_api_url);
        let card_secret_key = optional_env("SF_CARD_SECRET_KEY").unwrap_or_else(|| {
            error!("🪛️ SF_CARD_SECRET_KEY is not set. Card payments cannot be verified.");
            String::default()
        });
        let paypal_api_url = optional_env("SF_PAYPAL_API_URL").unwrap_or(defaults.paypal_api_url);
        let paypal_client_id = optional_env("SF_PAYPAL_CLIENT_ID").unwrap_or_else(|| {
            error!("🪛️ SF_PAYPAL_CLIENT_ID is not set. PayPal payments cannot be verified.");
            String::default()
        });
        let paypal_client_secret = optional_env("SF_PAYPAL_CLIENT_SECRET").unwrap_or_default();
        let expiry_hours = match env_or_default("SF_PAYMENT_EXPIRY_HOURS", DEFAULT_PAYMENT_EXPIRY_HOURS) {
            hours if hours > 0 => hours,
            hours => {
                warn!("🪛️ SF_PAYMENT_EXPIRY_HOURS must be positive, not {hours}. Using {DEFAULT_PAYMENT_EXPIRY_HOURS}.");
                DEFAULT_PAYMENT_EXPIRY_HOURS
            },
        };
        let payment_expiry = Duration::hours(expiry_hours);
        let bitcoin = CryptoGatewayConfig::from_env("BTC", CryptoSettings::bitcoin(), payment_expiry);
        let monero = CryptoGatewayConfig::from_env("XMR", CryptoSettings::monero(), payment_expiry);
        let rate_api_url = optional_env("SF_RATE_API_URL").unwrap_or(defaults.rate_api_url);
        let timeout_secs = match env_or_default("SF_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS) {
            0 => DEFAULT_HTTP_TIMEOUT_SECS,
            secs => secs,
        };
        Self {
            card_api_url,
            card_secret_key: Secret::new(card_secret_key),
            paypal_api_url,
            paypal_client_id,
            paypal_client_secret: Secret::new(paypal_client_secret),
            bitcoin,
            monero,
            rate_api_url,
            http_timeout: StdDuration::from_secs(timeout_secs),
        }
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The shared secret used to sign and verify access tokens (HS256).
    pub jwt_secret: Secret<String>,
    /// How long tokens issued by this server remain valid.
    pub token_lifetime: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate in \
             production like this, since every token will be invalidated when the server restarts. 🚨️🚨️🚨️"
        );
        let mut bytes = [0u8; MIN_JWT_SECRET_LENGTH];
        thread_rng().fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);
        match &mut tmpfile {
            Some((f, p)) => match writeln!(f, "{secret}") {
                Ok(()) => warn!(
                    "🚨️🚨️🚨️ The JWT secret for this session was written to {}. If this is a production instance, you \
                     are doing it wrong! Set the SF_JWT_SECRET environment variable instead. 🚨️🚨️🚨️",
                    p.to_str().unwrap_or("???")
                ),
                Err(e) => warn!("🪛️ Could not write the JWT secret to the temporary file. {e}"),
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the JWT secret.");
            },
        }
        Self { jwt_secret: Secret::new(secret), token_lifetime: Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()), token_lifetime: Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret = env::var("SF_JWT_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [SF_JWT_SECRET]")))?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ServerError::ConfigurationError(format!(
                "SF_JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} characters long"
            )));
        }
        let lifetime = env_or_default("SF_TOKEN_LIFETIME_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS).max(1);
        Ok(Self { jwt_secret: Secret::new(secret), token_lifetime: Duration::hours(lifetime) })
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

//! Process configuration loaded from environment variables.

pub mod chains;

pub use chains::{ChainConfig, Network, Token};

use anyhow::{Context, Result};
use std::env;

/// Default Tron REST endpoint; override with `RPC_TRON`.
const DEFAULT_TRON_BASE_URL: &str = "https://api.trongrid.io";

/// Environment-derived configuration, loaded once at startup and injected
/// into every component that needs it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path.
    pub database_url: String,
    /// Key material for the address envelope (scrypt) and the sender HMAC.
    pub session_secret: String,
    /// Enables the EVM chain adapter when present.
    pub alchemy_api_key: Option<String>,
    /// Optional, raises TronGrid rate limits.
    pub trongrid_api_key: Option<String>,
    /// Process-level receiver addresses; tenant rows may override.
    pub payment_address_evm: Option<String>,
    pub payment_address_tron: Option<String>,
    /// Webhook target seeded onto the default tenant.
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    /// Tron REST base URL.
    pub tron_base_url: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `DATABASE_URL` and `SESSION_SECRET` are required; everything else is
    /// optional and degrades the matching capability when absent.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;
        let session_secret =
            env::var("SESSION_SECRET").context("SESSION_SECRET must be set in environment")?;

        if session_secret.len() < 32 {
            tracing::warn!(
                "SESSION_SECRET is shorter than 32 bytes; use a high-entropy secret in production"
            );
        }

        let config = Self {
            database_url,
            session_secret,
            alchemy_api_key: non_empty(env::var("ALCHEMY_API_KEY").ok()),
            trongrid_api_key: non_empty(env::var("TRONGRID_API_KEY").ok()),
            payment_address_evm: non_empty(env::var("PAYMENT_ADDRESS_EVM").ok()),
            payment_address_tron: non_empty(env::var("PAYMENT_ADDRESS_TRON").ok()),
            webhook_url: non_empty(env::var("WEBHOOK_URL").ok())
                .and_then(|u| validate_webhook_url(&u)),
            webhook_secret: non_empty(env::var("WEBHOOK_SECRET").ok()),
            tron_base_url: non_empty(env::var("RPC_TRON").ok())
                .unwrap_or_else(|| DEFAULT_TRON_BASE_URL.to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        };

        if config.alchemy_api_key.is_none() {
            tracing::warn!(
                "ALCHEMY_API_KEY not set - EVM monitoring unavailable; \
                 payments on arbitrum/ethereum will be created but never confirm"
            );
        }

        Ok(config)
    }

    /// Process-level receiver address for a network, if configured.
    pub fn default_receiver(&self, network: Network) -> Option<&str> {
        match network {
            Network::Arbitrum | Network::Ethereum => self.payment_address_evm.as_deref(),
            Network::Tron => self.payment_address_tron.as_deref(),
        }
    }

    /// Whether the EVM adapter can run at all.
    pub fn evm_enabled(&self) -> bool {
        self.alchemy_api_key.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A misconfigured webhook target is dropped (with a warning) rather than
/// producing a delivery log full of guaranteed failures.
fn validate_webhook_url(raw: &str) -> Option<String> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {
            Some(raw.to_string())
        }
        Ok(parsed) => {
            tracing::warn!(url = raw, scheme = parsed.scheme(), "WEBHOOK_URL ignored: not http(s)");
            None
        }
        Err(e) => {
            tracing::warn!(url = raw, error = %e, "WEBHOOK_URL ignored: unparseable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_filters_blank_values() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("x".to_string())), Some("x".to_string()));
    }

    #[test]
    fn webhook_url_must_be_http() {
        assert!(validate_webhook_url("https://example.com/hooks").is_some());
        assert!(validate_webhook_url("http://127.0.0.1:8080/hooks").is_some());
        assert!(validate_webhook_url("ftp://example.com/hooks").is_none());
        assert!(validate_webhook_url("not a url").is_none());
    }
}

//! Configuration module for the storefront backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::pricing::ShippingPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy product index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HMAC secret for session tokens
    pub jwt_secret: String,
    /// Whether the secret was generated because none was configured
    pub jwt_secret_generated: bool,
    /// Session token lifetime in hours
    pub token_ttl_hours: i64,
    /// Optional service key granting admin access via `x-api-key`
    pub api_key: Option<String>,
    /// Flat shipping fee in cents
    pub shipping_flat_cents: i64,
    /// Discounted subtotal at or above which shipping is free
    pub free_shipping_over_cents: Option<i64>,
}

/// A configuration value that could not be parsed.
#[derive(Debug)]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("STORE_DB_PATH")
            .unwrap_or_else(|_| "./data/store.sqlite".to_string())
            .into();

        let index_path = env::var("STORE_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("STORE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError {
                var: "STORE_BIND_ADDR",
                message: e.to_string(),
            })?;

        let log_level = env::var("STORE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let (jwt_secret, jwt_secret_generated) = match env::var("STORE_JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => (secret, false),
            _ => (
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple()),
                true,
            ),
        };

        let token_ttl_hours = parse_i64("STORE_TOKEN_TTL_HOURS")?.unwrap_or(168);
        if token_ttl_hours <= 0 {
            return Err(ConfigError {
                var: "STORE_TOKEN_TTL_HOURS",
                message: "must be positive".to_string(),
            });
        }

        let api_key = env::var("STORE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let shipping_flat_cents = parse_i64("STORE_SHIPPING_FLAT_CENTS")?.unwrap_or(0);
        let free_shipping_over_cents = parse_i64("STORE_FREE_SHIPPING_OVER_CENTS")?;

        Ok(Self {
            db_path,
            index_path,
            bind_addr,
            log_level,
            jwt_secret,
            jwt_secret_generated,
            token_ttl_hours,
            api_key,
            shipping_flat_cents,
            free_shipping_over_cents,
        })
    }
}

impl Config {
    /// Shipping rules applied to quotes and orders.
    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy {
            flat_cents: self.shipping_flat_cents,
            free_over_cents: self.free_shipping_over_cents,
        }
    }
}

fn parse_i64(var: &'static str) -> Result<Option<i64>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e| ConfigError {
            var,
            message: format!("{}", e),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so env mutation does not race with itself.
    #[test]
    fn test_config_from_env() {
        for var in [
            "STORE_DB_PATH",
            "STORE_INDEX_PATH",
            "STORE_BIND_ADDR",
            "STORE_LOG_LEVEL",
            "STORE_JWT_SECRET",
            "STORE_TOKEN_TTL_HOURS",
            "STORE_API_KEY",
            "STORE_SHIPPING_FLAT_CENTS",
            "STORE_FREE_SHIPPING_OVER_CENTS",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/store.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(config.jwt_secret_generated);
        assert_eq!(config.jwt_secret.len(), 64);
        assert_eq!(config.token_ttl_hours, 168);
        assert!(config.api_key.is_none());
        assert_eq!(config.shipping_flat_cents, 0);
        assert!(config.free_shipping_over_cents.is_none());

        env::set_var("STORE_SHIPPING_FLAT_CENTS", "500");
        env::set_var("STORE_FREE_SHIPPING_OVER_CENTS", "10000");
        env::set_var("STORE_JWT_SECRET", "configured-secret");
        let config = Config::from_env().unwrap();
        assert_eq!(config.shipping_flat_cents, 500);
        assert_eq!(config.free_shipping_over_cents, Some(10000));
        assert_eq!(config.jwt_secret, "configured-secret");
        assert!(!config.jwt_secret_generated);

        env::set_var("STORE_SHIPPING_FLAT_CENTS", "five");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.var, "STORE_SHIPPING_FLAT_CENTS");

        env::set_var("STORE_SHIPPING_FLAT_CENTS", "500");
        env::set_var("STORE_BIND_ADDR", "not-an-address");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.var, "STORE_BIND_ADDR");

        for var in [
            "STORE_BIND_ADDR",
            "STORE_JWT_SECRET",
            "STORE_SHIPPING_FLAT_CENTS",
            "STORE_FREE_SHIPPING_OVER_CENTS",
        ] {
            env::remove_var(var);
        }
    }
}

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::domain::order::ShippingPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Postgres { database_url: String, pool_size: u32 },
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub guest_cart_dir: PathBuf,
    pub outbox_poll_interval: Duration,
    pub change_feed_capacity: usize,
    pub shipping: ShippingPolicy,
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env`
    /// if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => Backend::Postgres {
                database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                pool_size: parse_or(&lookup, "DATABASE_POOL_SIZE", 10)?,
            },
            "memory" => Backend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            backend,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            guest_cart_dir: lookup("GUEST_CART_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./guest-carts")),
            outbox_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "OUTBOX_POLL_INTERVAL_MS",
                500,
            )?),
            change_feed_capacity: parse_or(&lookup, "CHANGE_FEED_CAPACITY", 256)?,
            shipping: ShippingPolicy {
                free_above: parse_or(&lookup, "FREE_SHIPPING_THRESHOLD", BigDecimal::from(999))?,
                flat_cost: parse_or(&lookup, "FLAT_SHIPPING_COST", BigDecimal::from(50))?,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

//! Process configuration, read from the environment (and `.env` when present).

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Knobs of the order pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSettings {
    /// Upper bound for a whole `create_order` call, transaction included.
    pub timeout: Duration,
    /// Reject shipping addresses that do not belong to the ordering user.
    pub verify_address_ownership: bool,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(5_000), verify_address_ownership: true }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    pub orders: OrderSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;
        let defaults = OrderSettings::default();
        Ok(Self {
            database_url,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or(&get, "PORT", 8000)?,
            nats_url: get("NATS_URL").filter(|v| !v.trim().is_empty()),
            orders: OrderSettings {
                timeout: Duration::from_millis(parse_or(&get, "ORDER_TIMEOUT_MS", defaults.timeout.as_millis() as u64)?),
                verify_address_ownership: parse_or(&get, "ORDER_VERIFY_ADDRESS", defaults.verify_address_ownership)?,
            },
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value {raw:?}")),
        None => Ok(default),
    }
}

//! Configuration loading and representation.
//!
//! Everything comes from the environment. `from_lookup` takes the variable
//! source as a function so tests never touch the process environment.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::outcome::DEFAULT_OUTCOME_CAPACITY;
use crate::store_service::DEFAULT_PUBLISH_RETRIES;

pub const ENV_BIND_ADDR: &str = "PHONESTORE_BIND_ADDR";
pub const ENV_BUS: &str = "PHONESTORE_BUS";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_CONSUMER_GROUP: &str = "PHONESTORE_CONSUMER_GROUP";
pub const ENV_CONSUMER_NAME: &str = "PHONESTORE_CONSUMER_NAME";
pub const ENV_OUTCOME_CAPACITY: &str = "PHONESTORE_OUTCOME_CAPACITY";
pub const ENV_PUBLISH_RETRIES: &str = "PHONESTORE_PUBLISH_RETRIES";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_CONSUMER_GROUP: &str = "inventory-service";
pub const DEFAULT_CONSUMER_NAME: &str = "inventory-consumer-1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which channel transport the service runs on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusBackend {
    /// In-process channels; single instance only.
    Memory,
    /// Redis Streams (requires the `redis` feature).
    Redis,
}

impl FromStr for BusBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BusBackend::Memory),
            "redis" => Ok(BusBackend::Redis),
            other => Err(format!("expected `memory` or `redis`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub bus: BusBackend,
    pub redis_url: String,
    pub consumer_group: String,
    /// This instance's name within the group; keep it stable across restarts
    /// so pending entries are replayed.
    pub consumer_name: String,
    pub outcome_capacity: usize,
    pub publish_retries: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset or blank
    /// variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr: parse_or(&get, ENV_BIND_ADDR, DEFAULT_BIND_ADDR)?,
            bus: parse_or(&get, ENV_BUS, "memory")?,
            redis_url: get(ENV_REDIS_URL).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            consumer_group: get(ENV_CONSUMER_GROUP)
                .map(|g| g.trim().to_string())
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            consumer_name: get(ENV_CONSUMER_NAME)
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| DEFAULT_CONSUMER_NAME.to_string()),
            outcome_capacity: parse_or(&get, ENV_OUTCOME_CAPACITY, &DEFAULT_OUTCOME_CAPACITY.to_string())?,
            publish_retries: parse_or(&get, ENV_PUBLISH_RETRIES, &DEFAULT_PUBLISH_RETRIES.to_string())?,
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            bus: BusBackend::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            outcome_capacity: DEFAULT_OUTCOME_CAPACITY,
            publish_retries: DEFAULT_PUBLISH_RETRIES,
        }
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = get(var).unwrap_or_else(|| default.to_string());
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

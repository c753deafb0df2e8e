use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use poolnode_disk::StreamOptions;
use poolnode_model::{NodeMeta, Price};
use poolnode_rpc::PoolConfig;

use crate::locks::DEFAULT_LOCK_TTL;

const DEFAULT_TPS: u32 = 10;

/// Everything the node runtime needs besides its runners.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub meta: NodeMeta,
    pub pool: PoolConfig,
    /// Interval of the tick loop.
    pub tick_interval: Duration,
    /// Price advertised for runners that do not declare one.
    pub default_price: Price,
    pub cache_dir: PathBuf,
    /// Server-side long-poll wait requested with every poll.
    pub poll_wait_ms: u32,
    /// Period of the announcement loop and retry delay after a failed announcement.
    pub announce_interval: Duration,
    /// Pause after a failed poll cycle.
    pub error_backoff: Duration,
    pub lock_ttl: Duration,
    /// How often new registrations are picked up.
    pub scan_interval: Duration,
    pub stream: StreamOptions,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            meta: NodeMeta::default(),
            pool: PoolConfig::default(),
            tick_interval: tick_interval(DEFAULT_TPS),
            default_price: Price::new(0, "bitcoin", "lightning"),
            cache_dir: PathBuf::from("cache"),
            poll_wait_ms: 60_000,
            announce_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            lock_ttl: DEFAULT_LOCK_TTL,
            scan_interval: Duration::from_secs(1),
            stream: StreamOptions::default(),
        }
    }
}

fn tick_interval(tps: u32) -> Duration {
    Duration::from_millis(u64::from((1000 / tps.max(1)).max(1)))
}

impl NodeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the node, pool, price and cache variables through `lookup`.
    /// Malformed numbers keep their default and are reported with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self {
            pool: PoolConfig::from_lookup(&lookup),
            ..Self::default()
        };
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = set("NODE_NAME") {
            cfg.meta.name = name;
        }
        if let Some(icon) = set("NODE_ICON") {
            cfg.meta.icon = icon;
        }
        if let Some(description) = set("NODE_DESCRIPTION") {
            cfg.meta.description = description;
        }
        if let Some(version) = set("NODE_VERSION") {
            cfg.meta.version = version;
        }
        if let Some(raw) = set("NODE_TPS") {
            match raw.trim().parse::<u32>() {
                Ok(tps) if tps > 0 => cfg.tick_interval = tick_interval(tps),
                _ => warn!(value = %raw, "invalid NODE_TPS, using {DEFAULT_TPS}"),
            }
        }
        if let Some(raw) = set("NODE_PRICE") {
            match raw.trim().parse::<u64>() {
                Ok(amount) => cfg.default_price.amount = amount,
                Err(_) => warn!(value = %raw, "invalid NODE_PRICE, using 0"),
            }
        }
        if let Some(currency) = set("NODE_CURRENCY") {
            cfg.default_price.currency = currency;
        }
        if let Some(protocol) = set("NODE_PAYMENT_PROTOCOL") {
            cfg.default_price.protocol = protocol;
        }
        if let Some(dir) = set("CACHE_PATH") {
            cfg.cache_dir = PathBuf::from(dir);
        }
        cfg
    }

    /// Prices sent with a poll for a runner declaring `price`. Empty when the node cannot be paid.
    pub fn prices_for(&self, price: Option<&Price>) -> Vec<Price> {
        if !self.pool.is_payable() {
            return Vec::new();
        }
        vec![price.cloned().unwrap_or_else(|| self.default_price.clone())]
    }
}

//! Dispatch configuration.
//!
//! Loaded from a TOML file or from `DISPATCH_*` environment variables.
//! Every field has a default, so an empty file is valid.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::runtime::Handle;
use typed_builder::TypedBuilder;

use crate::delivery::IsolatingExecutor;
use crate::key::OrderingKey;
use crate::pool::{BoundedPool, TokioBlockingPool, WorkerPool};
use crate::singleflight::SingleFlight;

pub const DEFAULT_SLOW_HANDLER_WARN_MS: u64 = 500;
pub const DEFAULT_SINGLEFLIGHT_WAIT_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TypedBuilder)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Cap on concurrently running workers. Unset means unbounded.
    #[serde(default)]
    #[builder(default)]
    pub max_in_flight_workers: Option<usize>,

    #[serde(default = "default_slow_handler_warn_ms")]
    #[builder(default = DEFAULT_SLOW_HANDLER_WARN_MS)]
    pub slow_handler_warn_ms: u64,

    #[serde(default = "default_singleflight_wait_ms")]
    #[builder(default = DEFAULT_SINGLEFLIGHT_WAIT_MS)]
    pub singleflight_wait_ms: u64,
}

fn default_slow_handler_warn_ms() -> u64 {
    DEFAULT_SLOW_HANDLER_WARN_MS
}

fn default_singleflight_wait_ms() -> u64 {
    DEFAULT_SINGLEFLIGHT_WAIT_MS
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DispatchConfig {
    /// Load from `DISPATCH_MAX_WORKERS`, `DISPATCH_SLOW_HANDLER_WARN_MS`
    /// and `DISPATCH_SINGLEFLIGHT_WAIT_MS`. Unset variables keep defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_in_flight_workers: parse_var(&lookup, "DISPATCH_MAX_WORKERS")?,
            slow_handler_warn_ms: parse_var(&lookup, "DISPATCH_SLOW_HANDLER_WARN_MS")?
                .unwrap_or(defaults.slow_handler_warn_ms),
            singleflight_wait_ms: parse_var(&lookup, "DISPATCH_SINGLEFLIGHT_WAIT_MS")?
                .unwrap_or(defaults.singleflight_wait_ms),
        })
    }

    pub fn slow_handler_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_handler_warn_ms)
    }

    pub fn singleflight_wait(&self) -> Duration {
        Duration::from_millis(self.singleflight_wait_ms)
    }

    /// Blocking pool on `handle`, capped if `max_in_flight_workers` is set.
    pub fn build_pool(&self, handle: Handle) -> Arc<dyn WorkerPool> {
        let pool = TokioBlockingPool::new(handle);
        match self.max_in_flight_workers {
            Some(max) => Arc::new(BoundedPool::new(pool, max)),
            None => Arc::new(pool),
        }
    }

    pub fn build_executor(&self) -> IsolatingExecutor {
        IsolatingExecutor::new(self.slow_handler_threshold())
    }

    pub fn build_singleflight<K, V>(&self) -> SingleFlight<K, V>
    where
        K: OrderingKey,
        V: Clone + Send + Sync,
    {
        SingleFlight::new(self.singleflight_wait())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{name} must be a number, got {raw:?}"))
        })
        .transpose()
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<DispatchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: DispatchConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

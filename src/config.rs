use anyhow::Result;
use dotenvy::dotenv;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::store::{
    StoreConfig, DEFAULT_BULK_WORKERS, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL,
    DEFAULT_SWEEP_INTERVAL,
};

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub store: StoreConfig,
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            export_dir: PathBuf::from("./exports"),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` uses the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_capacity = parse_or(&lookup, "STORE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let cache_ttl_secs = parse_or(&lookup, "STORE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())?;
        let bulk_workers = parse_or(&lookup, "STORE_BULK_WORKERS", DEFAULT_BULK_WORKERS)?;
        let sweep_secs = parse_or(
            &lookup,
            "STORE_CACHE_SWEEP_SECS",
            DEFAULT_SWEEP_INTERVAL.as_secs(),
        )?;

        require_positive("STORE_CACHE_CAPACITY", cache_capacity as u64)?;
        require_positive("STORE_CACHE_TTL_SECS", cache_ttl_secs)?;
        require_positive("STORE_BULK_WORKERS", bulk_workers as u64)?;
        require_positive("STORE_CACHE_SWEEP_SECS", sweep_secs)?;

        Ok(Config {
            store: StoreConfig {
                cache_capacity,
                cache_ttl: Duration::from_secs(cache_ttl_secs),
                bulk_workers,
                sweep_interval: Duration::from_secs(sweep_secs),
            },
            export_dir: lookup("STORE_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./exports")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid ({:?}): {}", key, raw, e)),
        None => Ok(default),
    }
}

fn require_positive(key: &str, value: u64) -> Result<()> {
    if value == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(())
}

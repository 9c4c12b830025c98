//! Dispatch configuration
//!
//! Launch geometry, the 32/64-bit index threshold, and the shape of the
//! simulated device. Values come from [`DispatchConfig::default`], the
//! `STRATA_*` environment variables, or JSON.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::SyncPolicy;
use crate::error::{Error, Result};

pub const ENV_BLOCK_SIZE: &str = "STRATA_BLOCK_SIZE";
pub const ENV_ITEMS_PER_THREAD: &str = "STRATA_ITEMS_PER_THREAD";
pub const ENV_NARROW_INDEX_LIMIT: &str = "STRATA_NARROW_INDEX_LIMIT";
pub const ENV_WORKER_THREADS: &str = "STRATA_WORKER_THREADS";
pub const ENV_DEVICE_MEMORY_BYTES: &str = "STRATA_DEVICE_MEMORY_BYTES";
pub const ENV_SYNC_POLICY: &str = "STRATA_SYNC_POLICY";

/// Default lanes per block
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Default elements per lane in the batched kernel
pub const DEFAULT_ITEMS_PER_THREAD: u32 = 4;

/// Default simulated device capacity (256 MiB)
pub const DEFAULT_DEVICE_MEMORY_BYTES: usize = 256 * 1024 * 1024;

/// Dispatch tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Lanes per block for device launches
    pub block_size: u32,
    /// Elements each lane handles in the batched kernel
    pub items_per_thread: u32,
    /// Largest count launched with 32-bit indices
    pub narrow_index_limit: u64,
    /// Worker threads backing each device; 0 uses rayon's default
    pub worker_threads: usize,
    /// Capacity of each simulated device
    pub device_memory_bytes: usize,
    /// Synchronization policy for new device contexts
    pub default_sync: SyncPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            items_per_thread: DEFAULT_ITEMS_PER_THREAD,
            narrow_index_limit: u32::MAX as u64,
            worker_threads: 0,
            device_memory_bytes: DEFAULT_DEVICE_MEMORY_BYTES,
            default_sync: SyncPolicy::Blocking,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by any `STRATA_*` variable that is set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env(ENV_BLOCK_SIZE)? {
            config.block_size = v;
        }
        if let Some(v) = read_env(ENV_ITEMS_PER_THREAD)? {
            config.items_per_thread = v;
        }
        if let Some(v) = read_env(ENV_NARROW_INDEX_LIMIT)? {
            config.narrow_index_limit = v;
        }
        if let Some(v) = read_env(ENV_WORKER_THREADS)? {
            config.worker_threads = v;
        }
        if let Some(v) = read_env(ENV_DEVICE_MEMORY_BYTES)? {
            config.device_memory_bytes = v;
        }
        if let Some(v) = read_env(ENV_SYNC_POLICY)? {
            config.default_sync = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject geometry that cannot be launched.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_config("block_size must be non-zero"));
        }
        if self.items_per_thread == 0 {
            return Err(Error::invalid_config("items_per_thread must be non-zero"));
        }
        if self.narrow_index_limit > u32::MAX as u64 {
            return Err(Error::invalid_config(format!(
                "narrow_index_limit {} exceeds the 32-bit index range",
                self.narrow_index_limit
            )));
        }
        Ok(())
    }

    /// Elements covered by one block of the batched kernel
    pub fn tile_size(&self) -> usize {
        self.block_size as usize * self.items_per_thread as usize
    }
}

fn read_env<T: FromStr>(key: &'static str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::invalid_config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

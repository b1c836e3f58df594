//! Configuration and watchlist loading
//!
//! `ObserverConfig` is read from a JSON file whose keys mirror the option
//! names callers already use (`confirmationsRequired`, `erc20.cacheSize`, ...).
//! Every option is optional and falls back to its default.
//!
//! The watchlist file holds one Ethereum address per line.

use crate::address::parse_address;
use crate::block_feed::DEFAULT_BLOCKS_CACHE_SIZE;
use crate::retry::RetryPolicy;
use crate::tracker::DEFAULT_CONFIRMATIONS_REQUIRED;
use crate::transfer_feed::DEFAULT_TRANSFER_CACHE_SIZE;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Observer settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserverConfig {
    /// Threshold for native transactions
    pub confirmations_required: u64,
    pub erc20: Erc20Config,
    /// Block feed catch-up window
    pub blocks_cache_size: usize,
    /// How often the block feed polls the head
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
}

/// Token transfer settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Erc20Config {
    pub confirmations_required: u64,
    /// Transfer dedup cache capacity
    pub cache_size: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            erc20: Erc20Config::default(),
            blocks_cache_size: DEFAULT_BLOCKS_CACHE_SIZE,
            poll_interval_ms: 12_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for Erc20Config {
    fn default() -> Self {
        Self {
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            cache_size: DEFAULT_TRANSFER_CACHE_SIZE,
        }
    }
}

impl ObserverConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ObserverConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config.normalized())
    }

    /// Zero thresholds and capacities count as unset and take their default.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.confirmations_required == 0 {
            self.confirmations_required = defaults.confirmations_required;
        }
        if self.erc20.confirmations_required == 0 {
            self.erc20.confirmations_required = defaults.erc20.confirmations_required;
        }
        if self.erc20.cache_size == 0 {
            self.erc20.cache_size = defaults.erc20.cache_size;
        }
        if self.blocks_cache_size == 0 {
            self.blocks_cache_size = defaults.blocks_cache_size;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load a watchlist from a file.
///
/// Each line should contain one Ethereum address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored.
///
/// # Example file format:
/// ```text
/// 0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb
/// 0xdAC17F958D2ee523a2206206994597C13D831ec7
/// # This is a comment
/// ```
pub fn load_watchlist(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read watchlist file: {:?}", path))?;

    let mut addresses = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = parse_address(line)
            .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))?;

        addresses.push(addr);
    }

    if addresses.is_empty() {
        anyhow::bail!("Watchlist is empty (no valid addresses found)");
    }

    Ok(addresses)
}

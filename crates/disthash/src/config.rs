//! Table configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file
//! (or none at all) is valid.
//!
//! ```toml
//! rank_count = 4
//! local_capacity = 1024
//! max_load_factor = 0.7
//! kmer_len = 19
//! peers = ["10.0.0.1:7400", "10.0.0.2:7400", "10.0.0.3:7400", "10.0.0.4:7400"]
//!
//! [rpc]
//! connect_timeout_ms = 5000
//! retry_attempts = 3
//! ```

use crate::kmer::MAX_KMER_LEN;
use crate::types::{RankId, TableError, TableResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Configuration shared by every rank of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_rank_count")]
    pub rank_count: u32,
    /// Slots per rank, fixed for the table's lifetime.
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,
    /// Fill ratio used by [`TableConfig::sized_for`].
    #[serde(default = "default_max_load_factor")]
    pub max_load_factor: f64,
    #[serde(default = "default_kmer_len")]
    pub kmer_len: usize,
    /// `peers[i]` is the RPC address of rank `i`.
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Client-side RPC settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

// Default value functions
fn default_rank_count() -> u32 { 4 }
fn default_local_capacity() -> usize { 1024 }
fn default_max_load_factor() -> f64 { 0.7 }
fn default_kmer_len() -> usize { 19 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 500 }
fn default_max_in_flight() -> usize { 100 }

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            rank_count: default_rank_count(),
            local_capacity: default_local_capacity(),
            max_load_factor: default_max_load_factor(),
            kmer_len: default_kmer_len(),
            peers: Vec::new(),
            rpc: RpcConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Slots per rank needed to hold `expected_keys` keys at `max_load_factor`.
pub fn local_capacity_for(expected_keys: u64, rank_count: u32, max_load_factor: f64) -> usize {
    let per_rank = expected_keys as f64 / f64::from(rank_count.max(1));
    ((per_rank / max_load_factor).ceil() as usize).max(1)
}

impl TableConfig {
    /// Load a config from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TableError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TableError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> TableResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| TableError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TableError::Config(format!("failed to write {}: {}", path.display(), e))
        })
    }

    /// A default config whose `local_capacity` fits `expected_keys` at
    /// `max_load_factor`.
    pub fn sized_for(
        expected_keys: u64,
        rank_count: u32,
        max_load_factor: f64,
    ) -> TableResult<Self> {
        let config = Self {
            rank_count,
            local_capacity: local_capacity_for(expected_keys, rank_count, max_load_factor),
            max_load_factor,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the table relies on.
    pub fn validate(&self) -> TableResult<()> {
        if self.rank_count == 0 {
            return Err(TableError::InvalidConfig(
                "rank_count must be greater than 0".to_string(),
            ));
        }
        if self.local_capacity == 0 {
            return Err(TableError::InvalidConfig(
                "local_capacity must be greater than 0".to_string(),
            ));
        }
        if !(self.max_load_factor > 0.0 && self.max_load_factor <= 1.0) {
            return Err(TableError::InvalidConfig(format!(
                "max_load_factor must be in (0, 1], got {}",
                self.max_load_factor
            )));
        }
        if self.kmer_len == 0 || self.kmer_len > MAX_KMER_LEN {
            return Err(TableError::InvalidConfig(format!(
                "kmer_len must be in 1..={}, got {}",
                MAX_KMER_LEN, self.kmer_len
            )));
        }
        if !self.peers.is_empty() && self.peers.len() != self.rank_count as usize {
            return Err(TableError::InvalidConfig(format!(
                "{} peers configured for {} ranks",
                self.peers.len(),
                self.rank_count
            )));
        }
        Ok(())
    }

    /// Total slots across all ranks.
    pub fn logical_capacity(&self) -> u64 {
        self.local_capacity as u64 * u64::from(self.rank_count)
    }

    /// RPC address of `rank`.
    pub fn peer_addr(&self, rank: RankId) -> TableResult<SocketAddr> {
        let peer = self.peers.get(rank.index()).ok_or_else(|| {
            TableError::Config(format!("no peer address configured for {}", rank))
        })?;
        peer.parse()
            .map_err(|e| TableError::Config(format!("bad address {:?} for {}: {}", peer, rank, e)))
    }
}

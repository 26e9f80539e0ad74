//! Hasher configuration
//!
//! # Example
//!
//! ```
//! use virtual_hasher::HasherConfig;
//!
//! let config = HasherConfig::default();
//! assert_eq!(config.chunk_size, 256);
//!
//! let config = HasherConfig {
//!     hash_threads: Some(4),
//!     ..Default::default()
//! };
//! assert_eq!(config.thread_count(), 4);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var overriding [`HasherConfig::hash_threads`]
pub const ENV_HASH_THREADS: &str = "VHASH_HASH_THREADS";
/// Env var overriding [`HasherConfig::chunk_size`]
pub const ENV_CHUNK_SIZE: &str = "VHASH_CHUNK_SIZE";

/// Tuning for [`crate::VirtualHasher`]. None of it affects the resulting
/// hashes, only how the work is spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasherConfig {
    /// Exact number of hashing threads. Wins over `percent_hash_threads`.
    #[serde(default)]
    pub hash_threads: Option<usize>,

    /// Share of the available cores to hash with, in percent (default: 50)
    #[serde(default = "default_percent_hash_threads")]
    pub percent_hash_threads: f64,

    /// Dirty leaves handed to one worker task (default: 256)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks allowed to be queued or running at once (default: 4 per thread).
    /// Bounds how far the leaf stream is read ahead of the workers.
    #[serde(default)]
    pub max_in_flight_chunks: Option<usize>,
}

fn default_percent_hash_threads() -> f64 {
    50.0
}

fn default_chunk_size() -> usize {
    256
}

impl Default for HasherConfig {
    fn default() -> Self {
        HasherConfig {
            hash_threads: None,
            percent_hash_threads: default_percent_hash_threads(),
            chunk_size: default_chunk_size(),
            max_in_flight_chunks: None,
        }
    }
}

impl HasherConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: HasherConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/vhash/config.json`, if a config dir exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vhash").join("config.json"))
    }

    /// Load `path` if given, else the default file if present, else
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.with_env_overrides()
    }

    /// Apply `VHASH_HASH_THREADS` and `VHASH_CHUNK_SIZE` when set
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(threads) = env_usize(ENV_HASH_THREADS)? {
            self.hash_threads = Some(threads);
        }
        if let Some(chunk) = env_usize(ENV_CHUNK_SIZE)? {
            self.chunk_size = chunk;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash_threads == Some(0) {
            return Err(Error::Config("hash_threads must be at least 1".into()));
        }
        if !(self.percent_hash_threads > 0.0 && self.percent_hash_threads <= 100.0) {
            return Err(Error::Config(format!(
                "percent_hash_threads must be in (0, 100], got {}",
                self.percent_hash_threads
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.max_in_flight_chunks == Some(0) {
            return Err(Error::Config(
                "max_in_flight_chunks must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Worker threads to start
    pub fn thread_count(&self) -> usize {
        if let Some(threads) = self.hash_threads {
            return threads.max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ((cores as f64 * self.percent_hash_threads / 100.0) as usize).max(1)
    }

    pub fn in_flight_chunks(&self) -> usize {
        self.max_in_flight_chunks
            .unwrap_or_else(|| self.thread_count() * 4)
            .max(1)
    }
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} is not a number: {raw}"))),
        Err(_) => Ok(None),
    }
}

/*!
 * Configuration structures and defaults for blocksync
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SyncError};

/// One kilobyte
pub const KB: u64 = 1024;
/// One megabyte
pub const MB: u64 = 1024 * 1024;

/// Default block size for index generation (4 KiB)
pub const DEFAULT_BLOCK_SIZE: u32 = 4 * KB as u32;

/// Files below this size are matched with a single partition
pub const SINGLE_PARTITION_THRESHOLD: u64 = MB;

/// Strong hash algorithm for block confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 (fast, secure, default)
    Blake3,

    /// SHA-256
    Sha256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Blake3
    }
}

impl HashAlgorithm {
    /// Digest size in bytes
    pub fn digest_size(self) -> usize {
        match self {
            Self::Blake3 => 32,
            Self::Sha256 => 32,
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(SyncError::Usage(format!(
                "Unknown hash algorithm: {}. Valid options: blake3, sha256",
                s
            ))),
        }
    }
}

/// Configuration for index generation (`build`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Block size in bytes
    pub block_size: u32,

    /// Strong hash algorithm
    pub hash_algorithm: HashAlgorithm,

    /// Hash blocks in parallel with rayon
    pub parallel_hashing: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            hash_algorithm: HashAlgorithm::default(),
            parallel_hashing: true,
        }
    }
}

impl BuildConfig {
    /// Set the block size
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Set the strong hash algorithm
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(SyncError::Usage("block size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Configuration for local matching (`diff` and the match phase of `patch`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Number of matcher partitions (0 = one per CPU)
    pub matchers: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { matchers: 0 }
    }
}

impl MatchConfig {
    pub fn with_matchers(mut self, matchers: usize) -> Self {
        self.matchers = matchers;
        self
    }
}

/// Configuration for the multi-source patcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Per-request timeout for repository fetches
    pub request_timeout: Duration,

    /// Retry budget per missing span before giving up with NoSource
    pub retry_budget: u32,

    /// Base delay for exponential backoff between retried attempts
    pub backoff_base: Duration,

    /// Split missing spans longer than this many blocks into sub-spans
    pub max_range_blocks: u32,

    /// Outstanding requests allowed per repository
    pub per_repo_inflight: usize,

    /// Capacity of the bounded output pipe in bytes
    pub pipe_capacity: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_budget: 3,
            backoff_base: Duration::from_millis(200),
            max_range_blocks: 16,
            per_repo_inflight: 1,
            pipe_capacity: MB as usize,
        }
    }
}

impl PatchConfig {
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_range_blocks(mut self, blocks: u32) -> Self {
        self.max_range_blocks = blocks;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_range_blocks == 0 {
            return Err(SyncError::Usage(
                "max range must be at least one block".to_string(),
            ));
        }
        if self.per_repo_inflight == 0 {
            return Err(SyncError::Usage(
                "per-repository inflight limit must be at least 1".to_string(),
            ));
        }
        if self.pipe_capacity == 0 {
            return Err(SyncError::Usage(
                "pipe capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

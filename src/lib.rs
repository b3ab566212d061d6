/*!
 * blocksync - delta file synchronization library
 *
 * Reconstructs a reference file known only by a compact block-checksum
 * index, reusing local data where possible and streaming the rest from
 * remote block repositories:
 * - Two-level weak/strong checksum index with a Merkle-anchored container
 * - Parallel sliding-window matcher for local files
 * - Multi-source patcher with verification, retries, and ordered emission
 * - Bounded pipe with progress reporting
 */

pub mod cli_progress;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{BuildConfig, HashAlgorithm, MatchConfig, PatchConfig, DEFAULT_BLOCK_SIZE};
pub use crate::core::checksum::{merkle_root, strong_hash_block, ChecksumGenerator, RollingHash};
pub use crate::core::index::BlockIndex;
pub use crate::core::matcher::{match_local_file, MatchOutcome};
pub use crate::core::patcher::repository::{repository_for_source, BlockRepository, Requester};
pub use crate::core::patcher::{CancelToken, MultiSourcePatcher};
pub use crate::core::pipe::{pipe_with_report, ProgressReport};
pub use crate::core::{BlockDescriptor, MatchSpan, MatchStats, MissingSpan, PatchStats};
pub use error::{Result, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

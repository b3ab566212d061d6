/*!
 * Core block-synchronization engine
 */

pub mod checksum;
pub mod format;
pub mod index;
pub mod matcher;
pub mod merger;
pub mod patcher;
pub mod pipe;

use std::fmt;

/// Checksums of one reference block, positioned by its sequential index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Sequential position of the block in the reference file
    pub block_index: u32,

    /// Weak rolling hash of the block
    pub weak_hash: u32,

    /// Strong hash of the block (zero-padded to the block size)
    pub strong_hash: Vec<u8>,
}

impl BlockDescriptor {
    pub fn new(block_index: u32, weak_hash: u32, strong_hash: Vec<u8>) -> Self {
        Self {
            block_index,
            weak_hash,
            strong_hash,
        }
    }
}

/// A single reference block located in the local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMatch {
    /// Index of the reference block
    pub block_index: u32,

    /// Byte offset in the local file where the block's data begins
    pub local_offset: u64,
}

/// A maximal run of contiguous reference blocks found at a contiguous
/// byte run in the local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    /// First block of the run (inclusive)
    pub start_block: u32,

    /// Last block of the run (inclusive)
    pub end_block: u32,

    /// Byte offset in the local file where data for `start_block` begins
    pub local_offset: u64,
}

impl MatchSpan {
    /// Number of blocks covered by the span
    pub fn block_len(&self) -> u32 {
        self.end_block - self.start_block + 1
    }

    pub fn contains(&self, block: u32) -> bool {
        self.start_block <= block && block <= self.end_block
    }
}

/// A maximal run of contiguous reference blocks not found locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingSpan {
    /// First block of the run (inclusive)
    pub start_block: u32,

    /// Last block of the run (inclusive)
    pub end_block: u32,
}

impl MissingSpan {
    pub fn new(start_block: u32, end_block: u32) -> Self {
        Self {
            start_block,
            end_block,
        }
    }

    /// Number of blocks covered by the span
    pub fn block_len(&self) -> u32 {
        self.end_block - self.start_block + 1
    }
}

/// Statistics for a match pass over a local file
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchStats {
    /// Windows probed against the index
    pub comparisons: u64,

    /// Weak-hash candidates considered
    pub weak_hash_hits: u64,

    /// Candidates confirmed by the strong hash
    pub strong_hash_hits: u64,
}

impl MatchStats {
    /// Fraction of probed windows that produced a weak candidate
    pub fn weak_hit_rate(&self) -> f64 {
        if self.comparisons == 0 {
            return 0.0;
        }
        self.weak_hash_hits as f64 / self.comparisons as f64
    }

    /// Fraction of weak candidates rejected by the strong hash
    pub fn weak_error_rate(&self) -> f64 {
        if self.weak_hash_hits == 0 {
            return 0.0;
        }
        (self.weak_hash_hits - self.strong_hash_hits) as f64 / self.weak_hash_hits as f64
    }
}

/// Statistics for a completed patch
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchStats {
    /// Bytes written to the sink
    pub bytes_written: u64,

    /// Bytes copied from the local file
    pub bytes_local: u64,

    /// Bytes fetched from repositories (verified payload only)
    pub bytes_fetched: u64,

    /// Blocks reused from the local file
    pub blocks_matched: u32,

    /// Blocks fetched from repositories
    pub blocks_fetched: u32,

    /// Range requests issued, including retried attempts
    pub requests: u64,
}

impl fmt::Display for PatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Patched {} bytes ({} local / {} fetched over {} requests)",
            self.bytes_written, self.bytes_local, self.bytes_fetched, self.requests
        )
    }
}

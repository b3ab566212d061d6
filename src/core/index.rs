/*!
 * In-memory block checksum index
 *
 * Maps weak hashes to the reference blocks sharing them and keeps the
 * sequential descriptor list for strong-hash lookup and Merkle-root
 * validation. Built once at load and shared read-only by the matcher,
 * verifier, and patcher.
 */

use std::collections::HashMap;
use std::io::Read;

use crate::config::HashAlgorithm;
use crate::core::checksum::merkle_root;
use crate::core::format;
use crate::core::BlockDescriptor;
use crate::error::{Result, SyncError};

static NO_CANDIDATES: [u32; 0] = [];

/// Read-only two-level checksum index for one reference file
#[derive(Debug, Clone)]
pub struct BlockIndex {
    /// Weak hash → indices of blocks sharing it
    by_weak: HashMap<u32, Vec<u32>>,

    /// Descriptors in ascending block order
    sequential: Vec<BlockDescriptor>,

    block_size: u32,
    file_size: u64,
    hash_algorithm: HashAlgorithm,
    root_hash: Vec<u8>,
}

impl BlockIndex {
    /// Build an index from a descriptor sequence
    pub fn new(
        sequential: Vec<BlockDescriptor>,
        block_size: u32,
        file_size: u64,
        hash_algorithm: HashAlgorithm,
        root_hash: Vec<u8>,
    ) -> Self {
        let mut by_weak: HashMap<u32, Vec<u32>> = HashMap::with_capacity(sequential.len());
        for descriptor in &sequential {
            by_weak
                .entry(descriptor.weak_hash)
                .or_default()
                .push(descriptor.block_index);
        }

        Self {
            by_weak,
            sequential,
            block_size,
            file_size,
            hash_algorithm,
            root_hash,
        }
    }

    /// Load and validate an index container
    ///
    /// The caller supplies the strong hash algorithm the index was built
    /// with; the digest size is implicit in the container. Rejects a wrong
    /// magic or major version, truncated descriptors, a root hash whose
    /// length does not match the configured digest, and a recomputed
    /// Merkle root that differs from the header.
    pub fn load<R: Read>(reader: &mut R, hash_algorithm: HashAlgorithm) -> Result<Self> {
        let header = format::read_header(reader)?;
        let strong_size = hash_algorithm.digest_size();

        if header.root_hash.len() != strong_size {
            return Err(SyncError::Format(format!(
                "root hash length {} does not match the {}-byte digest",
                header.root_hash.len(),
                strong_size
            )));
        }

        let expected_blocks = header.file_size.div_ceil(header.block_size as u64);
        if expected_blocks != header.block_count as u64 {
            return Err(SyncError::Format(format!(
                "block count {} inconsistent with file size {} at block size {}",
                header.block_count, header.file_size, header.block_size
            )));
        }

        let descriptors = format::read_descriptors(reader, header.block_count, strong_size)?;

        let strong_hashes: Vec<Vec<u8>> = descriptors
            .iter()
            .map(|d| d.strong_hash.clone())
            .collect();
        let computed_root = merkle_root(&strong_hashes, hash_algorithm);
        if computed_root != header.root_hash {
            return Err(SyncError::Format(
                "integrity checksum mismatch".to_string(),
            ));
        }

        Ok(Self::new(
            descriptors,
            header.block_size,
            header.file_size,
            hash_algorithm,
            header.root_hash,
        ))
    }

    /// Blocks whose weak hash equals `weak`
    pub fn lookup_weak(&self, weak: u32) -> &[u32] {
        self.by_weak
            .get(&weak)
            .map(Vec::as_slice)
            .unwrap_or(&NO_CANDIDATES)
    }

    /// Strong hash of a block by sequential index
    pub fn strong_hash_of(&self, block_index: u32) -> &[u8] {
        &self.sequential[block_index as usize].strong_hash
    }

    pub fn block_count(&self) -> u32 {
        self.sequential.len() as u32
    }

    /// Number of distinct weak hashes in the index
    pub fn weak_count(&self) -> usize {
        self.by_weak.len()
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn root_hash(&self) -> &[u8] {
        &self.root_hash
    }

    /// Bytes of the reference actually covered by a block; every block is
    /// `block_size` long except a short final block
    pub fn block_byte_len(&self, block_index: u32) -> u32 {
        let start = block_index as u64 * self.block_size as u64;
        let end = (start + self.block_size as u64).min(self.file_size);
        (end - start) as u32
    }
}

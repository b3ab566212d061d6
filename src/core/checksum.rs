/*!
 * Checksum primitives for block synchronization
 *
 * Implements the 32-bit rsync-style rolling hash (weak, fast), the strong
 * block hashes (BLAKE3 or SHA-256), and the file checksum generator that
 * binds both to a block size and anchors the sequence with a Merkle root.
 */

use std::io::Read;

use rayon::prelude::*;

use crate::config::HashAlgorithm;
use crate::core::BlockDescriptor;
use crate::error::{Result, SyncError};

/// Rolling checksum over a fixed window
///
/// The 32-bit value packs two 16-bit sums: `a = Σ bᵢ` and
/// `b = Σ (B−i)·bᵢ`, both modulo 2¹⁶. Sliding the window forward by one
/// byte updates both sums in constant time.
#[derive(Debug, Clone)]
pub struct RollingHash {
    a: u16,
    b: u16,
    window_size: u32,
}

impl RollingHash {
    /// Create a rolling checksum for the given window size
    pub fn new(window_size: u32) -> Self {
        Self {
            a: 0,
            b: 0,
            window_size,
        }
    }

    /// Initialize checksum from a window of data
    pub fn from_data(data: &[u8]) -> Self {
        let mut checksum = Self::new(data.len() as u32);
        checksum.reset(data);
        checksum
    }

    /// Reset the checksum with new window contents
    pub fn reset(&mut self, data: &[u8]) {
        let len = data.len() as u32;
        let mut a: u16 = 0;
        let mut b: u16 = 0;

        for (i, &byte) in data.iter().enumerate() {
            let weight = (len - i as u32) as u16; // len − i mod 2¹⁶
            a = a.wrapping_add(byte as u16);
            b = b.wrapping_add(weight.wrapping_mul(byte as u16));
        }

        self.a = a;
        self.b = b;
        self.window_size = len;
    }

    /// Slide the window forward: remove `old_byte`, append `new_byte`
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        self.a = self
            .a
            .wrapping_sub(old_byte as u16)
            .wrapping_add(new_byte as u16);
        self.b = self
            .b
            .wrapping_sub((self.window_size as u16).wrapping_mul(old_byte as u16))
            .wrapping_add(self.a);
    }

    /// Get the current checksum value
    pub fn hash(&self) -> u32 {
        (self.a as u32) | ((self.b as u32) << 16)
    }

    /// Size of the serialized weak hash in bytes
    pub const SIZE: usize = 4;
}

/// Streaming strong hasher
pub enum StrongHasher {
    Blake3(blake3::Hasher),
    Sha256(sha2::Sha256),
}

impl StrongHasher {
    /// Create a new strong hasher for the algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        use sha2::Digest;
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(blake3::Hasher::new()),
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    /// Update the hasher with data
    pub fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        match self {
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Sha256(hasher) => {
                hasher.update(data);
            }
        }
    }

    /// Finalize and return the digest
    pub fn finalize(self) -> Vec<u8> {
        use sha2::Digest;
        match self {
            Self::Blake3(hasher) => hasher.finalize().as_bytes().to_vec(),
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }
}

/// Calculate the strong hash of a single block
pub fn strong_hash_block(data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    let mut hasher = StrongHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Merkle root over a sequence of digests
///
/// Adjacent digests are concatenated and hashed pairwise up to a single
/// root; an odd leaf is promoted to the next level unchanged. A single
/// leaf is its own root; an empty sequence hashes to the digest of the
/// empty string.
pub fn merkle_root(leaves: &[Vec<u8>], algorithm: HashAlgorithm) -> Vec<u8> {
    if leaves.is_empty() {
        return strong_hash_block(&[], algorithm);
    }

    let mut level: Vec<Vec<u8>> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if pair.len() == 2 {
                    let mut hasher = StrongHasher::new(algorithm);
                    hasher.update(&pair[0]);
                    hasher.update(&pair[1]);
                    hasher.finalize()
                } else {
                    pair[0].clone()
                }
            })
            .collect();
    }

    level.into_iter().next().unwrap_or_default()
}

/// Sequential checksums of a reference file plus its Merkle anchor
#[derive(Debug, Clone)]
pub struct GeneratedChecksums {
    /// Per-block descriptors in ascending block order
    pub descriptors: Vec<BlockDescriptor>,

    /// Merkle root over the sequential strong hashes
    pub root_hash: Vec<u8>,

    /// Bytes consumed from the reader
    pub file_size: u64,
}

/// File checksum generator bound to a block size
///
/// Produces the sequential `(weak, strong)` pair per block. The final
/// block is zero-padded to the block size before hashing, so the emitted
/// descriptor stream always describes whole blocks; the original length
/// travels separately in the container header.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumGenerator {
    block_size: u32,
    hash_algorithm: HashAlgorithm,
}

impl ChecksumGenerator {
    pub fn new(block_size: u32, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            block_size,
            hash_algorithm,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// Digest size of the configured strong hash
    pub fn strong_size(&self) -> usize {
        self.hash_algorithm.digest_size()
    }

    /// Generate sequential checksums and the Merkle root from a reader
    pub fn generate<R: Read>(&self, mut reader: R) -> Result<GeneratedChecksums> {
        let block_size = self.block_size as usize;
        let mut descriptors = Vec::new();
        let mut file_size = 0u64;
        let mut block = vec![0u8; block_size];

        loop {
            let bytes_read = read_full(&mut reader, &mut block)?;
            if bytes_read == 0 {
                break;
            }
            file_size += bytes_read as u64;

            // Zero-pad a short final block before hashing
            block[bytes_read..].fill(0);

            let index = u32::try_from(descriptors.len())
                .map_err(|_| SyncError::Usage("file exceeds the 2^32 block limit".to_string()))?;
            let weak_hash = RollingHash::from_data(&block).hash();
            let strong_hash = strong_hash_block(&block, self.hash_algorithm);
            descriptors.push(BlockDescriptor::new(index, weak_hash, strong_hash));

            if bytes_read < block_size {
                break;
            }
        }

        let strong_hashes: Vec<Vec<u8>> = descriptors
            .iter()
            .map(|d| d.strong_hash.clone())
            .collect();
        let root_hash = merkle_root(&strong_hashes, self.hash_algorithm);

        Ok(GeneratedChecksums {
            descriptors,
            root_hash,
            file_size,
        })
    }

    /// Parallel variant: reads all blocks up front and hashes them with rayon
    pub fn generate_parallel<R: Read>(&self, mut reader: R) -> Result<GeneratedChecksums> {
        let block_size = self.block_size as usize;
        let mut blocks: Vec<Vec<u8>> = Vec::new();
        let mut file_size = 0u64;

        loop {
            let mut block = vec![0u8; block_size];
            let bytes_read = read_full(&mut reader, &mut block)?;
            if bytes_read == 0 {
                break;
            }
            file_size += bytes_read as u64;
            block[bytes_read..].fill(0);
            blocks.push(block);
            if bytes_read < block_size {
                break;
            }
        }

        u32::try_from(blocks.len())
            .map_err(|_| SyncError::Usage("file exceeds the 2^32 block limit".to_string()))?;

        let algorithm = self.hash_algorithm;
        let descriptors: Vec<BlockDescriptor> = blocks
            .par_iter()
            .enumerate()
            .map(|(i, block)| {
                let weak_hash = RollingHash::from_data(block).hash();
                let strong_hash = strong_hash_block(block, algorithm);
                BlockDescriptor::new(i as u32, weak_hash, strong_hash)
            })
            .collect();

        let strong_hashes: Vec<Vec<u8>> = descriptors
            .iter()
            .map(|d| d.strong_hash.clone())
            .collect();
        let root_hash = merkle_root(&strong_hashes, algorithm);

        Ok(GeneratedChecksums {
            descriptors,
            root_hash,
            file_size,
        })
    }
}

/// Read until the buffer is full or the reader is exhausted
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random bytes for rolling equivalence checks
    fn test_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn test_rolling_hash_formula() {
        // a = 1+2+3 = 6, b = 3·1 + 2·2 + 1·3 = 10
        let hash = RollingHash::from_data(&[1, 2, 3]).hash();
        assert_eq!(hash, 6 | (10 << 16));
    }

    #[test]
    fn test_rolling_equals_fresh_at_every_position() {
        let data = test_bytes(2048, 7);
        for window in [4usize, 16, 64, 255] {
            let mut rolling = RollingHash::from_data(&data[..window]);
            for pos in 1..=(data.len() - window) {
                rolling.roll(data[pos - 1], data[pos + window - 1]);
                let fresh = RollingHash::from_data(&data[pos..pos + window]);
                assert_eq!(
                    rolling.hash(),
                    fresh.hash(),
                    "window {} at position {}",
                    window,
                    pos
                );
            }
        }
    }

    #[test]
    fn test_rolling_with_entering_zeros() {
        // Rolling zeros in must match a fresh hash of the zero-padded window
        let data = test_bytes(64, 21);
        let window = 16;
        let mut rolling = RollingHash::from_data(&data[48..64]);
        let mut padded = data[48..].to_vec();
        for i in 0..8 {
            rolling.roll(data[48 + i], 0);
            padded.remove(0);
            padded.push(0);
            assert_eq!(rolling.hash(), RollingHash::from_data(&padded).hash());
        }
        assert_eq!(padded.len(), window);
    }

    #[test]
    fn test_zero_padding_does_not_change_fresh_hash() {
        let data = b"tail";
        let mut padded = data.to_vec();
        padded.resize(16, 0);
        // Trailing zeros contribute nothing to either 16-bit sum
        assert_eq!(
            RollingHash::from_data(data).hash(),
            RollingHash::from_data(&padded).hash()
        );
    }

    #[test]
    fn test_strong_hash_sizes() {
        let data = b"test data for hashing";
        let blake = strong_hash_block(data, HashAlgorithm::Blake3);
        let sha = strong_hash_block(data, HashAlgorithm::Sha256);

        assert_eq!(blake.len(), 32);
        assert_eq!(sha.len(), 32);
        assert_ne!(blake, sha);
        assert_eq!(blake, strong_hash_block(data, HashAlgorithm::Blake3));
    }

    #[test]
    fn test_merkle_root_structure() {
        let algo = HashAlgorithm::Blake3;
        let h: Vec<Vec<u8>> = (0u8..3)
            .map(|i| strong_hash_block(&[i], algo))
            .collect();

        // Single leaf is its own root
        assert_eq!(merkle_root(&h[..1], algo), h[0]);

        // Two leaves hash pairwise
        let mut hasher = StrongHasher::new(algo);
        hasher.update(&h[0]);
        hasher.update(&h[1]);
        let pair = hasher.finalize();
        assert_eq!(merkle_root(&h[..2], algo), pair);

        // Odd leaf is promoted
        let mut hasher = StrongHasher::new(algo);
        hasher.update(&pair);
        hasher.update(&h[2]);
        assert_eq!(merkle_root(&h, algo), hasher.finalize());

        // Empty sequence anchors to the empty digest
        assert_eq!(merkle_root(&[], algo), strong_hash_block(&[], algo));
    }

    #[test]
    fn test_generate_pads_final_block() {
        let data = b"hello, world!\n"; // 14 bytes
        let generator = ChecksumGenerator::new(4, HashAlgorithm::Blake3);
        let generated = generator.generate(&data[..]).unwrap();

        assert_eq!(generated.descriptors.len(), 4);
        assert_eq!(generated.file_size, 14);

        let mut padded_tail = data[12..].to_vec();
        padded_tail.resize(4, 0);
        assert_eq!(
            generated.descriptors[3].strong_hash,
            strong_hash_block(&padded_tail, HashAlgorithm::Blake3)
        );
        assert_eq!(
            generated.descriptors[3].weak_hash,
            RollingHash::from_data(&padded_tail).hash()
        );
    }

    #[test]
    fn test_generate_deterministic() {
        let data = test_bytes(10_000, 3);
        let generator = ChecksumGenerator::new(1024, HashAlgorithm::Blake3);
        let first = generator.generate(&data[..]).unwrap();
        let second = generator.generate(&data[..]).unwrap();

        assert_eq!(first.descriptors, second.descriptors);
        assert_eq!(first.root_hash, second.root_hash);
    }

    #[test]
    fn test_generate_parallel_matches_sequential() {
        let data = test_bytes(65_000, 11);
        let generator = ChecksumGenerator::new(4096, HashAlgorithm::Blake3);
        let sequential = generator.generate(&data[..]).unwrap();
        let parallel = generator.generate_parallel(&data[..]).unwrap();

        assert_eq!(sequential.descriptors, parallel.descriptors);
        assert_eq!(sequential.root_hash, parallel.root_hash);
        assert_eq!(sequential.file_size, parallel.file_size);
    }

    #[test]
    fn test_generate_empty_input() {
        let generator = ChecksumGenerator::new(1024, HashAlgorithm::Blake3);
        let generated = generator.generate(&b""[..]).unwrap();

        assert!(generated.descriptors.is_empty());
        assert_eq!(generated.file_size, 0);
        assert_eq!(
            generated.root_hash,
            strong_hash_block(&[], HashAlgorithm::Blake3)
        );
    }
}

/*!
 * Index container: on-disk format for block checksum indexes
 *
 * # Layout (all numeric fields little-endian)
 *
 * ```text
 * Offset  Size  Field
 *    0      9   magic              = "BLOCKSYNC" (ASCII, not LE)
 *    9      2   major_version      (LE u16)
 *   11      2   minor_version      (LE u16)
 *   13      2   patch_version      (LE u16)
 *   15      8   file_size          reference length in bytes (LE i64)
 *   23      4   block_size         (LE u32)
 *   27      4   block_count        (LE u32)
 *   31      4   root_hash_len      (LE u32)
 *   35      N   root_hash          Merkle root over the strong hashes
 *   ...    ...  block_count × (4 + strong_size) bytes: tightly packed
 *               descriptors in ascending block order, each
 *               weak_hash (LE u32) ‖ strong_hash (strong_size raw bytes)
 * ```
 *
 * The strong digest size is not encoded; reader and writer must be
 * configured with the same checksum generator. A reader rejects a
 * mismatched major version and must recompute the Merkle root of the
 * descriptor stream before trusting the index.
 */

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::core::BlockDescriptor;
use crate::error::{Result, SyncError};

pub const MAGIC: &[u8] = b"BLOCKSYNC";
pub const MAJOR_VERSION: u16 = 0;
pub const MINOR_VERSION: u16 = 1;
pub const PATCH_VERSION: u16 = 4;

/// Default file extension for index containers
pub const INDEX_EXTENSION: &str = "bsync";

/// Upper bound on the declared root hash length; anything larger is
/// treated as corruption rather than allocated.
const MAX_ROOT_HASH_LEN: u32 = 1024;

/// Decoded container header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub file_size: u64,
    pub block_size: u32,
    pub block_count: u32,
    pub root_hash: Vec<u8>,
}

/// Write the container header
pub fn write_header<W: Write>(
    writer: &mut W,
    file_size: u64,
    block_size: u32,
    block_count: u32,
    root_hash: &[u8],
) -> Result<()> {
    writer.write_all(MAGIC)?;
    for version in [MAJOR_VERSION, MINOR_VERSION, PATCH_VERSION] {
        writer.write_u16::<LittleEndian>(version)?;
    }
    writer.write_i64::<LittleEndian>(file_size as i64)?;
    writer.write_u32::<LittleEndian>(block_size)?;
    writer.write_u32::<LittleEndian>(block_count)?;
    writer.write_u32::<LittleEndian>(root_hash.len() as u32)?;
    writer.write_all(root_hash)?;
    Ok(())
}

/// Write the packed descriptor sequence in ascending block order
pub fn write_descriptors<W: Write>(
    writer: &mut W,
    descriptors: &[BlockDescriptor],
) -> Result<()> {
    for descriptor in descriptors {
        writer.write_u32::<LittleEndian>(descriptor.weak_hash)?;
        writer.write_all(&descriptor.strong_hash)?;
    }
    Ok(())
}

/// Write a complete index container
pub fn write_index<W: Write>(
    writer: &mut W,
    file_size: u64,
    block_size: u32,
    root_hash: &[u8],
    descriptors: &[BlockDescriptor],
) -> Result<()> {
    write_header(
        writer,
        file_size,
        block_size,
        descriptors.len() as u32,
        root_hash,
    )?;
    write_descriptors(writer, descriptors)
}

/// Read and validate the container header
pub fn read_header<R: Read>(reader: &mut R) -> Result<IndexHeader> {
    let mut magic = vec![0u8; MAGIC.len()];
    reader
        .read_exact(&mut magic)
        .map_err(truncated("magic string"))?;
    if magic != MAGIC {
        return Err(SyncError::Format(
            "magic string mismatch, not a blocksync index".to_string(),
        ));
    }

    let major = reader
        .read_u16::<LittleEndian>()
        .map_err(truncated("version"))?;
    let minor = reader
        .read_u16::<LittleEndian>()
        .map_err(truncated("version"))?;
    let patch = reader
        .read_u16::<LittleEndian>()
        .map_err(truncated("version"))?;
    if major != MAJOR_VERSION {
        return Err(SyncError::Format(format!(
            "index version {}.{}.{} does not match tool version {}.{}.{}",
            major, minor, patch, MAJOR_VERSION, MINOR_VERSION, PATCH_VERSION
        )));
    }
    if minor != MINOR_VERSION || patch != PATCH_VERSION {
        tracing::debug!(
            "index written by {}.{}.{}, reading as {}.{}.{}",
            major,
            minor,
            patch,
            MAJOR_VERSION,
            MINOR_VERSION,
            PATCH_VERSION
        );
    }

    let file_size = reader
        .read_i64::<LittleEndian>()
        .map_err(truncated("file size"))?;
    if file_size < 0 {
        return Err(SyncError::Format(format!(
            "negative file size {}",
            file_size
        )));
    }
    let block_size = reader
        .read_u32::<LittleEndian>()
        .map_err(truncated("block size"))?;
    if block_size == 0 {
        return Err(SyncError::Format("zero block size".to_string()));
    }
    let block_count = reader
        .read_u32::<LittleEndian>()
        .map_err(truncated("block count"))?;
    let root_hash_len = reader
        .read_u32::<LittleEndian>()
        .map_err(truncated("root hash length"))?;
    if root_hash_len > MAX_ROOT_HASH_LEN {
        return Err(SyncError::Format(format!(
            "root hash length {} exceeds limit",
            root_hash_len
        )));
    }
    let mut root_hash = vec![0u8; root_hash_len as usize];
    reader
        .read_exact(&mut root_hash)
        .map_err(truncated("root hash"))?;

    Ok(IndexHeader {
        file_size: file_size as u64,
        block_size,
        block_count,
        root_hash,
    })
}

/// Read `block_count` packed descriptors with the given strong digest size
pub fn read_descriptors<R: Read>(
    reader: &mut R,
    block_count: u32,
    strong_size: usize,
) -> Result<Vec<BlockDescriptor>> {
    let mut descriptors = Vec::with_capacity(block_count as usize);
    for index in 0..block_count {
        let weak_hash = reader
            .read_u32::<LittleEndian>()
            .map_err(truncated("descriptor stream"))?;
        let mut strong_hash = vec![0u8; strong_size];
        reader
            .read_exact(&mut strong_hash)
            .map_err(truncated("descriptor stream"))?;
        descriptors.push(BlockDescriptor::new(index, weak_hash, strong_hash));
    }
    Ok(descriptors)
}

/// Map an unexpected end of input to a format error; pass real I/O errors on
fn truncated(what: &'static str) -> impl Fn(io::Error) -> SyncError {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            SyncError::Format(format!("truncated {}", what))
        } else {
            SyncError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;
    use crate::core::checksum::{strong_hash_block, ChecksumGenerator};

    fn sample_descriptors() -> Vec<BlockDescriptor> {
        let generator = ChecksumGenerator::new(4, HashAlgorithm::Blake3);
        generator
            .generate(&b"hello, world!\n"[..])
            .unwrap()
            .descriptors
    }

    #[test]
    fn test_header_round_trip() {
        let root = strong_hash_block(b"root", HashAlgorithm::Blake3);
        let mut buf = Vec::new();
        write_header(&mut buf, 14, 4, 4, &root).unwrap();

        let header = read_header(&mut buf.as_slice()).unwrap();
        assert_eq!(header.file_size, 14);
        assert_eq!(header.block_size, 4);
        assert_eq!(header.block_count, 4);
        assert_eq!(header.root_hash, root);
    }

    #[test]
    fn test_index_round_trip() {
        let descriptors = sample_descriptors();
        let root = strong_hash_block(b"anchor", HashAlgorithm::Blake3);
        let mut buf = Vec::new();
        write_index(&mut buf, 14, 4, &root, &descriptors).unwrap();

        let mut reader = buf.as_slice();
        let header = read_header(&mut reader).unwrap();
        let loaded = read_descriptors(&mut reader, header.block_count, 32).unwrap();
        assert_eq!(loaded, descriptors);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 14, 4, 4, b"r").unwrap();
        buf[0] = b'X';

        let err = read_header(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SyncError::Format(_)), "got {:?}", err);
    }

    #[test]
    fn test_major_version_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 14, 4, 4, b"r").unwrap();
        // major_version immediately follows the magic
        buf[MAGIC.len()] = MAJOR_VERSION as u8 + 1;

        let err = read_header(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 14, 4, 4, b"root").unwrap();
        buf.truncate(20);

        let err = read_header(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
    }

    #[test]
    fn test_truncated_descriptors_rejected() {
        let descriptors = sample_descriptors();
        let mut buf = Vec::new();
        write_descriptors(&mut buf, &descriptors).unwrap();
        buf.truncate(buf.len() - 5);

        let err = read_descriptors(&mut buf.as_slice(), 4, 32).unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 14, 0, 4, b"root").unwrap();

        let err = read_header(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
    }
}

/*!
 * Block repositories: byte-range sources for the reference file
 *
 * A repository couples a requester (HTTP ranged GET or positional local
 * reads) with the shared block-to-byte-range resolver and the strong-hash
 * verifier. One repository lives for the duration of one patch.
 */

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::checksum::strong_hash_block;
use crate::core::index::BlockIndex;
use crate::core::MissingSpan;
use crate::error::{Result, SyncError};

/// User agent presented to HTTP repositories
pub const USER_AGENT: &str = concat!("blocksync/", env!("CARGO_PKG_VERSION"));

/// Half-open byte range of the reference file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Byte-range fetch capability with a configured timeout
pub trait Requester: Send + Sync {
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>>;

    /// Human-readable location for logging
    fn location(&self) -> String;
}

/// Translates block spans to byte ranges, clamped to the reference length
#[derive(Debug, Clone, Copy)]
pub struct RangeResolver {
    block_size: u32,
    file_size: u64,
}

impl RangeResolver {
    pub fn new(block_size: u32, file_size: u64) -> Self {
        Self {
            block_size,
            file_size,
        }
    }

    pub fn resolve(&self, span: &MissingSpan) -> ByteRange {
        let b = self.block_size as u64;
        let start = span.start_block as u64 * b;
        let end = ((span.end_block as u64 + 1) * b).min(self.file_size);
        ByteRange { start, end }
    }
}

/// Checks fetched bytes block-by-block against the index
#[derive(Clone)]
pub struct BlockVerifier {
    index: Arc<BlockIndex>,
}

impl BlockVerifier {
    pub fn new(index: Arc<BlockIndex>) -> Self {
        Self { index }
    }

    /// Verify every block of a returned range; one mismatch invalidates
    /// the whole fetch
    pub fn verify_span(
        &self,
        repository_id: u32,
        span: &MissingSpan,
        bytes: &[u8],
    ) -> Result<()> {
        let block_size = self.index.block_size() as usize;
        let algorithm = self.index.hash_algorithm();
        let mut padded = vec![0u8; block_size];
        let mut offset = 0usize;

        for block_index in span.start_block..=span.end_block {
            let len = self.index.block_byte_len(block_index) as usize;
            if bytes.len() < offset + len {
                return Err(SyncError::Repository(format!(
                    "range response short of block {}",
                    block_index
                )));
            }
            let chunk = &bytes[offset..offset + len];

            // A short final block hashes zero-padded, like at build time
            let digest = if len == block_size {
                strong_hash_block(chunk, algorithm)
            } else {
                padded[..len].copy_from_slice(chunk);
                padded[len..].fill(0);
                strong_hash_block(&padded, algorithm)
            };

            if digest != self.index.strong_hash_of(block_index) {
                return Err(SyncError::Verify {
                    block_index,
                    repository_id,
                });
            }
            offset += len;
        }

        if offset != bytes.len() {
            return Err(SyncError::Repository(format!(
                "range response {} bytes longer than requested",
                bytes.len() - offset
            )));
        }
        Ok(())
    }
}

/// HTTP(S) repository using ranged GET requests
pub struct HttpRequester {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpRequester {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Repository(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

impl Requester for HttpRequester {
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.start, range.end - 1),
            )
            .send()
            .map_err(|e| SyncError::Repository(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| SyncError::Repository(format!("{}: {}", self.url, e)))?;

        match status {
            reqwest::StatusCode::PARTIAL_CONTENT => Ok(body.to_vec()),
            // A server ignoring the Range header returns the whole file
            reqwest::StatusCode::OK if body.len() as u64 >= range.end => {
                Ok(body[range.start as usize..range.end as usize].to_vec())
            }
            _ => Err(SyncError::Repository(format!(
                "{} returned status {}",
                self.url, status
            ))),
        }
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Local filesystem repository using positional reads
pub struct FileRequester {
    path: PathBuf,
}

impl FileRequester {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Requester for FileRequester {
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut bytes = Vec::with_capacity(range.len() as usize);
        file.take(range.len()).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != range.len() {
            return Err(SyncError::Repository(format!(
                "{} is shorter than the requested range",
                self.path.display()
            )));
        }
        Ok(bytes)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// One addressable source of reference blocks
pub struct BlockRepository {
    id: u32,
    requester: Box<dyn Requester>,
    resolver: RangeResolver,
    verifier: BlockVerifier,
}

impl BlockRepository {
    pub fn new(
        id: u32,
        requester: Box<dyn Requester>,
        resolver: RangeResolver,
        verifier: BlockVerifier,
    ) -> Self {
        Self {
            id,
            requester,
            resolver,
            verifier,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn location(&self) -> String {
        self.requester.location()
    }

    /// Fetch and verify the byte range covering a missing span
    pub fn fetch_span(&self, span: &MissingSpan) -> Result<Vec<u8>> {
        let range = self.resolver.resolve(span);
        let bytes = self.requester.fetch(range)?;
        if bytes.len() as u64 != range.len() {
            return Err(SyncError::Repository(format!(
                "{} returned {} bytes for a {}-byte range",
                self.location(),
                bytes.len(),
                range.len()
            )));
        }
        self.verifier.verify_span(self.id, span, &bytes)?;
        Ok(bytes)
    }
}

/// Build a repository for a source line: an http(s) URL, a file:// URL,
/// or a bare filesystem path
pub fn repository_for_source(
    id: u32,
    source: &str,
    index: &Arc<BlockIndex>,
    timeout: Duration,
) -> Result<BlockRepository> {
    let requester: Box<dyn Requester> = match url::Url::parse(source) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
            Box::new(HttpRequester::new(source.to_string(), timeout)?)
        }
        Ok(parsed) if parsed.scheme() == "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| SyncError::Usage(format!("invalid file URL: {}", source)))?;
            Box::new(FileRequester::new(path))
        }
        Ok(parsed) => {
            return Err(SyncError::Usage(format!(
                "unsupported repository scheme: {}",
                parsed.scheme()
            )))
        }
        Err(_) => Box::new(FileRequester::new(PathBuf::from(source))),
    };

    let resolver = RangeResolver::new(index.block_size(), index.file_size());
    let verifier = BlockVerifier::new(Arc::clone(index));
    Ok(BlockRepository::new(id, requester, resolver, verifier))
}

/*!
 * Sliding-window block matcher
 *
 * Scans a local file for blocks of the reference: every window is probed
 * against the index by weak hash, candidates are confirmed with the strong
 * hash, and confirmed blocks are emitted as raw matches. Large files are
 * partitioned across worker threads; partitions overlap by one block so a
 * block straddling a boundary is discovered by the higher partition.
 */

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{bounded, Sender};

use crate::config::{MatchConfig, MB, SINGLE_PARTITION_THRESHOLD};
use crate::core::checksum::{strong_hash_block, RollingHash};
use crate::core::index::BlockIndex;
use crate::core::merger;
use crate::core::{MatchSpan, MatchStats, MissingSpan, RawMatch};
use crate::error::{Result, SyncError};

/// Refill granularity for the window buffer
const READ_CHUNK: usize = 64 * 1024;

/// Shared instrumentation counters for one match pass
#[derive(Debug, Default)]
pub struct MatchCounters {
    comparisons: AtomicU64,
    weak_hash_hits: AtomicU64,
    strong_hash_hits: AtomicU64,
}

impl MatchCounters {
    pub fn snapshot(&self) -> MatchStats {
        MatchStats {
            comparisons: self.comparisons.load(Ordering::Relaxed),
            weak_hash_hits: self.weak_hash_hits.load(Ordering::Relaxed),
            strong_hash_hits: self.strong_hash_hits.load(Ordering::Relaxed),
        }
    }
}

/// One partition of the local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Section {
    /// First byte the partition reads
    read_start: u64,

    /// One past the last byte the partition reads
    read_end: u64,

    /// Probe zero-padded windows at the end of the file
    scan_tail: bool,
}

/// Everything the caller needs from a match pass
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: Vec<MatchSpan>,
    pub missing: Vec<MissingSpan>,
    pub stats: MatchStats,
}

/// Partition a file into worker sections
///
/// Sections are `ceil(size / workers)` bytes rounded up to a whole number
/// of blocks; every section after the first starts one block early so that
/// windows straddling the nominal boundary belong to it. Only the section
/// reaching the end of the file probes padded tail windows.
fn partition_sections(file_size: u64, block_size: u32, workers: usize) -> Vec<Section> {
    if file_size == 0 {
        return Vec::new();
    }

    let b = block_size as u64;
    let raw_len = file_size.div_ceil(workers.max(1) as u64);
    let section_len = raw_len.div_ceil(b) * b;
    let count = file_size.div_ceil(section_len);

    (0..count)
        .map(|i| {
            let nominal_start = i * section_len;
            let read_start = if i == 0 { 0 } else { nominal_start - b };
            let read_end = file_size.min(nominal_start + section_len);
            Section {
                read_start,
                read_end,
                scan_tail: read_end == file_size,
            }
        })
        .collect()
}

/// Number of matcher threads to use when the configuration says auto
fn detect_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|e| {
            tracing::warn!(
                "failed to detect available parallelism ({}), matching single-threaded",
                e
            );
            1
        })
}

/// Match a local file against a reference index
///
/// Runs one scanning thread per section, streams raw matches into the
/// merger, and returns the globally ordered match spans together with the
/// complementary missing spans and the probe counters.
pub fn match_local_file(
    path: &Path,
    index: &BlockIndex,
    config: &MatchConfig,
) -> Result<MatchOutcome> {
    let file_size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::SourceNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let counters = MatchCounters::default();

    // A local file shorter than one block never fills a window: no
    // matches, the whole range is missing.
    if index.block_count() == 0 || file_size < index.block_size() as u64 {
        return Ok(MatchOutcome {
            matched: Vec::new(),
            missing: merger::missing_spans(&[], index.block_count()),
            stats: counters.snapshot(),
        });
    }

    let workers = if file_size < SINGLE_PARTITION_THRESHOLD {
        1
    } else if config.matchers == 0 {
        detect_parallelism()
    } else {
        config.matchers
    };
    let sections = partition_sections(file_size, index.block_size(), workers);
    tracing::debug!(
        "matching {} bytes across {} partition(s)",
        file_size,
        sections.len()
    );

    let (tx, rx) = bounded::<RawMatch>(1024);
    let mut raw: Vec<RawMatch> = Vec::new();
    let mut first_err: Option<SyncError> = None;

    thread::scope(|s| {
        let mut handles = Vec::new();
        for section in &sections {
            let tx = tx.clone();
            let counters = &counters;
            handles.push(s.spawn(move || scan_section(path, *section, index, counters, tx)));
        }
        drop(tx);

        for raw_match in rx.iter() {
            raw.push(raw_match);
        }

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    if first_err.is_none() {
                        first_err = Some(SyncError::Other("matcher worker panicked".to_string()));
                    }
                }
            }
        }
    });

    if let Some(err) = first_err {
        return Err(err);
    }

    let matched = merger::merge_raw_matches(raw, index.block_size());
    let missing = merger::missing_spans(&matched, index.block_count());

    Ok(MatchOutcome {
        matched,
        missing,
        stats: counters.snapshot(),
    })
}

/// Scan one section with an independent file handle
fn scan_section(
    path: &Path,
    section: Section,
    index: &BlockIndex,
    counters: &MatchCounters,
    tx: Sender<RawMatch>,
) -> Result<()> {
    let block_size = index.block_size() as usize;
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(section.read_start))?;
    let mut reader = BufReader::with_capacity(MB as usize, file)
        .take(section.read_end - section.read_start);

    // Window buffer: holds the file bytes [buf_base, buf_base + buf.len())
    let mut buf: Vec<u8> = Vec::new();
    let mut buf_base = section.read_start;
    let mut pos = section.read_start;
    let mut rolling: Option<RollingHash> = None;
    let mut exhausted = false;
    let mut padded = vec![0u8; block_size];

    loop {
        let available = (buf_base + buf.len() as u64).saturating_sub(pos) as usize;

        if available < block_size && !exhausted {
            // Drop the consumed prefix; keep the byte before the window so
            // the rolling hash can still slide over it.
            let keep_from = if rolling.is_some() { pos - 1 } else { pos };
            let drop_len = (keep_from - buf_base) as usize;
            if drop_len > 0 {
                buf.drain(..drop_len);
                buf_base = keep_from;
            }
            let needed = (pos - buf_base) as usize + block_size;
            while buf.len() < needed && !exhausted {
                let mut chunk = [0u8; READ_CHUNK];
                match reader.read(&mut chunk) {
                    Ok(0) => exhausted = true,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
            continue;
        }

        if available >= block_size {
            let off = (pos - buf_base) as usize;
            let weak = match rolling.as_mut() {
                Some(r) => {
                    r.roll(buf[off - 1], buf[off + block_size - 1]);
                    r.hash()
                }
                None => {
                    let r = RollingHash::from_data(&buf[off..off + block_size]);
                    let hash = r.hash();
                    rolling = Some(r);
                    hash
                }
            };

            if probe(index, counters, weak, &buf[off..off + block_size], pos, &tx)? {
                // Block-aligned skip past the matched block
                pos += block_size as u64;
                rolling = None;
            } else {
                pos += 1;
            }
        } else {
            // Section drained; only the final section keeps scanning, with
            // zeros entering the window, so a local tail can match the
            // reference's zero-padded last block.
            if !section.scan_tail || available == 0 {
                break;
            }
            let off = (pos - buf_base) as usize;
            padded[..available].copy_from_slice(&buf[off..off + available]);
            padded[available..].fill(0);

            let weak = match rolling.as_mut() {
                Some(r) => {
                    r.roll(buf[off - 1], 0);
                    r.hash()
                }
                None => {
                    let r = RollingHash::from_data(&padded);
                    let hash = r.hash();
                    rolling = Some(r);
                    hash
                }
            };

            if probe(index, counters, weak, &padded, pos, &tx)? {
                pos += block_size as u64;
                rolling = None;
            } else {
                pos += 1;
            }
        }
    }

    Ok(())
}

/// Probe one window against the index; emits every confirmed candidate
/// and reports whether any confirmed
fn probe(
    index: &BlockIndex,
    counters: &MatchCounters,
    weak: u32,
    window: &[u8],
    pos: u64,
    tx: &Sender<RawMatch>,
) -> Result<bool> {
    counters.comparisons.fetch_add(1, Ordering::Relaxed);

    let candidates = index.lookup_weak(weak);
    if candidates.is_empty() {
        return Ok(false);
    }
    counters
        .weak_hash_hits
        .fetch_add(candidates.len() as u64, Ordering::Relaxed);

    let strong = strong_hash_block(window, index.hash_algorithm());
    let mut confirmed = false;
    for &block_index in candidates {
        if index.strong_hash_of(block_index) == strong.as_slice() {
            counters.strong_hash_hits.fetch_add(1, Ordering::Relaxed);
            tx.send(RawMatch {
                block_index,
                local_offset: pos,
            })
            .map_err(|_| SyncError::Other("match stream receiver dropped".to_string()))?;
            confirmed = true;
        }
    }
    Ok(confirmed)
}

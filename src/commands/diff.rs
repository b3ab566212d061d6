/*!
 * `diff` subcommand: compare a local file with a reference index and
 * report match and hash-quality statistics
 */

use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use blocksync::config::{HashAlgorithm, MatchConfig};
use blocksync::core::index::BlockIndex;
use blocksync::core::matcher::match_local_file;
use blocksync::core::MatchSpan;
use blocksync::error::Result;

pub fn run(
    local: &Path,
    index_source: &str,
    config: MatchConfig,
    hash_algorithm: HashAlgorithm,
) -> Result<()> {
    let started = Instant::now();

    let mut reader = BufReader::new(super::open_local_or_remote(index_source)?);
    let index = BlockIndex::load(&mut reader, hash_algorithm)?;
    drop(reader);

    tracing::info!("block size: {}", index.block_size());
    tracing::info!("weak hash count: {}", index.weak_count());

    let outcome = match_local_file(local, &index, &config)?;
    let stats = outcome.stats;

    let matched_blocks: u32 = outcome.matched.iter().map(MatchSpan::block_len).sum();
    let matched_bytes = matched_blocks as u64 * index.block_size() as u64;
    let missing_blocks: u32 = outcome.missing.iter().map(|s| s.block_len()).sum();
    let missing_bytes = missing_blocks as u64 * index.block_size() as u64;

    tracing::info!("comparisons: {}", stats.comparisons);
    tracing::info!("weak hash hits: {}", stats.weak_hash_hits);
    if stats.comparisons > 0 {
        tracing::info!("weak hit rate: {:.2}%", 100.0 * stats.weak_hit_rate());
    }
    tracing::info!("strong hash hits: {}", stats.strong_hash_hits);
    if stats.weak_hash_hits > 0 {
        tracing::info!("weak hash error rate: {:.2}%", 100.0 * stats.weak_error_rate());
    }

    tracing::info!("total matched bytes: {}", matched_bytes);
    tracing::info!("total matched blocks: {}", matched_blocks);
    tracing::info!("index blocks: {}", index.block_count());
    tracing::info!("approximate missing bytes: {}", missing_bytes);
    tracing::info!("time taken: {:.2?}", started.elapsed());
    Ok(())
}

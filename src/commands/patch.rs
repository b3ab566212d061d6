/*!
 * `patch` subcommand: reconstruct the reference file from an index and a
 * list of block repositories, reusing a local file where it matches
 */

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use blocksync::cli_progress::render_patch_progress;
use blocksync::config::{HashAlgorithm, MatchConfig, PatchConfig};
use blocksync::core::index::BlockIndex;
use blocksync::core::matcher::match_local_file;
use blocksync::core::patcher::repository::repository_for_source;
use blocksync::core::patcher::MultiSourcePatcher;
use blocksync::core::pipe::pipe_with_report;
use blocksync::core::{MatchSpan, PatchStats};
use blocksync::error::{Result, SyncError};

#[allow(clippy::too_many_arguments)]
pub fn run(
    index_source: &str,
    repo_list: &Path,
    output: &Path,
    local: Option<&Path>,
    match_config: MatchConfig,
    patch_config: PatchConfig,
    hash_algorithm: HashAlgorithm,
    show_progress: bool,
) -> Result<()> {
    tracing::info!("starting patching process");

    let mut reader = BufReader::new(super::open_local_or_remote(index_source)?);
    let index = Arc::new(BlockIndex::load(&mut reader, hash_algorithm)?);
    drop(reader);

    let list = std::fs::read_to_string(repo_list)?;
    let sources: Vec<&str> = list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if sources.is_empty() {
        return Err(SyncError::Usage(format!(
            "repository list {} is empty",
            repo_list.display()
        )));
    }
    let mut repositories = Vec::with_capacity(sources.len());
    for (id, source) in sources.iter().enumerate() {
        tracing::info!("{} : {}", id, source);
        repositories.push(repository_for_source(
            id as u32,
            source,
            &index,
            patch_config.request_timeout,
        )?);
    }

    // Reuse whatever the local file already holds
    let (matched, local_path): (Vec<MatchSpan>, Option<PathBuf>) = match local {
        Some(path) if path.exists() => {
            let outcome = match_local_file(path, &index, &match_config)?;
            let matched_blocks: u32 = outcome.matched.iter().map(MatchSpan::block_len).sum();
            tracing::info!(
                "{} of {} blocks available locally in {}",
                matched_blocks,
                index.block_count(),
                path.display()
            );
            (outcome.matched, Some(path.to_path_buf()))
        }
        _ => (Vec::new(), None),
    };

    tracing::info!(
        "block size {} / {} blocks / root {}",
        index.block_size(),
        index.block_count(),
        hex::encode(index.root_hash())
    );
    tracing::info!(
        "patching {} for the size of {}",
        output.display(),
        index.file_size()
    );

    let file_size = index.file_size();
    let (mut pipe_reader, pipe_writer, reports) =
        pipe_with_report(file_size, patch_config.pipe_capacity);
    let mut out_file = File::create(output)?;

    let mut patcher = MultiSourcePatcher::new(
        pipe_writer,
        Arc::clone(&index),
        repositories,
        patch_config,
    )?;
    if let Some(path) = &local_path {
        patcher = patcher.with_local_source(path, matched);
    }

    let started = Instant::now();
    let stats: PatchStats = thread::scope(|s| -> Result<PatchStats> {
        let progress =
            s.spawn(move || render_patch_progress(file_size, reports, show_progress));
        let drain = s.spawn(move || -> Result<u64> {
            let drained = std::io::copy(&mut pipe_reader, &mut out_file)?;
            out_file.sync_all()?;
            Ok(drained)
        });

        let patch_result = patcher.patch();

        let drain_result = drain
            .join()
            .map_err(|_| SyncError::Other("output drain thread panicked".to_string()))?;
        let _ = progress.join();

        let stats = patch_result?;
        drain_result?;
        Ok(stats)
    })?;
    let elapsed = started.elapsed();

    tracing::info!("{}", stats);
    tracing::info!(
        "time duration {:.2?} | data rate {:.0} bytes/s",
        elapsed,
        file_size as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    Ok(())
}

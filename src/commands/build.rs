/*!
 * `build` subcommand: generate a block checksum index for a file
 */

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use blocksync::config::{BuildConfig, MB};
use blocksync::core::checksum::ChecksumGenerator;
use blocksync::core::format;
use blocksync::error::Result;

/// Parallel hashing reads the whole file up front; keep that to inputs
/// that comfortably fit in memory
const PARALLEL_HASH_LIMIT: u64 = 256 * MB;

pub fn run(input: &Path, output: Option<PathBuf>, config: BuildConfig) -> Result<()> {
    config.validate()?;

    let out_path = output.unwrap_or_else(|| input.with_extension(format::INDEX_EXTENSION));
    let file = super::open_file(input)?;
    let file_size = file.metadata()?.len();
    let reader = BufReader::new(file);
    let generator = ChecksumGenerator::new(config.block_size, config.hash_algorithm);

    let started = Instant::now();
    let generated = if config.parallel_hashing && file_size <= PARALLEL_HASH_LIMIT {
        generator.generate_parallel(reader)?
    } else {
        generator.generate(reader)?
    };
    let elapsed = started.elapsed();

    let mut writer = BufWriter::new(File::create(&out_path)?);
    format::write_index(
        &mut writer,
        generated.file_size,
        config.block_size,
        &generated.root_hash,
        &generated.descriptors,
    )?;
    writer.flush()?;

    tracing::info!(
        "{}: block size {} / {} blocks / root {}",
        input.display(),
        config.block_size,
        generated.descriptors.len(),
        hex::encode(&generated.root_hash)
    );
    tracing::info!(
        "index for {} bytes written to {} in {:.2?} ({:.0} bytes/s)",
        generated.file_size,
        out_path.display(),
        elapsed,
        generated.file_size as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    Ok(())
}

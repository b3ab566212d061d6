/*!
 * blocksync - delta file synchronization CLI
 *
 * Builds block checksum indexes, diffs local files against them, and
 * patches (reconstructs) reference files from multiple block
 * repositories. The heavy lifting lives in the library; this binary is
 * argument parsing and wiring.
 */

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use blocksync::config::{
    BuildConfig, HashAlgorithm, MatchConfig, PatchConfig, DEFAULT_BLOCK_SIZE,
};

mod commands;

#[derive(Parser)]
#[command(
    name = "blocksync",
    version = blocksync::VERSION,
    about = "Build block indexes, diff local files, and patch from block repositories"
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Strong hash algorithm (blake3, sha256)
    #[arg(long, global = true, default_value = "blake3")]
    hash: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a .bsync index for a file
    #[command(visible_alias = "b")]
    Build {
        input: PathBuf,

        /// Block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        blocksize: u32,

        /// Index output path (default: input with .bsync extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare a local file with a reference index and print statistics
    #[command(visible_alias = "d")]
    Diff {
        local: PathBuf,

        /// Reference index: a path or an http(s) URL
        index: String,

        /// Matcher partitions to run concurrently (0 = one per CPU)
        #[arg(short = 'p', default_value_t = 0)]
        parallel: usize,
    },

    /// Recreate the reference file from an index and block repositories
    #[command(visible_alias = "p")]
    Patch {
        /// Reference index: a path or an http(s) URL
        index: String,

        /// Repository list file, one URL or path per line
        repositories: PathBuf,

        /// Output file, overwritten when done
        output: PathBuf,

        /// Local file believed to be similar; matched blocks are copied
        /// instead of fetched
        #[arg(long)]
        local: Option<PathBuf>,

        /// Matcher partitions for the local file (0 = one per CPU)
        #[arg(short = 'p', default_value_t = 0)]
        parallel: usize,

        /// Retry budget per missing span
        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the URL-safe base64 strong hash of a file
    #[command(visible_alias = "m")]
    Meta { file: PathBuf },

    /// Fold core, node, and meta checksums into one package version
    #[command(visible_alias = "pv")]
    Pkgver {
        core: String,
        node: String,
        meta: String,
    },

    /// Fill a JSON manifest template with checksums and sizes
    #[command(visible_alias = "pl")]
    Pkglist {
        core_chksum: String,
        core_size: String,
        node_chksum: String,
        node_size: String,
        meta_chksum: String,
        pkg_version: String,
        template: PathBuf,
        output: PathBuf,
    },

    /// Convert a newline-separated repository list to JSON
    #[command(visible_alias = "rp")]
    Repo {
        source_list: PathBuf,
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    blocksync::logging::init_logging(cli.verbose)?;
    let hash_algorithm: HashAlgorithm = cli.hash.parse()?;

    match cli.command {
        Commands::Build {
            input,
            blocksize,
            output,
        } => {
            let config = BuildConfig::default()
                .with_block_size(blocksize)
                .with_hash_algorithm(hash_algorithm);
            commands::build::run(&input, output, config)?;
        }
        Commands::Diff {
            local,
            index,
            parallel,
        } => {
            let config = MatchConfig::default().with_matchers(parallel);
            commands::diff::run(&local, &index, config, hash_algorithm)?;
        }
        Commands::Patch {
            index,
            repositories,
            output,
            local,
            parallel,
            retries,
            no_progress,
        } => {
            let match_config = MatchConfig::default().with_matchers(parallel);
            let patch_config = PatchConfig::default().with_retry_budget(retries);
            commands::patch::run(
                &index,
                &repositories,
                &output,
                local.as_deref(),
                match_config,
                patch_config,
                hash_algorithm,
                !no_progress,
            )?;
        }
        Commands::Meta { file } => {
            commands::manifest::meta(&file, hash_algorithm)?;
        }
        Commands::Pkgver { core, node, meta } => {
            commands::manifest::pkgver(&core, &node, &meta, hash_algorithm)?;
        }
        Commands::Pkglist {
            core_chksum,
            core_size,
            node_chksum,
            node_size,
            meta_chksum,
            pkg_version,
            template,
            output,
        } => {
            commands::manifest::pkglist(
                &core_chksum,
                &core_size,
                &node_chksum,
                &node_size,
                &meta_chksum,
                &pkg_version,
                &template,
                &output,
            )?;
        }
        Commands::Repo {
            source_list,
            output,
        } => {
            commands::manifest::repo(&source_list, &output)?;
        }
    }

    Ok(())
}

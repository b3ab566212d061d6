/*!
 * Package manifest helpers: `meta`, `pkgver`, `pkglist`, and `repo`
 *
 * Build-script utilities around the checksum primitives: strong-hash a
 * metadata file, fold package checksums into one version digest, and
 * fill JSON package manifests and repository lists.
 */

use std::fs::File;
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

use blocksync::config::HashAlgorithm;
use blocksync::core::checksum::{merkle_root, strong_hash_block};
use blocksync::error::{Result, SyncError};

/// Package manifest entry; unknown template fields are preserved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "pkg-chksum", default)]
    pub pkg_chksum: String,

    #[serde(rename = "meta-chksum", default)]
    pub meta_chksum: String,

    #[serde(rename = "core-image-chksum", default)]
    pub core_image_chksum: String,

    #[serde(rename = "core-image-size", default)]
    pub core_image_size: String,

    #[serde(rename = "node-image-chksum", default)]
    pub node_image_chksum: String,

    #[serde(rename = "node-image-size", default)]
    pub node_image_size: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Print the URL-safe base64 strong hash of a file
pub fn meta(file: &Path, hash_algorithm: HashAlgorithm) -> Result<()> {
    let data = std::fs::read(file).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(file.to_path_buf())
        } else {
            SyncError::Io(e)
        }
    })?;
    let digest = strong_hash_block(&data, hash_algorithm);
    print!("{}", URL_SAFE.encode(digest));
    std::io::stdout().flush()?;
    Ok(())
}

/// Fold three package checksums into one version digest
pub fn pkgver(core: &str, node: &str, meta: &str, hash_algorithm: HashAlgorithm) -> Result<()> {
    let leaves = vec![
        decode_checksum(core)?,
        decode_checksum(node)?,
        decode_checksum(meta)?,
    ];
    let combined = merkle_root(&leaves, hash_algorithm);
    print!("{}", URL_SAFE.encode(combined));
    std::io::stdout().flush()?;
    Ok(())
}

fn decode_checksum(value: &str) -> Result<Vec<u8>> {
    URL_SAFE
        .decode(value)
        .map_err(|e| SyncError::Usage(format!("invalid base64 checksum {}: {}", value, e)))
}

/// Fill a JSON manifest template and write a one-element package list
#[allow(clippy::too_many_arguments)]
pub fn pkglist(
    core_chksum: &str,
    core_size: &str,
    node_chksum: &str,
    node_size: &str,
    meta_chksum: &str,
    pkg_version: &str,
    template: &Path,
    output: &Path,
) -> Result<()> {
    let data = std::fs::read(template)?;
    let mut manifest: PackageManifest = serde_json::from_slice(&data)?;

    manifest.pkg_chksum = pkg_version.to_string();
    manifest.meta_chksum = meta_chksum.to_string();
    manifest.core_image_chksum = core_chksum.to_string();
    manifest.core_image_size = core_size.to_string();
    manifest.node_image_chksum = node_chksum.to_string();
    manifest.node_image_size = node_size.to_string();

    let mut file = File::create(output)?;
    serde_json::to_writer(&mut file, &[&manifest])?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Convert a newline-separated repository list to a JSON array
pub fn repo(source_list: &Path, output: &Path) -> Result<()> {
    let content = std::fs::read_to_string(source_list)?;
    let sources: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut file = File::create(output)?;
    serde_json::to_writer(&mut file, &sources)?;
    file.write_all(b"\n")?;
    Ok(())
}

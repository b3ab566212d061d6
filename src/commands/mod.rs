/*!
 * CLI subcommand implementations
 */

pub mod build;
pub mod diff;
pub mod manifest;
pub mod patch;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use blocksync::error::{Result, SyncError};

/// Open an index argument that may be a filesystem path, a file:// URL,
/// or an http(s) URL
pub fn open_local_or_remote(source: &str) -> Result<Box<dyn Read>> {
    match url::Url::parse(source) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
            let response = reqwest::blocking::get(source)
                .map_err(|e| SyncError::Repository(format!("{}: {}", source, e)))?;
            if !response.status().is_success() {
                return Err(SyncError::Repository(format!(
                    "{} returned status {}",
                    source,
                    response.status()
                )));
            }
            Ok(Box::new(response))
        }
        Ok(parsed) if parsed.scheme() == "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| SyncError::Usage(format!("invalid file URL: {}", source)))?;
            Ok(Box::new(open_file(&path)?))
        }
        _ => Ok(Box::new(open_file(Path::new(source))?)),
    }
}

/// Open a local file, mapping a missing path to a friendlier error
pub fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(path.to_path_buf())
        } else {
            e.into()
        }
    })
}

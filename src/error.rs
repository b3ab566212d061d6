/*!
 * Error types for blocksync
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// Reference file or index not found
    SourceNotFound(PathBuf),

    /// Malformed index container (bad magic, version, truncation, root hash)
    Format(String),

    /// I/O error
    Io(io::Error),

    /// Strong-hash verification failed for a fetched block
    Verify {
        block_index: u32,
        repository_id: u32,
    },

    /// Every repository exhausted its retries for a span of blocks
    NoSource { start_block: u32, end_block: u32 },

    /// The caller cancelled the operation
    Cancelled,

    /// Invalid configuration
    Usage(String),

    /// Remote repository request failed
    Repository(String),

    /// Generic error with message
    Other(String),
}

impl SyncError {
    /// Check if this error is fatal (should not retry)
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::SourceNotFound(_) => true,
            SyncError::Format(_) => true,
            SyncError::Usage(_) => true,
            SyncError::NoSource { .. } => true,
            SyncError::Cancelled => true,

            // Worth retrying, possibly on another repository
            SyncError::Io(_) => false,
            SyncError::Verify { .. } => false,
            SyncError::Repository(_) => false,
            SyncError::Other(_) => false,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Io(io_err) => Self::is_io_transient(io_err),
            SyncError::Repository(_) => true,
            SyncError::Verify { .. } => true,
            _ => false,
        }
    }

    /// Check if an I/O error is transient
    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
                | WriteZero
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SourceNotFound(path) => {
                write!(f, "Source not found: {}", path.display())
            }
            SyncError::Format(msg) => {
                write!(f, "Invalid index: {}", msg)
            }
            SyncError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            SyncError::Verify {
                block_index,
                repository_id,
            } => {
                write!(
                    f,
                    "Strong hash mismatch for block {} returned by repository {}",
                    block_index, repository_id
                )
            }
            SyncError::NoSource {
                start_block,
                end_block,
            } => {
                write!(
                    f,
                    "No repository could supply blocks {}..={}",
                    start_block, end_block
                )
            }
            SyncError::Cancelled => {
                write!(f, "Operation cancelled")
            }
            SyncError::Usage(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            SyncError::Repository(msg) => {
                write!(f, "Repository error: {}", msg)
            }
            SyncError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Other(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(SyncError::SourceNotFound(PathBuf::from("/tmp")).is_fatal());
        assert!(SyncError::Format("bad magic".to_string()).is_fatal());
        assert!(SyncError::Usage("block size zero".to_string()).is_fatal());
        assert!(SyncError::NoSource {
            start_block: 3,
            end_block: 7,
        }
        .is_fatal());
        assert!(SyncError::Cancelled.is_fatal());
    }

    #[test]
    fn test_non_fatal_errors() {
        assert!(!SyncError::Io(io::Error::other("test")).is_fatal());
        assert!(!SyncError::Verify {
            block_index: 0,
            repository_id: 1,
        }
        .is_fatal());
        assert!(!SyncError::Repository("503".to_string()).is_fatal());
    }

    #[test]
    fn test_transient_errors() {
        assert!(SyncError::Repository("timeout".to_string()).is_transient());
        assert!(SyncError::Verify {
            block_index: 0,
            repository_id: 0,
        }
        .is_transient());
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(SyncError::Io(io_err).is_transient());

        assert!(!SyncError::Format("truncated".to_string()).is_transient());
        assert!(!SyncError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Verify {
            block_index: 12,
            repository_id: 2,
        };
        assert_eq!(
            err.to_string(),
            "Strong hash mismatch for block 12 returned by repository 2"
        );

        let err = SyncError::NoSource {
            start_block: 4,
            end_block: 4,
        };
        assert_eq!(err.to_string(), "No repository could supply blocks 4..=4");
    }
}

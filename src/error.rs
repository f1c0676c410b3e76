use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while indexing or extracting from a tar archive
#[derive(Debug, Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tar header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("tar archive truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("invalid index {} at line {line}: {reason}", path.display())]
    InvalidIndex {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("duplicate file path found for path {path}: {key}")]
    DuplicateKey { path: String, key: String },

    #[error("file {key} not found in index")]
    NotFound { key: String },

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: u64, got: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Wrap an I/O error with a description of the operation that failed
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the archive itself (rather than the index or the caller) is at fault
    pub fn is_corrupt_archive(&self) -> bool {
        matches!(self, Error::InvalidHeader { .. } | Error::Truncated { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

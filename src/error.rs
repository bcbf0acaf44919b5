//! Error types shared by the indexing pipeline, the engine, and the query layer.
//!
//! Every failure carries enough context (offending path, line, or query
//! fragment) to be printed as a single diagnostic line by the CLI.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Failure reported by an indexing or query operation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{}: no such file or index", path.display())]
    NotFound { path: PathBuf },

    #[error("{}{}: {reason}", path.display(), line.map(|l| format!(":{l}")).unwrap_or_default())]
    MalformedInput {
        path: PathBuf,
        line: Option<u64>,
        reason: String,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: index is locked by another writer", path.display())]
    Locked { path: PathBuf },

    #[error("{}: corrupt index: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("cannot parse query '{query}' at offset {position}: {message}")]
    QuerySyntax {
        query: String,
        position: usize,
        message: String,
    },

    #[error("no documents matched '{query}'")]
    EmptyResult { query: String },
}

/// Coarse failure categories, used by the CLI to pick an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MalformedInput,
    IoFailure,
    QuerySyntax,
    EmptyResult,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::NotFound { .. } => ErrorKind::NotFound,
            IndexError::MalformedInput { .. } => ErrorKind::MalformedInput,
            IndexError::Io { .. } | IndexError::Locked { .. } | IndexError::Corrupt { .. } => {
                ErrorKind::IoFailure
            }
            IndexError::QuerySyntax { .. } => ErrorKind::QuerySyntax,
            IndexError::EmptyResult { .. } => ErrorKind::EmptyResult,
        }
    }

    pub fn malformed(path: &Path, line: Option<u64>, reason: impl Into<String>) -> Self {
        IndexError::MalformedInput {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error, turning `NotFound` into [`IndexError::NotFound`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            IndexError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            IndexError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Attach a path to a fallible I/O result.
pub trait PathContext<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> PathContext<T> for io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|e| IndexError::io(path, e))
    }
}

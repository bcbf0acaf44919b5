//! Storage engine: segmented inverted index over keyed documents.
//!
//! The rest of the crate reaches the engine through [`DocumentWriter`] and
//! [`DocumentSearcher`]; [`IndexWriter`] and [`IndexReader`] are the on-disk
//! implementations.

pub mod build;
pub mod compact;
pub mod lock;
pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use build::{IndexSummary, Indexer};
pub use reader::IndexReader;
pub use types::*;
pub use writer::{IndexWriter, WriteOutcome};

use crate::error::{IndexError, PathContext, Result};
use crate::query::Query;
use lock::WriteLock;
use std::fs;
use std::io;
use std::path::Path;

pub const META_FILE: &str = "meta.json";
pub const DELETES_FILE: &str = "deletes.bin";
pub const SEGMENTS_DIR: &str = "segments";

/// Write side of the engine
pub trait DocumentWriter {
    /// Unconditional insert
    fn add_document(&mut self, doc: Document) -> Result<WriteOutcome>;

    /// Insert, superseding every live document with the same key
    fn upsert_document(&mut self, doc: Document) -> Result<WriteOutcome>;

    /// Make everything written so far visible to readers
    fn commit(&mut self) -> Result<()>;
}

/// Read side of the engine
pub trait DocumentSearcher {
    /// Matching documents in native (ascending doc id) order, at most `limit` of them
    fn search(&self, query: &Query, limit: Option<usize>) -> Result<Vec<SearchHit>>;

    /// Stored values of `fields` for one document, in the order asked.
    /// Fields the document does not have come back empty.
    fn fetch_fields(&self, doc_id: DocId, fields: &[String]) -> Result<Vec<String>>;
}

/// Delete the index at `index_path`.
///
/// Succeeds without doing anything when the path does not exist. Refuses to
/// touch a directory that holds other files but no index, and an index that a
/// writer currently has open.
pub fn remove_index(index_path: &Path) -> Result<()> {
    let metadata = match fs::metadata(index_path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(index = %index_path.display(), "nothing to drop");
            return Ok(());
        }
        Err(e) => return Err(IndexError::io(index_path, e)),
    };

    if !metadata.is_dir() {
        return Err(IndexError::io(
            index_path,
            io::Error::new(io::ErrorKind::InvalidInput, "not an index directory"),
        ));
    }

    let is_index = index_path.join(META_FILE).exists();
    let is_empty = fs::read_dir(index_path)
        .at_path(index_path)?
        .next()
        .is_none();
    if !is_index && !is_empty {
        return Err(IndexError::io(
            index_path,
            io::Error::new(io::ErrorKind::InvalidInput, "directory does not contain an index"),
        ));
    }

    // Fails with Locked while a writer is active
    drop(WriteLock::acquire(index_path)?);

    fs::remove_dir_all(index_path).at_path(index_path)?;
    tracing::info!(index = %index_path.display(), "dropped index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn create_empty(path: &Path) {
        IndexWriter::open(path, OpenMode::Create, &IndexConfig::default())
            .unwrap()
            .close()
            .unwrap();
    }

    #[test]
    fn test_remove_missing_index_is_noop() {
        let dir = tempdir().unwrap();
        assert!(remove_index(&dir.path().join("absent")).is_ok());
    }

    #[test]
    fn test_remove_index_deletes_directory() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        create_empty(&index);

        remove_index(&index).unwrap();
        assert!(!index.exists());
        remove_index(&index).unwrap();
    }

    #[test]
    fn test_remove_refuses_foreign_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("report.csv"), "id\n1\n").unwrap();

        let err = remove_index(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(dir.path().join("report.csv").exists());
    }

    #[test]
    fn test_remove_refuses_locked_index() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let mut writer = IndexWriter::open(&index, OpenMode::Create, &IndexConfig::default()).unwrap();
        writer.commit().unwrap();

        let err = remove_index(&index).unwrap_err();
        assert!(matches!(err, IndexError::Locked { .. }));

        writer.close().unwrap();
        remove_index(&index).unwrap();
        assert!(!index.exists());
    }
}

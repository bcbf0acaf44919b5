use crate::error::{IndexError, Result};
use crate::index::remove_index;
use crate::index::types::{IndexConfig, OpenMode};
use crate::index::writer::IndexWriter;
use crate::index::DocumentWriter;
use crate::ingest::{RecordSource, SourceOptions, to_document};
use crate::utils::progress::row_spinner;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

/// What an indexing run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Data rows read from the source
    pub rows: u64,
    /// Documents written
    pub added: u64,
    /// Previously live documents superseded by upserts
    pub replaced: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Add,
    Upsert,
}

/// Streams a delimited file into an index, one row at a time
#[derive(Debug, Clone)]
pub struct Indexer {
    config: IndexConfig,
    source: SourceOptions,
    progress: bool,
}

impl Indexer {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            source: SourceOptions::default(),
            progress: false,
        }
    }

    pub fn with_source_options(mut self, source: SourceOptions) -> Self {
        self.source = source;
        self
    }

    /// Show a row spinner on stderr while indexing
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Add every row of `input` to the index at `output`.
    ///
    /// `mode` must be [`OpenMode::Create`] or [`OpenMode::Append`]. Rows are
    /// always added, never replaced, so duplicate keys may coexist.
    pub fn insert(&self, input: &Path, output: &Path, mode: OpenMode) -> Result<IndexSummary> {
        if !matches!(mode, OpenMode::Create | OpenMode::Append) {
            return Err(IndexError::io(
                output,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("insert needs create or append mode, got {mode:?}"),
                ),
            ));
        }
        self.run(input, output, mode, WriteKind::Add)
    }

    /// Upsert every row of `input` into the index at `output`, creating it if needed.
    ///
    /// Each row supersedes any live document with the same key, including one
    /// written earlier in the same run.
    pub fn update(&self, input: &Path, output: &Path) -> Result<IndexSummary> {
        self.run(input, output, OpenMode::CreateOrAppend, WriteKind::Upsert)
    }

    /// Remove the index at `output`; absent indexes are not an error
    pub fn drop_index(&self, output: &Path) -> Result<()> {
        remove_index(output)
    }

    fn run(&self, input: &Path, output: &Path, mode: OpenMode, kind: WriteKind) -> Result<IndexSummary> {
        let start = Instant::now();

        // Header problems must surface before the index is opened (and maybe truncated)
        let source = RecordSource::open(input, self.source)?;
        let mut writer = IndexWriter::open(output, mode, &self.config)?;

        let mut summary = IndexSummary::default();
        let fed = self.feed(source, &mut writer, kind, &mut summary);

        // Rows before a failure stay committed; the lock is released either way
        let closed = writer.close();
        fed?;
        closed?;

        summary.elapsed = start.elapsed();
        tracing::info!(
            input = %input.display(),
            index = %output.display(),
            ?mode,
            rows = summary.rows,
            added = summary.added,
            replaced = summary.replaced,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "indexing finished"
        );
        Ok(summary)
    }

    fn feed<W: DocumentWriter>(
        &self,
        source: RecordSource,
        writer: &mut W,
        kind: WriteKind,
        summary: &mut IndexSummary,
    ) -> Result<()> {
        let spinner = row_spinner(self.progress, "Indexing");

        for row in source {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    spinner.finish_and_clear();
                    return Err(e);
                }
            };
            summary.rows += 1;

            let doc = to_document(&row);
            let outcome = match kind {
                WriteKind::Add => writer.add_document(doc),
                WriteKind::Upsert => writer.upsert_document(doc),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    spinner.finish_and_clear();
                    return Err(e);
                }
            };

            summary.added += 1;
            summary.replaced += u64::from(outcome.replaced);
            spinner.inc(1);
        }

        spinner.finish_and_clear();
        writer.commit()
    }
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::index::reader::IndexReader;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_create_then_append_is_additive() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let first = write_csv(dir.path(), "a.csv", "id,name\n1,Alice\n2,Bob\n");
        let second = write_csv(dir.path(), "b.csv", "id,name\n2,Bobby\n3,Carol\n");

        let indexer = Indexer::default();
        let summary = indexer.insert(&first, &index, OpenMode::Create).unwrap();
        assert_eq!((summary.rows, summary.added, summary.replaced), (2, 2, 0));

        indexer.insert(&second, &index, OpenMode::Append).unwrap();
        let reader = IndexReader::open(&index).unwrap();
        assert_eq!(reader.live_docs().len(), 4);
        assert_eq!(reader.key_docs("2").len(), 2);
    }

    #[test]
    fn test_create_recreates_existing_index() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let input = write_csv(dir.path(), "a.csv", "id\n1\n2\n");

        let indexer = Indexer::default();
        indexer.insert(&input, &index, OpenMode::Create).unwrap();
        indexer.insert(&input, &index, OpenMode::Create).unwrap();

        assert_eq!(IndexReader::open(&index).unwrap().live_docs().len(), 2);
    }

    #[test]
    fn test_append_to_missing_index() {
        let dir = tempdir().unwrap();
        let input = write_csv(dir.path(), "a.csv", "id\n1\n");

        let err = Indexer::default()
            .insert(&input, &dir.path().join("idx"), OpenMode::Append)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_insert_rejects_other_modes() {
        let dir = tempdir().unwrap();
        let input = write_csv(dir.path(), "a.csv", "id\n1\n");
        let index = dir.path().join("idx");

        let indexer = Indexer::default();
        assert!(indexer.insert(&input, &index, OpenMode::CreateOrAppend).is_err());
        assert!(indexer.insert(&input, &index, OpenMode::ReadOnly).is_err());
        assert!(!index.exists());
    }

    #[test]
    fn test_update_collapses_duplicate_keys() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let input = write_csv(dir.path(), "a.csv", "id,name\n1,Alice\n1,Alicia\n2,Bob\n");

        let summary = Indexer::default().update(&input, &index).unwrap();
        assert_eq!((summary.rows, summary.added, summary.replaced), (3, 3, 1));

        let reader = IndexReader::open(&index).unwrap();
        let live = reader.key_docs("1") & reader.live_docs();
        assert_eq!(live.len(), 1);
        let doc = reader.document(live.min().unwrap()).unwrap().unwrap();
        assert_eq!(doc.field("name"), Some("Alicia"));
    }

    #[test]
    fn test_missing_id_leaves_index_untouched() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let good = write_csv(dir.path(), "good.csv", "id\n1\n2\n");
        let bad = write_csv(dir.path(), "bad.csv", "name\nAlice\n");

        let indexer = Indexer::default();
        indexer.insert(&good, &index, OpenMode::Create).unwrap();

        let err = indexer.insert(&bad, &index, OpenMode::Create).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(IndexReader::open(&index).unwrap().live_docs().len(), 2);
    }

    #[test]
    fn test_rows_before_failure_stay_committed() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let input = write_csv(dir.path(), "a.csv", "id,name\n1,Alice\n2,Bob\n3\n4,Dan\n");

        let err = Indexer::default().update(&input, &index).unwrap_err();
        assert!(matches!(err, IndexError::MalformedInput { line: Some(4), .. }));

        let reader = IndexReader::open(&index).unwrap();
        assert_eq!(reader.live_docs().len(), 2);

        // lock was released
        let again = Indexer::default().update(&input, &index).unwrap_err();
        assert_eq!(again.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_header_only_creates_empty_index() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let input = write_csv(dir.path(), "a.csv", "id,name\n");

        let summary = Indexer::default().insert(&input, &index, OpenMode::Create).unwrap();
        assert_eq!(summary.rows, 0);
        assert!(IndexReader::open(&index).unwrap().live_docs().is_empty());
    }

    #[test]
    fn test_drop_index() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");
        let input = write_csv(dir.path(), "a.csv", "id\n1\n");

        let indexer = Indexer::default();
        indexer.insert(&input, &index, OpenMode::Create).unwrap();
        indexer.drop_index(&index).unwrap();
        assert!(!index.exists());
        indexer.drop_index(&index).unwrap();
    }
}

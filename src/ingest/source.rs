use crate::error::{IndexError, Result};
use crate::index::KEY_FIELD;
use csv::{ReaderBuilder, StringRecord};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Options for reading a delimited file
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub delimiter: u8,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

/// Column names of a source, plus where the key column sits
#[derive(Debug)]
pub struct Header {
    names: Vec<String>,
    key_index: usize,
}

impl Header {
    fn parse(path: &Path, record: &StringRecord) -> Result<Self> {
        if record.is_empty() {
            return Err(IndexError::malformed(path, Some(1), "missing header row"));
        }

        let mut names: Vec<String> = Vec::with_capacity(record.len());
        let mut seen = FxHashSet::default();
        for (i, name) in record.iter().enumerate() {
            let name = if i == 0 {
                name.trim_start_matches('\u{feff}')
            } else {
                name
            };
            if name.contains('\0') {
                return Err(IndexError::malformed(
                    path,
                    Some(1),
                    format!("column {} has a NUL byte in its name", i + 1),
                ));
            }
            if !seen.insert(name) {
                return Err(IndexError::malformed(
                    path,
                    Some(1),
                    format!("duplicate column '{name}'"),
                ));
            }
            names.push(name.to_string());
        }

        let key_index = names
            .iter()
            .position(|n| n == KEY_FIELD)
            .ok_or_else(|| {
                IndexError::malformed(path, Some(1), format!("no '{KEY_FIELD}' column in header"))
            })?;

        Ok(Self { names, key_index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One data row of the source
#[derive(Debug, Clone)]
pub struct Row {
    /// 1-based line the row starts on
    pub line: u64,
    header: Rc<Header>,
    values: StringRecord,
}

impl Row {
    /// Value of the key column
    pub fn key(&self) -> &str {
        self.values.get(self.header.key_index).unwrap_or_default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.header.names.iter().position(|n| n == column)?;
        self.values.get(idx)
    }

    /// (column, value) pairs in column order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Lazy, single-pass reader over the rows of a delimited file.
///
/// The header is read and validated on open, so a file without a key column
/// is rejected before any row is produced. Iteration stops after the first
/// error.
pub struct RecordSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    header: Rc<Header>,
    record: StringRecord,
    done: bool,
}

impl RecordSource {
    pub fn open(path: &Path, options: SourceOptions) -> Result<Self> {
        let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| IndexError::io(path, e))?;
        if metadata.is_dir() {
            return Err(IndexError::io(
                path,
                io::Error::new(io::ErrorKind::IsADirectory, "is a directory"),
            ));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        let header = match reader.headers() {
            Ok(record) => Header::parse(path, record)?,
            Err(e) => return Err(map_csv_error(path, e)),
        };

        tracing::debug!(
            source = %path.display(),
            columns = header.names.len(),
            "opened record source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header: Rc::new(header),
            record: StringRecord::new(),
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| map_csv_error(&self.path, e))?;
        if !more {
            return Ok(None);
        }

        let line = self.record.position().map(|p| p.line());
        let row = Row {
            line: line.unwrap_or_default(),
            header: Rc::clone(&self.header),
            values: self.record.clone(),
        };

        if row.key().is_empty() {
            return Err(IndexError::malformed(
                &self.path,
                line,
                format!("empty '{KEY_FIELD}' value"),
            ));
        }
        Ok(Some(row))
    }
}

impl Iterator for RecordSource {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn map_csv_error(path: &Path, err: csv::Error) -> IndexError {
    let line = err.position().map(|p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(e) => IndexError::io(path, e),
        csv::ErrorKind::Utf8 { err, .. } => {
            IndexError::malformed(path, line, format!("invalid UTF-8 in field {}", err.field() + 1))
        }
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => IndexError::malformed(
            path,
            line,
            format!("expected {expected_len} columns, found {len}"),
        ),
        other => IndexError::malformed(path, line, format!("{other:?}")),
    }
}

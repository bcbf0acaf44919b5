use crate::error::{PathContext, Result};
use crate::index::reader::IndexReader;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Summary of an index's on-disk state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub index_path: PathBuf,
    pub version: u32,
    /// Documents visible to search
    pub live_docs: u64,
    /// Documents replaced by an upsert and awaiting compaction
    pub superseded_docs: u64,
    pub segment_count: usize,
    pub fields: Vec<String>,
    pub size_bytes: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Gather statistics for the index at `index_path`
pub fn collect_stats(index_path: &Path) -> Result<IndexStats> {
    let reader = IndexReader::open(index_path)?;
    let meta = reader.meta();

    Ok(IndexStats {
        index_path: index_path.to_path_buf(),
        version: meta.version,
        live_docs: reader.live_docs().len(),
        superseded_docs: reader.deletes().len(),
        segment_count: meta.segments.len(),
        fields: meta.fields.clone(),
        size_bytes: dir_size(index_path).at_path(index_path)?,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
    })
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format unix timestamp as `YYYY-MM-DD HH:MM:SS UTC`
pub fn format_timestamp(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

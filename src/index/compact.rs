use crate::error::Result;
use crate::index::types::{IndexConfig, OpenMode};
use crate::index::writer::IndexWriter;
use std::path::Path;

/// Outcome of a compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSummary {
    pub segments_before: usize,
    pub segments_after: usize,
    /// Superseded documents removed from disk
    pub purged: u32,
    pub live: u32,
}

/// Merge all segments of an index into one and drop superseded documents
pub fn compact_index(index_path: &Path, config: &IndexConfig) -> Result<CompactSummary> {
    let writer = IndexWriter::open(index_path, OpenMode::Append, config)?;
    let segments_before = writer.meta().segments.len();

    if segments_before <= 1 && writer.meta().deleted_count == 0 {
        tracing::info!(index = %index_path.display(), "index is already compact");
        let live = writer.meta().live_count();
        writer.close()?;
        return Ok(CompactSummary {
            segments_before,
            segments_after: segments_before,
            purged: 0,
            live,
        });
    }

    let index = writer.index_path().to_path_buf();
    let purged = writer.compact()?;

    let meta = crate::index::reader::read_meta(&index)?;
    let summary = CompactSummary {
        segments_before,
        segments_after: meta.segments.len(),
        purged,
        live: meta.live_count(),
    };
    tracing::info!(
        index = %index_path.display(),
        segments_before,
        segments_after = summary.segments_after,
        purged,
        "compaction finished"
    );
    Ok(summary)
}

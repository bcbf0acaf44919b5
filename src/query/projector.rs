use crate::error::{IndexError, Result};
use crate::index::reader::IndexReader;
use crate::index::DocumentSearcher;
use crate::query::parser::parse_query;
use std::num::NonZeroUsize;
use std::path::Path;

/// Rows produced by `find`: a header plus one row per match, both in caller field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Run `query` against the index at `index_path` and project `fields` for each match.
///
/// Matches come back in the engine's native order. With no `limit` every match
/// is returned. Zero matches is reported as [`IndexError::EmptyResult`].
pub fn find(
    index_path: &Path,
    fields: &[String],
    query: &str,
    limit: Option<NonZeroUsize>,
) -> Result<ResultSet> {
    let reader = IndexReader::open(index_path)?;
    project(&reader, fields, query, limit)
}

/// [`find`] against any searcher
pub fn project<S: DocumentSearcher>(
    searcher: &S,
    fields: &[String],
    query: &str,
    limit: Option<NonZeroUsize>,
) -> Result<ResultSet> {
    let parsed = parse_query(query)?;
    let hits = searcher.search(&parsed, limit.map(NonZeroUsize::get))?;

    if hits.is_empty() {
        return Err(IndexError::EmptyResult {
            query: query.to_string(),
        });
    }

    let rows = hits
        .iter()
        .map(|hit| searcher.fetch_fields(hit.doc_id, fields))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(query, matches = rows.len(), "find finished");

    Ok(ResultSet {
        fields: fields.to_vec(),
        rows,
    })
}

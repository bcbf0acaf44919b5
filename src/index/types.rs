use serde::{Deserialize, Serialize};

/// Unique identifier for a document in the index
pub type DocId = u32;

/// Segment identifier
pub type SegmentId = u16;

/// Name of the column that supplies each document's key
pub const KEY_FIELD: &str = "id";

/// Current on-disk format version
pub const INDEX_VERSION: u32 = 1;

/// One indexed record: a unique key plus its fields in source column order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: String,
    pub fields: Vec<(String, String)>,
}

impl Document {
    /// Value of a field, if the document has it
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How an index is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start from an empty index, discarding existing contents
    Create,
    /// Add to an index that must already exist
    Append,
    /// Create the index if absent, otherwise open it for modification
    CreateOrAppend,
    /// Search only
    ReadOnly,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// Index metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    /// Next document id to hand out
    pub next_doc_id: DocId,
    /// Next segment id to hand out
    pub next_segment_id: SegmentId,
    /// Committed segments, in write order
    pub segments: Vec<SegmentMeta>,
    /// Field names seen so far, in first-seen order
    pub fields: Vec<String>,
    /// Documents superseded by an upsert and not yet compacted away
    pub deleted_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Default for IndexMeta {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            next_doc_id: 1,
            next_segment_id: 1,
            segments: Vec::new(),
            fields: Vec::new(),
            deleted_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl IndexMeta {
    /// Total documents written, superseded ones included
    pub fn doc_count(&self) -> u32 {
        self.segments.iter().map(|s| s.doc_count).sum()
    }

    /// Documents visible to search
    pub fn live_count(&self) -> u32 {
        self.doc_count().saturating_sub(self.deleted_count)
    }

    /// Remember a field name, keeping first-seen order
    pub fn register_field(&mut self, name: &str) {
        if !self.fields.iter().any(|f| f == name) {
            self.fields.push(name.to_string());
        }
    }
}

/// Committed segment summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentMeta {
    pub id: SegmentId,
    pub doc_count: u32,
    pub min_doc_id: DocId,
    pub max_doc_id: DocId,
}

impl SegmentMeta {
    pub fn dir_name(&self) -> String {
        segment_dir_name(self.id)
    }
}

pub fn segment_dir_name(id: SegmentId) -> String {
    format!("seg_{:04}", id)
}

/// A single search match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub key: String,
    /// Relevance score; the engine does not rank, so this is always `None`
    pub score: Option<f32>,
}

/// Configuration for the index writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of buffered documents that triggers a segment flush
    pub flush_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 50_000,
        }
    }
}

/// Build the dictionary term for a token in a field
#[inline]
pub fn field_term(field: &str, token: &str) -> String {
    let mut term = String::with_capacity(field.len() + token.len() + 1);
    term.push_str(field);
    term.push('\0');
    term.push_str(token);
    term
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_field_lookup() {
        let doc = Document {
            key: "7".to_string(),
            fields: vec![
                ("id".to_string(), "7".to_string()),
                ("name".to_string(), String::new()),
            ],
        };
        assert_eq!(doc.field("id"), Some("7"));
        assert_eq!(doc.field("name"), Some(""));
        assert_eq!(doc.field("email"), None);
    }

    #[test]
    fn test_meta_counts() {
        let mut meta = IndexMeta::default();
        meta.segments.push(SegmentMeta { id: 1, doc_count: 3, min_doc_id: 1, max_doc_id: 3 });
        meta.segments.push(SegmentMeta { id: 2, doc_count: 2, min_doc_id: 4, max_doc_id: 5 });
        meta.deleted_count = 1;
        assert_eq!(meta.doc_count(), 5);
        assert_eq!(meta.live_count(), 4);
    }

    #[test]
    fn test_register_field_keeps_first_seen_order() {
        let mut meta = IndexMeta::default();
        meta.register_field("id");
        meta.register_field("name");
        meta.register_field("id");
        assert_eq!(meta.fields, vec!["id", "name"]);
    }

    #[test]
    fn test_field_terms_sort_by_field_first() {
        // "a\0z" must sort before "ab\0a" so a field's terms stay contiguous
        assert!(field_term("a", "z") < field_term("ab", "a"));
    }

    #[test]
    fn test_segment_dir_name() {
        assert_eq!(segment_dir_name(3), "seg_0003");
    }
}

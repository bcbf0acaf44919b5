use crate::error::{IndexError, PathContext, Result};
use crate::index::lock::WriteLock;
use crate::index::reader::IndexReader;
use crate::index::types::*;
use crate::index::{DELETES_FILE, DocumentWriter, META_FILE, SEGMENTS_DIR};
use crate::utils::{analyze, encode_postings, write_str, write_u32_le, write_u64_le};
use chrono::Utc;
use roaring::RoaringBitmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Result of handing one document to the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub doc_id: DocId,
    /// Live documents this write superseded (always 0 for plain adds)
    pub replaced: u32,
}

/// Index writer for building and updating the search index.
///
/// Stored documents stream straight to the open segment's `docs.bin`;
/// postings are buffered until the segment is flushed. Nothing becomes
/// visible to readers until [`IndexWriter::commit`] rewrites `meta.json`.
pub struct IndexWriter {
    index_path: PathBuf,
    config: IndexConfig,
    meta: IndexMeta,
    /// Committed state at open time, consulted for key lookups on upsert
    base: Option<IndexReader>,
    deletes: RoaringBitmap,
    deletes_dirty: bool,
    /// Keys upserted by this writer -> their doc ids
    session_keys: FxHashMap<String, Vec<DocId>>,
    /// Mirror of `meta.fields` for constant-time lookups
    known_fields: FxHashSet<String>,
    segment: Option<SegmentBuilder>,
    _lock: WriteLock,
}

impl IndexWriter {
    /// Open the index at `index_path` for writing under `mode`
    pub fn open(index_path: &Path, mode: OpenMode, config: &IndexConfig) -> Result<Self> {
        let meta_path = index_path.join(META_FILE);

        if !mode.is_writable() {
            return Err(IndexError::io(
                index_path,
                io::Error::new(io::ErrorKind::InvalidInput, "cannot write in read-only mode"),
            ));
        }

        match mode {
            OpenMode::ReadOnly => {}
            OpenMode::Append if !meta_path.exists() => {
                return Err(IndexError::NotFound {
                    path: index_path.to_path_buf(),
                });
            }
            OpenMode::Append => {}
            OpenMode::Create | OpenMode::CreateOrAppend => {
                fs::create_dir_all(index_path).at_path(index_path)?;
            }
        }

        let lock = WriteLock::acquire(index_path)?;

        let existing = mode != OpenMode::Create && meta_path.exists();
        let (meta, base, deletes) = if existing {
            let base = IndexReader::open(index_path)?;
            let meta = base.meta().clone();
            let deletes = base.deletes().clone();
            (meta, Some(base), deletes)
        } else {
            clear_index_dir(index_path)?;
            let now = unix_now();
            let meta = IndexMeta {
                created_at: now,
                updated_at: now,
                ..IndexMeta::default()
            };
            (meta, None, RoaringBitmap::new())
        };

        remove_orphan_segments(index_path, &meta)?;
        let known_fields = meta.fields.iter().cloned().collect();

        tracing::debug!(
            index = %index_path.display(),
            ?mode,
            docs = meta.doc_count(),
            segments = meta.segments.len(),
            "opened index writer"
        );

        Ok(Self {
            index_path: index_path.to_path_buf(),
            config: config.clone(),
            meta,
            base,
            deletes,
            deletes_dirty: !existing,
            session_keys: FxHashMap::default(),
            known_fields,
            segment: None,
            _lock: lock,
        })
    }

    /// Add a document without looking at existing keys
    pub fn add(&mut self, doc: Document) -> Result<WriteOutcome> {
        let doc_id = self.write_document(doc)?;
        Ok(WriteOutcome { doc_id, replaced: 0 })
    }

    /// Add a document, superseding every live document with the same key.
    ///
    /// Older documents are only marked superseded once the new one is written.
    pub fn upsert(&mut self, doc: Document) -> Result<WriteOutcome> {
        let key = doc.key.clone();
        let doc_id = self.write_document(doc)?;
        let replaced = self.delete_key(&key);
        self.session_keys.entry(key).or_default().push(doc_id);
        Ok(WriteOutcome { doc_id, replaced })
    }

    /// Mark committed documents and earlier upserts with `key` as superseded
    fn delete_key(&mut self, key: &str) -> u32 {
        let mut ids = self
            .base
            .as_ref()
            .map(|base| base.key_docs(key))
            .unwrap_or_default();
        if let Some(session) = self.session_keys.get(key) {
            ids.extend(session.iter().copied());
        }

        let mut replaced = 0;
        for id in ids {
            if self.deletes.insert(id) {
                replaced += 1;
            }
        }
        if replaced > 0 {
            self.deletes_dirty = true;
        }
        replaced
    }

    fn write_document(&mut self, doc: Document) -> Result<DocId> {
        let doc_id = self.meta.next_doc_id;
        let next_doc_id = doc_id
            .checked_add(1)
            .ok_or_else(|| IndexError::corrupt(&self.index_path, "document ids exhausted"))?;

        if self.segment.is_none() {
            let id = self.meta.next_segment_id;
            self.meta.next_segment_id = id
                .checked_add(1)
                .ok_or_else(|| IndexError::corrupt(&self.index_path, "segment ids exhausted"))?;
            self.segment = Some(SegmentBuilder::create(&self.index_path, id)?);
        }
        self.meta.next_doc_id = next_doc_id;

        for (name, _) in &doc.fields {
            if !self.known_fields.contains(name) {
                self.known_fields.insert(name.clone());
                self.meta.register_field(name);
            }
        }

        let full = match self.segment.as_mut() {
            Some(segment) => {
                segment.add(doc_id, &doc)?;
                segment.doc_count as usize >= self.config.flush_threshold
            }
            None => false,
        };

        if full {
            self.flush()?;
        }

        Ok(doc_id)
    }

    /// Finish the open segment, if any. Not visible until the next commit.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(segment) = self.segment.take() {
            let segment_meta = segment.finish()?;
            tracing::debug!(
                segment = segment_meta.id,
                docs = segment_meta.doc_count,
                "flushed segment"
            );
            self.meta.segments.push(segment_meta);
        }
        Ok(())
    }

    /// Flush and publish everything written so far
    pub fn commit(&mut self) -> Result<()> {
        self.flush()?;

        if self.deletes_dirty {
            write_deletes(&self.index_path, &self.deletes)?;
            self.deletes_dirty = false;
        }

        self.meta.deleted_count = self.deletes.len() as u32;
        self.meta.updated_at = unix_now();
        write_meta(&self.index_path, &self.meta)
    }

    /// Commit and release the write lock
    pub fn close(mut self) -> Result<()> {
        self.commit()
    }

    /// Rewrite every live document into one segment, purging superseded ones.
    ///
    /// Pending writes are committed first. Documents keep their ids, so native
    /// order is unchanged. Returns the number of documents purged.
    pub fn compact(mut self) -> Result<u32> {
        self.commit()?;
        self.base = None;
        let base = IndexReader::open(&self.index_path)?;

        let old_segments = std::mem::take(&mut self.meta.segments);
        let live = base.live_docs().clone();
        let purged = base.deletes().len() as u32;

        if !live.is_empty() {
            let id = self.meta.next_segment_id;
            self.meta.next_segment_id = id
                .checked_add(1)
                .ok_or_else(|| IndexError::corrupt(&self.index_path, "segment ids exhausted"))?;

            let mut segment = SegmentBuilder::create(&self.index_path, id)?;
            for doc_id in &live {
                let doc = base.document(doc_id)?.ok_or_else(|| {
                    IndexError::corrupt(&self.index_path, format!("document {doc_id} is not stored"))
                })?;
                segment.add(doc_id, &doc)?;
            }
            self.meta.segments.push(segment.finish()?);
        }
        drop(base);

        self.deletes.clear();
        write_deletes(&self.index_path, &self.deletes)?;
        self.deletes_dirty = false;
        self.meta.deleted_count = 0;
        self.meta.updated_at = unix_now();
        write_meta(&self.index_path, &self.meta)?;

        for segment in &old_segments {
            let path = self.index_path.join(SEGMENTS_DIR).join(segment.dir_name());
            fs::remove_dir_all(&path).at_path(&path)?;
        }

        tracing::debug!(
            segments_before = old_segments.len(),
            segments_after = self.meta.segments.len(),
            purged,
            "compacted index"
        );
        Ok(purged)
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

impl DocumentWriter for IndexWriter {
    fn add_document(&mut self, doc: Document) -> Result<WriteOutcome> {
        self.add(doc)
    }

    fn upsert_document(&mut self, doc: Document) -> Result<WriteOutcome> {
        self.upsert(doc)
    }

    fn commit(&mut self) -> Result<()> {
        IndexWriter::commit(self)
    }
}

/// Segment being written
struct SegmentBuilder {
    id: SegmentId,
    path: PathBuf,
    docs_out: BufWriter<File>,
    docs_offset: u64,
    doc_index: Vec<(DocId, u64)>,
    /// "field\0term" -> ascending doc ids
    terms: BTreeMap<String, Vec<DocId>>,
    /// key -> ascending doc ids
    keys: BTreeMap<String, Vec<DocId>>,
    doc_count: u32,
    min_doc_id: DocId,
    max_doc_id: DocId,
}

impl SegmentBuilder {
    fn create(index_path: &Path, id: SegmentId) -> Result<Self> {
        let path = index_path.join(SEGMENTS_DIR).join(segment_dir_name(id));
        fs::create_dir_all(&path).at_path(&path)?;

        let docs_path = path.join("docs.bin");
        let docs_out = BufWriter::new(File::create(&docs_path).at_path(&docs_path)?);

        Ok(Self {
            id,
            path,
            docs_out,
            docs_offset: 0,
            doc_index: Vec::new(),
            terms: BTreeMap::new(),
            keys: BTreeMap::new(),
            doc_count: 0,
            min_doc_id: 0,
            max_doc_id: 0,
        })
    }

    fn add(&mut self, doc_id: DocId, doc: &Document) -> Result<()> {
        // Stored fields
        let mut record = Vec::new();
        encode_document(doc, &mut record);
        self.docs_out
            .write_all(&record)
            .at_path(&self.path.join("docs.bin"))?;
        self.doc_index.push((doc_id, self.docs_offset));
        self.docs_offset += record.len() as u64;

        // Key postings
        push_posting(self.keys.entry(doc.key.clone()).or_default(), doc_id);

        // Term postings; the key column is a keyword field and is not analyzed
        for (name, value) in &doc.fields {
            if name == KEY_FIELD {
                continue;
            }
            for token in analyze(value) {
                push_posting(self.terms.entry(field_term(name, &token)).or_default(), doc_id);
            }
        }

        if self.doc_count == 0 {
            self.min_doc_id = doc_id;
        }
        self.max_doc_id = doc_id;
        self.doc_count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<SegmentMeta> {
        self.docs_out
            .flush()
            .at_path(&self.path.join("docs.bin"))?;

        write_doc_index(&self.path, &self.doc_index)?;
        write_dictionary(&self.path, "terms", &self.terms)?;
        write_dictionary(&self.path, "keys", &self.keys)?;

        Ok(SegmentMeta {
            id: self.id,
            doc_count: self.doc_count,
            min_doc_id: self.min_doc_id,
            max_doc_id: self.max_doc_id,
        })
    }
}

/// Append a doc id to a postings list, skipping repeats from the same document
fn push_posting(postings: &mut Vec<DocId>, doc_id: DocId) {
    if postings.last() != Some(&doc_id) {
        postings.push(doc_id);
    }
}

/// Serialize a stored document: key, field count, then (name, value) pairs
pub(crate) fn encode_document(doc: &Document, buf: &mut Vec<u8>) {
    // Writes into a Vec cannot fail
    let _ = write_str(buf, &doc.key);
    let _ = write_u32_le(buf, doc.fields.len() as u32);
    for (name, value) in &doc.fields {
        let _ = write_str(buf, name);
        let _ = write_str(buf, value);
    }
}

/// Write docs.idx: count, then (doc_id, offset) pairs
fn write_doc_index(segment_path: &Path, doc_index: &[(DocId, u64)]) -> Result<()> {
    let path = segment_path.join("docs.idx");
    let write = || -> io::Result<()> {
        let mut file = BufWriter::new(File::create(&path)?);
        write_u32_le(&mut file, doc_index.len() as u32)?;
        for &(doc_id, offset) in doc_index {
            write_u32_le(&mut file, doc_id)?;
            write_u64_le(&mut file, offset)?;
        }
        file.flush()
    };
    write().at_path(&path)
}

/// Write `<stem>.dict` and `<stem>.postings`
fn write_dictionary(
    segment_path: &Path,
    stem: &str,
    entries: &BTreeMap<String, Vec<DocId>>,
) -> Result<()> {
    let dict_path = segment_path.join(format!("{stem}.dict"));
    let postings_path = segment_path.join(format!("{stem}.postings"));

    let write = || -> io::Result<()> {
        let mut dict_file = BufWriter::new(File::create(&dict_path)?);
        let mut postings_file = BufWriter::new(File::create(&postings_path)?);

        write_u32_le(&mut dict_file, entries.len() as u32)?;

        let mut postings_offset: u64 = 0;
        let mut encoded = Vec::new();

        for (term, doc_ids) in entries {
            encoded.clear();
            encode_postings(doc_ids, &mut encoded);

            write_str(&mut dict_file, term)?;
            write_u64_le(&mut dict_file, postings_offset)?;
            write_u32_le(&mut dict_file, encoded.len() as u32)?;
            write_u32_le(&mut dict_file, doc_ids.len() as u32)?;

            postings_file.write_all(&encoded)?;
            postings_offset += encoded.len() as u64;
        }

        dict_file.flush()?;
        postings_file.flush()
    };
    write().at_path(&dict_path)
}

/// Write meta.json through a temp file so readers never see a partial commit
pub(crate) fn write_meta(index_path: &Path, meta: &IndexMeta) -> Result<()> {
    let meta_path = index_path.join(META_FILE);
    let tmp_path = index_path.join(format!("{META_FILE}.tmp"));

    if tmp_path.exists() {
        tracing::warn!(path = %tmp_path.display(), "overwriting stale temporary meta file");
    }

    let file = File::create(&tmp_path).at_path(&tmp_path)?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, meta)
        .map_err(|e| IndexError::io(&tmp_path, io::Error::other(e)))?;
    out.flush().at_path(&tmp_path)?;
    drop(out);

    fs::rename(&tmp_path, &meta_path).at_path(&meta_path)
}

pub(crate) fn write_deletes(index_path: &Path, deletes: &RoaringBitmap) -> Result<()> {
    let path = index_path.join(DELETES_FILE);
    let write = || -> io::Result<()> {
        let mut file = BufWriter::new(File::create(&path)?);
        deletes.serialize_into(&mut file)?;
        file.flush()
    };
    write().at_path(&path)
}

/// Remove the index's own files; anything else in the directory is left alone
fn clear_index_dir(index_path: &Path) -> Result<()> {
    let tmp_meta = format!("{META_FILE}.tmp");
    for name in [META_FILE, tmp_meta.as_str(), DELETES_FILE] {
        let path = index_path.join(name);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(IndexError::io(&path, e)),
            _ => {}
        }
    }

    let segments_path = index_path.join(SEGMENTS_DIR);
    match fs::remove_dir_all(&segments_path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(IndexError::io(&segments_path, e)),
        _ => Ok(()),
    }
}

/// Delete segment directories left behind by a writer that never committed
fn remove_orphan_segments(index_path: &Path, meta: &IndexMeta) -> Result<()> {
    let segments_path = index_path.join(SEGMENTS_DIR);
    if !segments_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(&segments_path).at_path(&segments_path)? {
        let entry = entry.at_path(&segments_path)?;
        let name = entry.file_name();
        let referenced = meta
            .segments
            .iter()
            .any(|s| name.to_str() == Some(s.dir_name().as_str()));
        if !referenced {
            tracing::debug!(segment = ?name, "removing uncommitted segment");
            fs::remove_dir_all(entry.path()).at_path(&entry.path())?;
        }
    }
    Ok(())
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::index::reader::read_meta;
    use tempfile::tempdir;

    fn doc(key: &str, name: &str) -> Document {
        Document {
            key: key.to_string(),
            fields: vec![
                ("id".to_string(), key.to_string()),
                ("name".to_string(), name.to_string()),
            ],
        }
    }

    #[test]
    fn test_create_writes_meta_even_when_empty() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("idx");

        IndexWriter::open(&index, OpenMode::Create, &IndexConfig::default())
            .unwrap()
            .close()
            .unwrap();

        let meta = read_meta(&index).unwrap();
        assert_eq!(meta.doc_count(), 0);
        assert!(meta.segments.is_empty());
    }

    #[test]
    fn test_create_leaves_foreign_files_alone() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default())
            .unwrap()
            .close()
            .unwrap();

        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_append_requires_existing_index() {
        let dir = tempdir().unwrap();
        let err = IndexWriter::open(&dir.path().join("idx"), OpenMode::Append, &IndexConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_read_only_mode_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(IndexWriter::open(dir.path(), OpenMode::ReadOnly, &IndexConfig::default()).is_err());
    }

    #[test]
    fn test_flush_threshold_splits_segments() {
        let dir = tempdir().unwrap();
        let config = IndexConfig { flush_threshold: 2 };
        let mut writer = IndexWriter::open(dir.path(), OpenMode::Create, &config).unwrap();
        for i in 0..5 {
            writer.add(doc(&i.to_string(), "x")).unwrap();
        }
        writer.close().unwrap();

        let meta = read_meta(dir.path()).unwrap();
        let counts: Vec<u32> = meta.segments.iter().map(|s| s.doc_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(meta.next_doc_id, 6);
    }

    #[test]
    fn test_upsert_within_session_supersedes() {
        let dir = tempdir().unwrap();
        let mut writer =
            IndexWriter::open(dir.path(), OpenMode::CreateOrAppend, &IndexConfig::default()).unwrap();

        assert_eq!(writer.upsert(doc("1", "alice")).unwrap().replaced, 0);
        assert_eq!(writer.upsert(doc("1", "bob")).unwrap().replaced, 1);
        writer.close().unwrap();

        let meta = read_meta(dir.path()).unwrap();
        assert_eq!(meta.doc_count(), 2);
        assert_eq!(meta.live_count(), 1);
    }

    #[test]
    fn test_upsert_supersedes_committed_documents() {
        let dir = tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default()).unwrap();
        writer.add(doc("1", "alice")).unwrap();
        writer.add(doc("1", "alice again")).unwrap();
        writer.close().unwrap();

        let mut writer =
            IndexWriter::open(dir.path(), OpenMode::CreateOrAppend, &IndexConfig::default()).unwrap();
        let outcome = writer.upsert(doc("1", "bob")).unwrap();
        assert_eq!(outcome.replaced, 2);
        writer.close().unwrap();

        assert_eq!(read_meta(dir.path()).unwrap().live_count(), 1);
    }

    #[test]
    fn test_failed_upsert_keeps_previous_document() {
        let dir = tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default()).unwrap();
        writer.add(doc("1", "alice")).unwrap();
        writer.close().unwrap();

        let mut meta = read_meta(dir.path()).unwrap();
        meta.next_doc_id = u32::MAX;
        write_meta(dir.path(), &meta).unwrap();

        let mut writer =
            IndexWriter::open(dir.path(), OpenMode::CreateOrAppend, &IndexConfig::default()).unwrap();
        let err = writer.upsert(doc("1", "bob")).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
        writer.close().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        let live = reader.key_docs("1") & reader.live_docs();
        assert_eq!(live.len(), 1);
        assert_eq!(reader.meta().segments.len(), 1);
    }

    #[test]
    fn test_add_does_not_track_keys() {
        let dir = tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default()).unwrap();
        writer.add(doc("1", "alice")).unwrap();
        writer.add(doc("2", "bob")).unwrap();
        assert!(writer.session_keys.is_empty());

        writer.upsert(doc("3", "carol")).unwrap();
        assert_eq!(writer.session_keys.len(), 1);
        writer.close().unwrap();
    }

    #[test]
    fn test_create_truncates_existing_index() {
        let dir = tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default()).unwrap();
        writer.add(doc("1", "alice")).unwrap();
        writer.close().unwrap();

        IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default())
            .unwrap()
            .close()
            .unwrap();

        let meta = read_meta(dir.path()).unwrap();
        assert_eq!(meta.doc_count(), 0);
        assert!(!dir.path().join(SEGMENTS_DIR).join("seg_0001").exists());
    }

    #[test]
    fn test_uncommitted_segment_is_discarded_on_reopen() {
        let dir = tempdir().unwrap();
        IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default())
            .unwrap()
            .close()
            .unwrap();

        {
            let mut writer =
                IndexWriter::open(dir.path(), OpenMode::Append, &IndexConfig::default()).unwrap();
            writer.add(doc("1", "alice")).unwrap();
            // dropped without commit
        }
        assert!(dir.path().join(SEGMENTS_DIR).join("seg_0001").exists());

        let writer = IndexWriter::open(dir.path(), OpenMode::Append, &IndexConfig::default()).unwrap();
        assert!(!dir.path().join(SEGMENTS_DIR).join("seg_0001").exists());
        assert_eq!(writer.meta().doc_count(), 0);
    }

    #[test]
    fn test_writer_holds_lock_until_close() {
        let dir = tempdir().unwrap();
        let writer = IndexWriter::open(dir.path(), OpenMode::Create, &IndexConfig::default()).unwrap();

        let err = IndexWriter::open(dir.path(), OpenMode::CreateOrAppend, &IndexConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::Locked { .. }));

        writer.close().unwrap();
        assert!(IndexWriter::open(dir.path(), OpenMode::CreateOrAppend, &IndexConfig::default()).is_ok());
    }
}

use crate::error::{IndexError, PathContext, Result};
use crate::index::types::*;
use crate::index::{DELETES_FILE, DocumentSearcher, META_FILE, SEGMENTS_DIR};
use crate::query::{Query, QueryExecutor};
use crate::utils::{decode_postings, read_str, read_u32_le, read_u64_le};
use memmap2::Mmap;
use roaring::RoaringBitmap;
use std::fs::File;
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};

/// Dictionary entry: a term and the location of its postings
struct DictEntry {
    term: String,
    offset: u64,
    length: u32,
    doc_freq: u32,
}

/// Sorted term dictionary
struct TermDict {
    entries: Vec<DictEntry>,
}

impl TermDict {
    fn lookup(&self, term: &str) -> Option<&DictEntry> {
        self.entries
            .binary_search_by(|e| e.term.as_str().cmp(term))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// All entries whose term starts with `prefix`
    fn prefix_range(&self, prefix: &str) -> &[DictEntry] {
        let start = self.entries.partition_point(|e| e.term.as_str() < prefix);
        let len = self.entries[start..]
            .iter()
            .take_while(|e| e.term.starts_with(prefix))
            .count();
        &self.entries[start..start + len]
    }
}

/// Reader for a single segment
struct SegmentReader {
    meta: SegmentMeta,
    path: PathBuf,
    terms: TermDict,
    term_postings: Option<Mmap>,
    keys: TermDict,
    key_postings: Option<Mmap>,
    /// (doc_id, offset into docs.bin), ascending by doc_id
    doc_index: Vec<(DocId, u64)>,
    docs: Option<Mmap>,
}

impl SegmentReader {
    fn open(segment_path: &Path, meta: &SegmentMeta) -> Result<Self> {
        Ok(Self {
            meta: meta.clone(),
            path: segment_path.to_path_buf(),
            terms: read_dictionary(&segment_path.join("terms.dict"))?,
            term_postings: map_file(&segment_path.join("terms.postings"))?,
            keys: read_dictionary(&segment_path.join("keys.dict"))?,
            key_postings: map_file(&segment_path.join("keys.postings"))?,
            doc_index: read_doc_index(&segment_path.join("docs.idx"))?,
            docs: map_file(&segment_path.join("docs.bin"))?,
        })
    }

    /// Postings for a dictionary entry; damaged lists read as empty
    fn decode(&self, entry: &DictEntry, postings: &Option<Mmap>) -> RoaringBitmap {
        let data: &[u8] = postings.as_deref().unwrap_or(&[]);
        let start = entry.offset as usize;
        let end = start + entry.length as usize;

        let decoded = match data.get(start..end) {
            Some(bytes) => decode_postings(bytes),
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "postings out of bounds")),
        };
        decoded.unwrap_or_else(|e| {
            tracing::warn!(segment = %self.path.display(), term = %entry.term, error = %e, "unreadable postings");
            RoaringBitmap::new()
        })
    }

    fn term_docs(&self, term: &str) -> RoaringBitmap {
        self.terms
            .lookup(term)
            .map(|e| self.decode(e, &self.term_postings))
            .unwrap_or_default()
    }

    fn term_prefix_docs(&self, prefix: &str) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for entry in self.terms.prefix_range(prefix) {
            docs |= self.decode(entry, &self.term_postings);
        }
        docs
    }

    fn key_docs(&self, key: &str) -> RoaringBitmap {
        self.keys
            .lookup(key)
            .map(|e| self.decode(e, &self.key_postings))
            .unwrap_or_default()
    }

    fn key_prefix_docs(&self, prefix: &str) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for entry in self.keys.prefix_range(prefix) {
            docs |= self.decode(entry, &self.key_postings);
        }
        docs
    }

    fn contains(&self, doc_id: DocId) -> bool {
        doc_id >= self.meta.min_doc_id && doc_id <= self.meta.max_doc_id
    }

    fn document(&self, doc_id: DocId) -> Result<Option<Document>> {
        let Ok(idx) = self.doc_index.binary_search_by_key(&doc_id, |&(id, _)| id) else {
            return Ok(None);
        };
        let offset = self.doc_index[idx].1 as usize;
        let data: &[u8] = self.docs.as_deref().unwrap_or(&[]);
        let docs_path = self.path.join("docs.bin");

        if offset >= data.len() {
            return Err(IndexError::corrupt(&docs_path, format!("document {doc_id} is out of bounds")));
        }

        decode_document(&data[offset..])
            .map(Some)
            .map_err(|e| IndexError::corrupt(&docs_path, format!("document {doc_id}: {e}")))
    }

    fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.doc_index.iter().map(|&(id, _)| id)
    }
}

/// Read-only view of a committed index
pub struct IndexReader {
    index_path: PathBuf,
    meta: IndexMeta,
    segments: Vec<SegmentReader>,
    deletes: RoaringBitmap,
    live: RoaringBitmap,
}

impl IndexReader {
    /// Open an existing index
    pub fn open(index_path: &Path) -> Result<Self> {
        if !index_path.join(META_FILE).exists() {
            return Err(IndexError::NotFound {
                path: index_path.to_path_buf(),
            });
        }

        let meta = read_meta(index_path)?;
        let deletes = read_deletes(index_path)?;

        let segments = meta
            .segments
            .iter()
            .map(|seg| {
                let path = index_path.join(SEGMENTS_DIR).join(seg.dir_name());
                SegmentReader::open(&path, seg)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut live: RoaringBitmap = segments.iter().flat_map(|s| s.doc_ids()).collect();
        live -= &deletes;

        tracing::debug!(
            index = %index_path.display(),
            segments = segments.len(),
            live = live.len(),
            "opened index reader"
        );

        Ok(Self {
            index_path: index_path.to_path_buf(),
            meta,
            segments,
            deletes,
            live,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Field names known to the index, in first-seen order
    pub fn fields(&self) -> &[String] {
        &self.meta.fields
    }

    /// Superseded documents
    pub fn deletes(&self) -> &RoaringBitmap {
        &self.deletes
    }

    /// Documents visible to search
    pub fn live_docs(&self) -> &RoaringBitmap {
        &self.live
    }

    /// Documents whose `field` contains the analyzed `token` (superseded ones included)
    pub fn term_docs(&self, field: &str, token: &str) -> RoaringBitmap {
        let term = field_term(field, token);
        let mut results = RoaringBitmap::new();
        for segment in &self.segments {
            results |= segment.term_docs(&term);
        }
        results
    }

    /// Documents with any term in `field` starting with `prefix`
    pub fn term_prefix_docs(&self, field: &str, prefix: &str) -> RoaringBitmap {
        let term = field_term(field, prefix);
        let mut results = RoaringBitmap::new();
        for segment in &self.segments {
            results |= segment.term_prefix_docs(&term);
        }
        results
    }

    /// Documents written with exactly this key (superseded ones included)
    pub fn key_docs(&self, key: &str) -> RoaringBitmap {
        let mut results = RoaringBitmap::new();
        for segment in &self.segments {
            results |= segment.key_docs(key);
        }
        results
    }

    /// Documents whose key starts with `prefix`
    pub fn key_prefix_docs(&self, prefix: &str) -> RoaringBitmap {
        let mut results = RoaringBitmap::new();
        for segment in &self.segments {
            results |= segment.key_prefix_docs(prefix);
        }
        results
    }

    /// Total postings entries for a term across segments
    pub fn doc_freq(&self, field: &str, token: &str) -> u32 {
        let term = field_term(field, token);
        self.segments
            .iter()
            .filter_map(|s| s.terms.lookup(&term))
            .map(|e| e.doc_freq)
            .sum()
    }

    /// Load a stored document
    pub fn document(&self, doc_id: DocId) -> Result<Option<Document>> {
        match self.segments.iter().find(|s| s.contains(doc_id)) {
            Some(segment) => segment.document(doc_id),
            None => Ok(None),
        }
    }
}

impl DocumentSearcher for IndexReader {
    fn search(&self, query: &Query, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        QueryExecutor::new(self).execute(query, limit)
    }

    fn fetch_fields(&self, doc_id: DocId, fields: &[String]) -> Result<Vec<String>> {
        let doc = self.document(doc_id)?.ok_or_else(|| {
            IndexError::corrupt(&self.index_path, format!("document {doc_id} is not stored"))
        })?;
        Ok(fields
            .iter()
            .map(|name| doc.field(name).unwrap_or_default().to_string())
            .collect())
    }
}

/// Read meta.json
pub fn read_meta(index_path: &Path) -> Result<IndexMeta> {
    let meta_path = index_path.join(META_FILE);
    let file = File::open(&meta_path).at_path(&meta_path)?;
    let meta: IndexMeta = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| IndexError::corrupt(&meta_path, e.to_string()))?;

    if meta.version != INDEX_VERSION {
        return Err(IndexError::corrupt(
            &meta_path,
            format!("unsupported index version {}", meta.version),
        ));
    }
    Ok(meta)
}

/// Read deletes.bin; a missing file means nothing was superseded
pub fn read_deletes(index_path: &Path) -> Result<RoaringBitmap> {
    let path = index_path.join(DELETES_FILE);
    match File::open(&path) {
        Ok(file) => RoaringBitmap::deserialize_from(BufReader::new(file))
            .map_err(|e| IndexError::corrupt(&path, e.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RoaringBitmap::new()),
        Err(e) => Err(IndexError::io(&path, e)),
    }
}

/// Memory-map a file; empty files map to `None`
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).at_path(path)?;
    let len = file.metadata().at_path(path)?.len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: segment files are immutable once their segment is committed
    let mmap = unsafe { Mmap::map(&file) }.at_path(path)?;
    Ok(Some(mmap))
}

/// Read a dictionary written by the segment writer
fn read_dictionary(dict_path: &Path) -> Result<TermDict> {
    let read = || -> io::Result<TermDict> {
        let mut file = BufReader::new(File::open(dict_path)?);
        let count = read_u32_le(&mut file)? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let term = read_str(&mut file)?;
            let offset = read_u64_le(&mut file)?;
            let length = read_u32_le(&mut file)?;
            let doc_freq = read_u32_le(&mut file)?;
            entries.push(DictEntry {
                term,
                offset,
                length,
                doc_freq,
            });
        }

        // Data is already sorted from BTreeMap write
        Ok(TermDict { entries })
    };
    read().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexError::corrupt(dict_path, "missing dictionary"),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            IndexError::corrupt(dict_path, e.to_string())
        }
        _ => IndexError::io(dict_path, e),
    })
}

/// Read docs.idx
fn read_doc_index(path: &Path) -> Result<Vec<(DocId, u64)>> {
    let read = || -> io::Result<Vec<(DocId, u64)>> {
        let mut file = BufReader::new(File::open(path)?);
        let count = read_u32_le(&mut file)? as usize;

        let mut index = Vec::with_capacity(count);
        for _ in 0..count {
            let doc_id = read_u32_le(&mut file)?;
            let offset = read_u64_le(&mut file)?;
            index.push((doc_id, offset));
        }
        Ok(index)
    };
    read().map_err(|e| IndexError::corrupt(path, e.to_string()))
}

/// Decode one stored document from the start of `data`
fn decode_document(data: &[u8]) -> io::Result<Document> {
    let mut cursor = Cursor::new(data);
    let key = read_str(&mut cursor)?;
    let field_count = read_u32_le(&mut cursor)? as usize;

    // Each field takes at least eight bytes
    let mut fields = Vec::with_capacity(field_count.min(data.len() / 8));
    for _ in 0..field_count {
        let name = read_str(&mut cursor)?;
        let value = read_str(&mut cursor)?;
        fields.push((name, value));
    }

    Ok(Document { key, fields })
}

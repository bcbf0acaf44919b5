//! # csvdex - CSV indexing and query tool
//!
//! csvdex turns delimited files into a persistent, searchable document store
//! and answers boolean field queries against it, projecting the requested
//! columns back out as CSV.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`ingest`] - Reading CSV rows and mapping them to keyed documents
//! - [`index`] - Segmented inverted index: writer, reader, indexer, compaction
//! - [`query`] - Query parsing, planning, execution, and projection
//! - [`output`] - CSV and report rendering
//! - [`error`] - The crate's error type and failure taxonomy
//! - [`utils`] - Text analysis, binary encoding, config, progress
//!
//! ## Quick Start
//!
//! ```no_run
//! use csvdex::index::{Indexer, OpenMode};
//! use csvdex::query::find;
//! use std::num::NonZeroUsize;
//! use std::path::Path;
//!
//! let indexer = Indexer::default();
//! indexer.insert(Path::new("people.csv"), Path::new("people.idx"), OpenMode::Create)?;
//!
//! let fields = vec!["id".to_string(), "name".to_string()];
//! let result = find(Path::new("people.idx"), &fields, "city:paris", NonZeroUsize::new(10))?;
//! for row in &result.rows {
//!     println!("{}", row.join(","));
//! }
//! # Ok::<(), csvdex::error::IndexError>(())
//! ```
//!
//! ## Storage
//!
//! Each index directory holds a `meta.json` commit point, a roaring bitmap
//! of superseded documents, and immutable segments with memory-mapped
//! postings and stored fields. Writes become visible only when `meta.json`
//! is replaced.

pub mod error;
pub mod index;
pub mod ingest;
pub mod output;
pub mod query;
pub mod utils;

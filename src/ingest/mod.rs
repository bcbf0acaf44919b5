//! Reading tabular input and turning rows into documents.

pub mod mapper;
pub mod source;

pub use mapper::to_document;
pub use source::{Header, RecordSource, Row, SourceOptions};

use crate::index::Document;
use crate::ingest::source::Row;

/// Turn a source row into a document.
///
/// Every column, the key column included, becomes one field in column order.
/// Values are copied as-is; empty values stay as empty fields.
pub fn to_document(row: &Row) -> Document {
    Document {
        key: row.key().to_string(),
        fields: row
            .columns()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::{RecordSource, SourceOptions};
    use std::fs;
    use tempfile::tempdir;

    fn first_row(content: &str) -> Row {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.csv");
        fs::write(&path, content).unwrap();
        RecordSource::open(&path, SourceOptions::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_every_column_becomes_a_field() {
        let doc = to_document(&first_row("name,id,email\nAlice,7,\n"));

        assert_eq!(doc.key, "7");
        assert_eq!(
            doc.fields,
            vec![
                ("name".to_string(), "Alice".to_string()),
                ("id".to_string(), "7".to_string()),
                ("email".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_values_are_not_normalized() {
        let doc = to_document(&first_row("id,name\n A-1 ,  MiXeD Case \n"));
        assert_eq!(doc.key, " A-1 ");
        assert_eq!(doc.field("name"), Some("  MiXeD Case "));
    }
}

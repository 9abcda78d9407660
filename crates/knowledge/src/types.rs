//! Core retrieval types.

use serde::{Deserialize, Serialize};

/// Table holding ingested document chunks. Addressed directly, never part of the registry.
pub const DOCUMENTS_TABLE: &str = "documents";

/// Reserved vector column, stripped from every row handed to the model.
pub const EMBEDDING_FIELD: &str = "embedding";

/// A row projection: column name to JSON value, without the embedding.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A matched document chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub collection_slug: String,

    /// Content identifier of the source file
    pub cid: String,

    pub content: String,
}

impl Document {
    pub fn new(
        collection_slug: impl Into<String>,
        cid: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            collection_slug: collection_slug.into(),
            cid: cid.into(),
            content: content.into(),
        }
    }
}

/// Remove the embedding column from a row, if present.
pub fn strip_embedding(mut row: Row) -> Row {
    row.remove(EMBEDDING_FIELD);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_embedding() {
        let row = json!({"name": "axie", "embedding": [0.1, 0.2]});
        let row = strip_embedding(row.as_object().cloned().unwrap());
        assert_eq!(row.len(), 1);
        assert!(row.contains_key("name"));
    }
}

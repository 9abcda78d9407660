//! Context assembled for one sub-question and its text serialization.

use serde::Serialize;

use crate::types::{Document, Row};

/// Rows grouped by table plus matched documents, built fresh per sub-question.
///
/// Tables keep the order in which they were first added, so the rendered
/// text is reproducible for a fixed source selection.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RetrievedContext {
    pub tables: Vec<(String, Vec<Row>)>,
    pub documents: Vec<Document>,

    /// Sources that failed while the others succeeded
    pub warnings: Vec<String>,
}

impl RetrievedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows under `table`, merging with an existing entry of the same name.
    pub fn add_rows(&mut self, table: &str, rows: Vec<Row>) {
        match self.tables.iter_mut().find(|(name, _)| name == table) {
            Some((_, existing)) => existing.extend(rows),
            None => self.tables.push((table.to_string(), rows)),
        }
    }

    /// Append documents, skipping ones already present.
    pub fn add_documents(&mut self, documents: Vec<Document>) {
        for doc in documents {
            if !self.documents.contains(&doc) {
                self.documents.push(doc);
            }
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fold another context into this one, keeping this one's order first.
    pub fn merge(&mut self, other: RetrievedContext) {
        for (table, rows) in other.tables {
            self.add_rows(&table, rows);
        }
        self.add_documents(other.documents);
        self.warnings.extend(other.warnings);
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 && self.documents.is_empty()
    }

    /// Render as the text blob the answer prompt receives.
    pub fn render(&self) -> String {
        let mut out = String::from("Relevant Data from Database Tables:\n");
        for (table, rows) in &self.tables {
            out.push_str(&format!("Table: {}\n", table));
            for (i, row) in rows.iter().enumerate() {
                out.push_str(&format!("  Row {}:\n", i + 1));
                for (key, value) in row {
                    out.push_str(&format!("    {}: {}\n", key, display_value(value)));
                }
            }
            out.push('\n');
        }

        out.push_str("Relevant Documents:\n");
        for (i, doc) in self.documents.iter().enumerate() {
            out.push_str(&format!("Document {}:\n", i + 1));
            out.push_str(&format!("  Collection Slug: {}\n", doc.collection_slug));
            out.push_str(&format!("  CID: {}\n", doc.cid));
            out.push_str(&format!("  Content: {}\n", doc.content));
            out.push('\n');
        }

        out
    }
}

/// Strings print bare, everything else as JSON.
fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

//! Relational/vector store contract and backends.

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::sanitizer::SafeQuery;
use crate::types::{Document, Row, DOCUMENTS_TABLE};
use gamefi_core::{AppError, AppResult, StoreSettings};

/// Storage operations the orchestrator depends on.
///
/// Implementations are shared read-only across concurrent workers.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Backend name (e.g., "postgres", "sqlite").
    fn backend_name(&self) -> &str;

    /// Known tables searched by the default source, in search order.
    /// Excludes the documents table.
    fn table_registry(&self) -> &TableRegistry;

    /// Nearest documents to `embedding`, closest first.
    async fn similar_documents(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<Document>>;

    /// Nearest rows of `table` to `embedding`, closest first, without the embedding column.
    async fn similar_rows(&self, table: &str, embedding: &[f32], limit: usize)
        -> AppResult<Vec<Row>>;

    /// Execute a gate-passed query without write access.
    async fn execute_read_only(&self, query: &SafeQuery) -> AppResult<Vec<Row>>;

    /// One `table: column type, ...` line per registry table.
    async fn describe_schema(&self) -> AppResult<String>;

    /// Round-trip to the store.
    async fn ping(&self) -> AppResult<()>;
}

/// Table names the store may interpolate into similarity queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegistry {
    tables: Vec<String>,
    metadata_table: String,
}

impl TableRegistry {
    pub fn new(tables: Vec<String>, metadata_table: impl Into<String>) -> AppResult<Self> {
        let metadata_table = metadata_table.into();
        for table in tables.iter().chain(std::iter::once(&metadata_table)) {
            if !is_identifier(table) {
                return Err(AppError::Config(format!("Invalid table name: {:?}", table)));
            }
            if table == DOCUMENTS_TABLE {
                return Err(AppError::Config(format!(
                    "The {} table is searched directly and cannot be registered",
                    DOCUMENTS_TABLE
                )));
            }
        }
        Ok(Self {
            tables,
            metadata_table,
        })
    }

    pub fn from_settings(settings: &StoreSettings) -> AppResult<Self> {
        Self::new(settings.tables.clone(), settings.metadata_table.clone())
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn metadata_table(&self) -> &str {
        &self.metadata_table
    }

    /// Check that `table` is registered (or is the metadata table).
    pub fn check(&self, table: &str) -> AppResult<()> {
        if table == self.metadata_table || self.tables.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(AppError::Store(format!("Table not in registry: {}", table)))
        }
    }

    /// Registry tables followed by the metadata table when it is not already listed.
    pub fn all_tables(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.tables.iter().map(String::as_str).collect();
        if !all.contains(&self.metadata_table.as_str()) {
            all.push(&self.metadata_table);
        }
        all
    }
}

/// ASCII letter or underscore, then letters, digits or underscores.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Open the store described by the settings.
pub async fn connect(settings: &StoreSettings) -> AppResult<Arc<dyn Store>> {
    let registry = TableRegistry::from_settings(settings)?;
    match settings.backend.as_str() {
        "postgres" => {
            let store =
                PostgresStore::connect(&settings.url, settings.max_connections, registry).await?;
            Ok(Arc::new(store))
        }
        "sqlite" => {
            let store = if settings.url == ":memory:" {
                SqliteStore::open_in_memory(registry)?
            } else {
                SqliteStore::open(std::path::Path::new(&settings.url), registry)?
            };
            Ok(Arc::new(store))
        }
        other => Err(AppError::Config(format!(
            "Unknown store backend: {}. Supported: postgres, sqlite",
            other
        ))),
    }
}

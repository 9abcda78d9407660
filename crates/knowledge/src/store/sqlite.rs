//! SQLite-backed store.
//!
//! Embeddings are stored as little-endian f32 blobs and ranked in process by
//! cosine similarity. Used for local fixtures and tests.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Statement};
use serde_json::Value;

use super::{is_identifier, Store, TableRegistry};
use crate::sanitizer::SafeQuery;
use crate::types::{Document, Row, DOCUMENTS_TABLE, EMBEDDING_FIELD};
use gamefi_core::{AppError, AppResult};

/// SQLite store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    registry: TableRegistry,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path, registry: TableRegistry) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;
        Self::init(conn, registry)
    }

    pub fn open_in_memory(registry: TableRegistry) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;
        Self::init(conn, registry)
    }

    fn init(conn: Connection, registry: TableRegistry) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection_slug TEXT NOT NULL,
                cid TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Store(format!("Failed to create documents table: {}", e)))?;

        tracing::debug!("Initialized SQLite store");
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store("SQLite connection lock poisoned".to_string()))
    }

    /// Run DDL/DML for fixtures. Never reachable from generated queries.
    pub fn execute_batch(&self, sql: &str) -> AppResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| AppError::Store(format!("Failed to execute batch: {}", e)))
    }

    /// Insert a document chunk with its embedding.
    pub fn insert_document(&self, document: &Document, embedding: &[f32]) -> AppResult<()> {
        self.lock()?
            .execute(
                "INSERT INTO documents (collection_slug, cid, content, embedding) VALUES (?1, ?2, ?3, ?4)",
                params![
                    document.collection_slug,
                    document.cid,
                    document.content,
                    embedding_to_bytes(embedding),
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to insert document: {}", e)))?;
        Ok(())
    }

    /// Insert a row into a table created with [`SqliteStore::execute_batch`].
    pub fn insert_row(&self, table: &str, row: &Row, embedding: Option<&[f32]>) -> AppResult<()> {
        if !is_identifier(table) {
            return Err(AppError::Store(format!("Invalid table name: {:?}", table)));
        }

        let mut columns = Vec::with_capacity(row.len() + 1);
        let mut values = Vec::with_capacity(row.len() + 1);
        for (column, value) in row {
            if !is_identifier(column) {
                return Err(AppError::Store(format!("Invalid column name: {:?}", column)));
            }
            columns.push(column.clone());
            values.push(json_to_sql(value));
        }
        if let Some(embedding) = embedding {
            columns.push(EMBEDDING_FIELD.to_string());
            values.push(SqlValue::Blob(embedding_to_bytes(embedding)));
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        self.lock()?
            .execute(&sql, params_from_iter(values))
            .map_err(|e| AppError::Store(format!("Failed to insert row into {}: {}", table, e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    fn table_registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn similar_documents(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT collection_slug, cid, content, embedding FROM documents")
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let candidates = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(3)?;
                Ok((
                    Document {
                        collection_slug: row.get(0)?,
                        cid: row.get(1)?,
                        content: row.get(2)?,
                    },
                    bytes,
                ))
            })
            .map_err(|e| AppError::Store(format!("Failed to query documents: {}", e)))?;

        let mut scored = Vec::new();
        for candidate in candidates {
            let (document, bytes) =
                candidate.map_err(|e| AppError::Store(format!("Failed to read document: {}", e)))?;
            let score = cosine_similarity(embedding, &bytes_to_embedding(&bytes)?);
            scored.push((document, score));
        }

        Ok(rank(scored, limit))
    }

    async fn similar_rows(&self, table: &str, embedding: &[f32], limit: usize) -> AppResult<Vec<Row>> {
        self.registry.check(table)?;

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {}", table))
            .map_err(|e| AppError::Store(format!("Failed to query {}: {}", table, e)))?;

        let scored = read_rows(&mut stmt, Some(embedding))?;
        Ok(rank(scored, limit))
    }

    async fn execute_read_only(&self, query: &SafeQuery) -> AppResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(query.as_str())
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        if !stmt.readonly() {
            return Err(AppError::UnsafeQuery(
                "statement would write to the database".to_string(),
            ));
        }

        let rows = read_rows(&mut stmt, None)?;
        Ok(rows.into_iter().map(|(row, _)| row).collect())
    }

    async fn describe_schema(&self) -> AppResult<String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")
            .map_err(|e| AppError::Store(format!("Failed to prepare schema query: {}", e)))?;

        let mut lines = Vec::new();
        for table in self.registry.all_tables() {
            let columns = stmt
                .query_map([table], |row| {
                    Ok(format!("{} {}", row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| AppError::Store(format!("Failed to describe {}: {}", table, e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Store(format!("Failed to describe {}: {}", table, e)))?;

            if !columns.is_empty() {
                lines.push(format!("{}: {}", table, columns.join(", ")));
            }
        }

        Ok(lines.join("\n"))
    }

    async fn ping(&self) -> AppResult<()> {
        self.lock()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}

/// Read every row of a prepared statement, scoring against `query` when given.
fn read_rows(stmt: &mut Statement<'_>, query: Option<&[f32]>) -> AppResult<Vec<(Row, f32)>> {
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| AppError::Store(format!("Failed to execute query: {}", e)))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| AppError::Store(format!("Failed to read row: {}", e)))?
    {
        let mut projected = Row::new();
        let mut score = 0.0;
        for (i, name) in names.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| AppError::Store(format!("Failed to read column {}: {}", name, e)))?;
            if name == EMBEDDING_FIELD {
                if let (Some(query), ValueRef::Blob(bytes)) = (query, value) {
                    score = cosine_similarity(query, &bytes_to_embedding(bytes)?);
                }
                continue;
            }
            projected.insert(name.clone(), sql_to_json(value));
        }
        out.push((projected, score));
    }

    Ok(out)
}

/// Sort by score descending and keep the top `limit`.
fn rank<T>(mut scored: Vec<(T, f32)>, limit: usize) -> Vec<T> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(item, _)| item).collect()
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Store("Invalid embedding bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::{Sanitizer, SanitizerRules};
    use serde_json::json;

    fn store() -> SqliteStore {
        let registry =
            TableRegistry::new(vec!["nft".to_string(), "collection".to_string()], "collection")
                .unwrap();
        let store = SqliteStore::open_in_memory(registry).unwrap();
        store
            .execute_batch(
                "CREATE TABLE nft (token_id INTEGER, name TEXT, collection_slug TEXT, embedding BLOB);
                 CREATE TABLE collection (opensea_slug TEXT, game_name TEXT, embedding BLOB);",
            )
            .unwrap();
        store
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_embedding_bytes_roundtrip_rejects_ragged_input() {
        let bytes = embedding_to_bytes(&[0.5, -1.25]);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), vec![0.5, -1.25]);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }

    #[tokio::test]
    async fn test_similar_documents_ranked_and_limited() {
        let store = store();
        store
            .insert_document(&Document::new("axie", "Qm1", "Axie Infinity breeding"), &[1.0, 0.0, 0.0])
            .unwrap();
        store
            .insert_document(&Document::new("pixels", "Qm2", "Pixels farming"), &[0.0, 1.0, 0.0])
            .unwrap();
        store
            .insert_document(&Document::new("axie", "Qm3", "Axie land"), &[0.9, 0.1, 0.0])
            .unwrap();

        let docs = store.similar_documents(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].cid, "Qm1");
        assert_eq!(docs[1].cid, "Qm3");
    }

    #[tokio::test]
    async fn test_similar_rows_strip_embedding() {
        let store = store();
        store
            .insert_row("nft", &row(json!({"token_id": 1, "name": "Axie #1"})), Some(&[1.0, 0.0]))
            .unwrap();
        store
            .insert_row("nft", &row(json!({"token_id": 2, "name": "Pixel #2"})), Some(&[0.0, 1.0]))
            .unwrap();

        let rows = store.similar_rows("nft", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Pixel #2"));
        assert!(!rows[0].contains_key("embedding"));
    }

    #[tokio::test]
    async fn test_similar_rows_rejects_unregistered_table() {
        let store = store();
        let result = store.similar_rows("sqlite_master", &[1.0], 5).await;
        assert!(matches!(result, Err(AppError::Store(_))));
    }

    #[tokio::test]
    async fn test_execute_read_only() {
        let store = store();
        store
            .insert_row("nft", &row(json!({"token_id": 7, "name": "Axie #7"})), Some(&[1.0]))
            .unwrap();

        let gate = Sanitizer::new(SanitizerRules::default()).unwrap();
        let query = gate.sanitize("select * from nft").unwrap();
        let rows = store.execute_read_only(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["token_id"], json!(7));
        assert!(!rows[0].contains_key("embedding"));
    }

    #[tokio::test]
    async fn test_describe_schema_lists_registry_tables() {
        let store = store();
        let schema = store.describe_schema().await.unwrap();
        assert!(schema.contains("nft: token_id INTEGER, name TEXT, collection_slug TEXT, embedding BLOB"));
        assert!(schema.contains("collection: opensea_slug TEXT"));
        assert!(!schema.contains("documents"));
    }
}

//! Postgres store with pgvector similarity search.

use pgvector::Vector;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{Store, TableRegistry};
use crate::sanitizer::SafeQuery;
use crate::types::{strip_embedding, Document, Row, DOCUMENTS_TABLE, EMBEDDING_FIELD};
use gamefi_core::{AppError, AppResult};

/// Postgres/TimescaleDB store.
pub struct PostgresStore {
    pool: PgPool,
    registry: TableRegistry,
}

impl PostgresStore {
    /// Connect a pool to `url`.
    pub async fn connect(url: &str, max_connections: u32, registry: TableRegistry) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| AppError::Store(format!("Failed to connect to Postgres: {}", e)))?;

        tracing::info!(max_connections, "Connected to Postgres store");
        Ok(Self::with_pool(pool, registry))
    }

    pub fn with_pool(pool: PgPool, registry: TableRegistry) -> Self {
        Self { pool, registry }
    }
}

/// Similarity query for a registered table; the embedding column is projected away.
fn similar_rows_sql(table: &str) -> String {
    format!(
        "SELECT to_jsonb(t) - '{field}' AS row FROM {table} t \
         WHERE t.{field} IS NOT NULL ORDER BY t.{field} <=> $1 LIMIT $2",
        field = EMBEDDING_FIELD,
        table = table
    )
}

/// Wrap a gate-passed query so every row comes back as one JSON object.
fn read_only_sql(query: &SafeQuery) -> String {
    format!(
        "SELECT to_jsonb(q) - '{}' AS row FROM ({}) q",
        EMBEDDING_FIELD,
        query.as_str()
    )
}

fn into_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(strip_embedding(map)),
            _ => None,
        })
        .collect()
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    fn backend_name(&self) -> &str {
        "postgres"
    }

    fn table_registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn similar_documents(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<Document>> {
        let sql = format!(
            "SELECT collection_slug, cid, content FROM {} ORDER BY {} <=> $1 LIMIT $2",
            DOCUMENTS_TABLE, EMBEDDING_FIELD
        );

        let rows: Vec<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(&sql)
            .bind(Vector::from(embedding.to_vec()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Document search failed: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(slug, cid, content)| Document {
                collection_slug: slug.unwrap_or_default(),
                cid: cid.unwrap_or_default(),
                content: content.unwrap_or_default(),
            })
            .collect())
    }

    async fn similar_rows(&self, table: &str, embedding: &[f32], limit: usize) -> AppResult<Vec<Row>> {
        self.registry.check(table)?;

        let values: Vec<Value> = sqlx::query_scalar(&similar_rows_sql(table))
            .bind(Vector::from(embedding.to_vec()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Similarity search on {} failed: {}", table, e)))?;

        tracing::debug!(table, rows = values.len(), "Similarity search complete");
        Ok(into_rows(values))
    }

    async fn execute_read_only(&self, query: &SafeQuery) -> AppResult<Vec<Row>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Store(format!("Failed to set read-only transaction: {}", e)))?;

        let values: Vec<Value> = sqlx::query_scalar(&read_only_sql(query))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| AppError::Store(format!("Query failed: {}", e)))?;

        tx.rollback()
            .await
            .map_err(|e| AppError::Store(format!("Failed to close transaction: {}", e)))?;

        Ok(into_rows(values))
    }

    async fn describe_schema(&self) -> AppResult<String> {
        let tables: Vec<String> = self
            .registry
            .all_tables()
            .into_iter()
            .map(str::to_string)
            .collect();

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT table_name::text, \
                    string_agg(column_name::text || ' ' || data_type::text, ', ' ORDER BY ordinal_position) \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name::text = ANY($1) \
             GROUP BY table_name \
             ORDER BY table_name",
        )
        .bind(&tables)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Failed to describe schema: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(table, columns)| format!("{}: {}", table, columns))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}

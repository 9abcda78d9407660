//! Retrieval layer for the GameFi orchestrator.
//!
//! Provides the query gate for generated SQL, the [`Store`] contract with
//! Postgres/pgvector and SQLite backends, embedding providers, and the
//! retrieved-context types handed to the model.

pub mod context;
pub mod embeddings;
pub mod sanitizer;
pub mod search;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use context::RetrievedContext;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use sanitizer::{SafeQuery, SanitizeError, Sanitizer, SanitizerRules};
pub use search::{render_documents, search_documents};
pub use store::{connect, PostgresStore, SqliteStore, Store, TableRegistry};
pub use types::{Document, Row, DOCUMENTS_TABLE, EMBEDDING_FIELD};

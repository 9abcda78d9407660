//! Embedding providers.
//!
//! The orchestrator embeds each sub-question once and reuses the vector for
//! every similarity search it runs.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

//! Chat provider implementations.

pub mod ollama;

pub use ollama::OllamaClient;

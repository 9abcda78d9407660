//! GameFi Orchestrator Core Library
//!
//! This crate provides the foundational utilities shared by every other crate:
//! - Error handling (`AppError`, `AppResult`, `ErrorKind`)
//! - Logging infrastructure
//! - Layered configuration (defaults, YAML, environment, CLI)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AgentSettings, AppConfig, EmbeddingSettings, StoreSettings};
pub use error::{AppError, AppResult, ErrorKind};

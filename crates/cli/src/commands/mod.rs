//! Command handlers for the GameFi CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod check;
pub mod sanitize;
pub mod search;
pub mod sql;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use check::CheckCommand;
pub use sanitize::SanitizeCommand;
pub use search::SearchCommand;
pub use sql::SqlCommand;

use gamefi_core::{AppError, AppResult};

/// Pretty JSON to stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

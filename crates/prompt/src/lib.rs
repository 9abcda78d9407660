//! Instruction registry for the GameFi orchestrator.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, one per pipeline stage
//! - Built-in defaults with per-workspace overrides in `.gamefi/prompts/`
//! - Handlebars template rendering into system/user messages

pub mod builder;
pub mod loader;
pub mod registry;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt, parse_prompt};
pub use registry::{stages, PromptSet};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptVars};

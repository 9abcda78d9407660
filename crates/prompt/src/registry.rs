//! Per-stage instruction registry.
//!
//! A [`PromptSet`] is built once per process and handed to the orchestrator,
//! so instruction text is configuration rather than module-level constants.

use std::collections::HashMap;
use std::path::Path;

use crate::builder::build_prompt;
use crate::loader::{list_prompts, load_prompt, parse_prompt};
use crate::types::{BuiltPrompt, PromptDefinition, PromptVars};
use gamefi_core::{AppError, AppResult};

/// Stage identifiers, one per pipeline step that talks to the model.
pub mod stages {
    pub const DECOMPOSE: &str = "decompose";
    pub const CLASSIFY: &str = "classify";
    pub const SQL: &str = "sql";
    pub const ANSWER: &str = "answer";
    pub const HALLUCINATION: &str = "hallucination";
    pub const CORRECTNESS: &str = "correctness";
    pub const SYNTHESIZE: &str = "synthesize";
    pub const DIRECT: &str = "direct";

    pub const ALL: [&str; 8] = [
        DECOMPOSE,
        CLASSIFY,
        SQL,
        ANSWER,
        HALLUCINATION,
        CORRECTNESS,
        SYNTHESIZE,
        DIRECT,
    ];
}

const BUILTIN: [(&str, &str); 8] = [
    (stages::DECOMPOSE, include_str!("../prompts/decompose.yml")),
    (stages::CLASSIFY, include_str!("../prompts/classify.yml")),
    (stages::SQL, include_str!("../prompts/sql.yml")),
    (stages::ANSWER, include_str!("../prompts/answer.yml")),
    (stages::HALLUCINATION, include_str!("../prompts/hallucination.yml")),
    (stages::CORRECTNESS, include_str!("../prompts/correctness.yml")),
    (stages::SYNTHESIZE, include_str!("../prompts/synthesize.yml")),
    (stages::DIRECT, include_str!("../prompts/direct.yml")),
];

/// Instruction definitions keyed by stage id.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    definitions: HashMap<String, PromptDefinition>,
}

impl PromptSet {
    /// The definitions compiled into the binary.
    pub fn builtin() -> AppResult<Self> {
        let mut set = Self::default();
        for (id, yaml) in BUILTIN {
            let definition = parse_prompt(yaml, &format!("built-in prompt '{}'", id))?;
            set = set.with_definition(definition);
        }
        Ok(set)
    }

    /// Built-in definitions overlaid with any `.gamefi/prompts/<id>.yml` in the workspace.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut set = Self::builtin()?;
        for id in list_prompts(workspace_path)? {
            let definition = load_prompt(workspace_path, &id)?;
            if definition.id != id {
                return Err(AppError::Prompt(format!(
                    "Prompt file {}.yml declares id '{}'",
                    id, definition.id
                )));
            }
            set = set.with_definition(definition);
        }
        Ok(set)
    }

    /// Insert or replace a definition.
    pub fn with_definition(mut self, definition: PromptDefinition) -> Self {
        self.definitions.insert(definition.id.clone(), definition);
        self
    }

    pub fn get(&self, id: &str) -> Option<&PromptDefinition> {
        self.definitions.get(id)
    }

    /// Check that every pipeline stage has a definition.
    pub fn ensure_complete(&self) -> AppResult<()> {
        let missing: Vec<&str> = stages::ALL
            .iter()
            .copied()
            .filter(|id| !self.definitions.contains_key(*id))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Prompt(format!(
                "Missing prompts for stages: {}",
                missing.join(", ")
            )))
        }
    }

    /// Render the definition for `id` with the given variables.
    pub fn render(&self, id: &str, variables: PromptVars) -> AppResult<BuiltPrompt> {
        let definition = self
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))?;
        build_prompt(definition, variables)
    }
}

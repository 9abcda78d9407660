//! Sub-question decomposition.

use std::sync::Arc;

use gamefi_core::AppResult;
use gamefi_prompt::stages;
use tracing::{debug, info};

use crate::gateway::{vars, Gateway};
use crate::runtime::RunContext;

/// Line that opens the numbered sub-question block.
pub const SENTINEL: &str = "SUB QUESTIONS:";

/// Splits a question into at most `max_sub_questions` sub-questions.
pub struct Decomposer {
    gateway: Arc<Gateway>,
    max_sub_questions: usize,
}

impl Decomposer {
    pub fn new(gateway: Arc<Gateway>, max_sub_questions: usize) -> Self {
        Self {
            gateway,
            max_sub_questions,
        }
    }

    /// Ask the model for sub-questions.
    ///
    /// An unparsable reply yields an empty list; substituting the original
    /// question is left to the caller. Transport errors propagate.
    pub async fn decompose(&self, ctx: &RunContext, question: &str) -> AppResult<Vec<String>> {
        let reply = self
            .gateway
            .ask(ctx, stages::DECOMPOSE, vars([("question", question)]))
            .await?;

        let mut sub_questions = parse_sub_questions(&reply);
        if sub_questions.len() > self.max_sub_questions {
            debug!(
                parsed = sub_questions.len(),
                kept = self.max_sub_questions,
                "Truncating decomposition"
            );
            sub_questions.truncate(self.max_sub_questions);
        }

        info!(count = sub_questions.len(), "Decomposed question");
        Ok(sub_questions)
    }
}

/// Extract the numbered lines that follow the sentinel.
///
/// Each line is split on its first `". "`; lines without one are dropped.
pub fn parse_sub_questions(reply: &str) -> Vec<String> {
    let mut started = false;
    let mut sub_questions = Vec::new();

    for line in reply.lines().map(str::trim) {
        if line.starts_with(SENTINEL) {
            started = true;
            continue;
        }
        if !started || line.is_empty() {
            continue;
        }
        if let Some((_, text)) = line.split_once(". ") {
            let text = text.trim();
            if !text.is_empty() {
                sub_questions.push(text.to_string());
            }
        }
    }

    sub_questions
}

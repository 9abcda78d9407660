//! Data-source classification.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use gamefi_prompt::stages;
use tracing::info;

use crate::gateway::{vars, Gateway};
use crate::runtime::RunContext;
use crate::types::{Source, SourceSelection};

/// Picks the data sources for a sub-question.
pub struct Classifier {
    gateway: Arc<Gateway>,
}

impl Classifier {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Classify a sub-question. A reply outside the vocabulary is a
    /// [`AppError::MalformedReply`]; no heuristic repair is attempted.
    pub async fn classify(&self, ctx: &RunContext, sub_question: &str) -> AppResult<SourceSelection> {
        let reply = self
            .gateway
            .ask(ctx, stages::CLASSIFY, vars([("question", sub_question)]))
            .await?;
        let selection = parse_sources(&reply)?;
        info!(sources = %selection, "Classified sub-question");
        Ok(selection)
    }
}

/// Parse a classifier reply: `NA` alone, or comma-separated
/// `documents`/`sql`/`default` tokens.
pub fn parse_sources(reply: &str) -> AppResult<SourceSelection> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(AppError::MalformedReply("Empty data source reply".to_string()));
    }
    if reply == Source::Na.as_str() {
        return Ok(SourceSelection::na());
    }

    let mut sources = Vec::new();
    for token in reply.split(',').map(str::trim) {
        match Source::parse(token) {
            Some(Source::Na) | None => {
                return Err(AppError::MalformedReply(format!(
                    "Invalid data source: {:?}",
                    token
                )))
            }
            Some(source) => sources.push(source),
        }
    }

    SourceSelection::new(sources)
}

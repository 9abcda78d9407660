//! Search command handler.
//!
//! Document similarity search without a chat model.

use clap::Args;
use gamefi_agent::{Orchestrator, Question};
use gamefi_core::{config::AppConfig, AppResult};
use gamefi_knowledge::render_documents;

use super::print_json;

/// Find the documents closest to a text
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Text to search for
    pub query: String,

    /// Maximum number of documents
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let orchestrator = Orchestrator::from_config(config).await?;
        let mut question = Question::new(self.query.clone(), &config.model);
        if let Some(limit) = self.limit {
            question = question.with_search_limit(limit);
        }
        let ctx = orchestrator.context(&question);

        let documents = orchestrator.router().search_documents(&ctx, &self.query).await?;
        tracing::debug!("Found {} documents", documents.len());

        if self.json {
            print_json(&documents)
        } else {
            if documents.is_empty() {
                eprintln!("No matching documents");
            }
            print!("{}", render_documents(&documents));
            Ok(())
        }
    }
}

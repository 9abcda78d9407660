//! SQL command handler.
//!
//! Generates a read-only query for a question and runs it.

use clap::Args;
use gamefi_agent::{Orchestrator, Question, SqlAnswer};
use gamefi_core::{config::AppConfig, AppResult};

use super::print_json;

/// Translate a question into SQL and run it
#[derive(Args, Debug)]
pub struct SqlCommand {
    /// The question to translate
    pub question: String,

    /// Print the generated query without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SqlCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing sql command");

        let orchestrator = Orchestrator::from_config(config).await?;
        let question = Question::new(self.question.clone(), &config.model);
        let ctx = orchestrator.context(&question);
        let router = orchestrator.router();

        if self.dry_run {
            let query = router.generate_sql(&ctx, &self.question).await?;
            if self.json {
                return print_json(&serde_json::json!({ "query": query.as_str() }));
            }
            println!("{}", query);
            return Ok(());
        }

        let SqlAnswer { query, rows } = router.answer_sql(&ctx, &self.question).await?;
        if self.json {
            return print_json(&serde_json::json!({
                "query": query.as_str(),
                "rows": rows,
            }));
        }

        eprintln!("{}", query);
        for row in &rows {
            println!("{}", serde_json::Value::Object(row.clone()));
        }
        eprintln!("{} rows", rows.len());
        Ok(())
    }
}

//! Ask command handler.
//!
//! Runs the full orchestration pipeline for a question, or a single model
//! call with `--direct`.

use clap::Args;
use gamefi_agent::{Orchestrator, Question};
use gamefi_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::print_json;

/// Ask a question about the GameFi dataset
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Answer with one model call, without decomposition or retrieval
    #[arg(long)]
    pub direct: bool,

    /// Rows/documents per similarity search
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Conversation identifier recorded in logs
    #[arg(long)]
    pub conversation_id: Option<String>,

    /// Print the sub-answers to stderr before the final answer
    #[arg(long)]
    pub show_steps: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let input = self.get_question()?;
        let mut question = Question::new(input, &config.model);
        if let Some(limit) = self.limit {
            question = question.with_search_limit(limit);
        }
        if let Some(ref id) = self.conversation_id {
            question = question.with_conversation_id(id);
        }

        let orchestrator = Orchestrator::from_config(config).await?;

        if self.direct {
            let answer = orchestrator.ask_direct(&question).await?;
            if self.json {
                print_json(&serde_json::json!({
                    "answer": answer,
                    "model": question.model,
                    "provider": config.provider,
                }))?;
            } else {
                println!("{}", answer);
            }
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run");
                on_interrupt.cancel();
            }
        });

        let result = orchestrator.run_with_cancellation(&question, cancel).await?;

        if self.json {
            return print_json(&result);
        }

        if self.show_steps {
            for (i, sub_answer) in result.sub_answers.iter().enumerate() {
                eprintln!("[{}] {}\n", i + 1, sub_answer);
            }
        }
        println!("{}", result.answer);

        tracing::debug!(
            "Run {} finished in {}ms with {} sub-questions",
            result.run_id,
            result.elapsed_ms,
            result.sub_answers.len()
        );
        Ok(())
    }

    /// Get the question text from the argument or the file.
    fn get_question(&self) -> AppResult<String> {
        let text = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::Config("No question provided".to_string()));
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Config("Question is empty".to_string()));
        }
        Ok(text.to_string())
    }
}

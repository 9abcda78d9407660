//! Check command handler.
//!
//! Verifies configuration, prompts, store connectivity and, optionally, the
//! embedding and chat endpoints.

use clap::Args;
use gamefi_agent::{Orchestrator, Question};
use gamefi_core::{config::AppConfig, AppResult};
use gamefi_knowledge::{connect, create_provider};
use gamefi_prompt::PromptSet;

/// Check configuration and connectivity
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Also embed a probe text
    #[arg(long)]
    pub embed: bool,

    /// Also send a probe question to the chat model
    #[arg(long)]
    pub llm: bool,
}

impl CheckCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing check command");

        let prompts = PromptSet::load(&config.workspace)?;
        prompts.ensure_complete()?;
        println!("prompts: ok");

        let store = connect(&config.store).await?;
        store.ping().await?;
        println!("store: ok ({})", store.backend_name());

        let registry = store.table_registry();
        println!(
            "tables: {} (metadata: {})",
            registry.tables().join(", "),
            registry.metadata_table()
        );

        if self.embed {
            let embedder = create_provider(&config.embedding, config.embedding_endpoint())?;
            let vector = embedder.embed("gamefi").await?;
            println!(
                "embedding: ok ({} {}, {} dims)",
                embedder.provider_name(),
                embedder.model_name(),
                vector.len()
            );
        }

        if self.llm {
            let orchestrator = Orchestrator::from_config(config).await?;
            let question = Question::new("Reply with the single word OK.", &config.model);
            let reply = orchestrator.ask_direct(&question).await?;
            println!("llm: ok ({} via {}): {}", config.model, config.provider, reply);
        }

        Ok(())
    }
}

//! GameFi Orchestrator CLI
//!
//! Main entry point for the `gamefi` command-line tool.
//! Answers analytics questions over the GameFi database through the
//! decompose, retrieve, verify and synthesize pipeline.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, CheckCommand, SanitizeCommand, SearchCommand, SqlCommand};
use gamefi_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// GameFi Orchestrator - question answering over GameFi analytics data
#[derive(Parser, Debug)]
#[command(name = "gamefi")]
#[command(about = "Question answering over GameFi analytics data", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "GAMEFI_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "GAMEFI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider
    #[arg(short, long, global = true, env = "GAMEFI_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "GAMEFI_MODEL")]
    model: Option<String>,

    /// Analytics database URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question with the full pipeline
    Ask(AskCommand),

    /// Similarity search over the document table
    Search(SearchCommand),

    /// Generate and run a read-only query for a question
    Sql(SqlCommand),

    /// Check a query against the SQL gate
    Sanitize(SanitizeCommand),

    /// Check configuration, prompts and connectivity
    Check(CheckCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Search(_) => "search",
            Commands::Sql(_) => "sql",
            Commands::Sanitize(_) => "sanitize",
            Commands::Check(_) => "check",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, then the config file, then the environment
    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.database_url,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("GameFi orchestrator starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);
    tracing::debug!("Store: {}", config.store.backend);

    config.validate()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Sql(cmd) => cmd.execute(&config).await,
        Commands::Sanitize(cmd) => cmd.execute(),
        Commands::Check(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

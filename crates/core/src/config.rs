//! Configuration management for the GameFi orchestrator.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.gamefi/config.yaml` or `GAMEFI_CONFIG`)
//! - Environment variables
//! - Command-line flags (via [`AppConfig::with_overrides`])
//!
//! The configuration is workspace-centric, with prompt overrides and config
//! stored in `.gamefi/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const WORKSPACE_DIR: &str = ".gamefi";

/// Tables searched by the default data source, in search order.
pub const DEFAULT_TABLES: [&str; 13] = [
    "collection",
    "collection_dynamic",
    "nft_listings",
    "nft_ownership",
    "nft_offers",
    "erc20_transfers",
    "fee",
    "nft",
    "contract",
    "payment_tokens",
    "nft_dynamic",
    "token_price",
    "nft_events",
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .gamefi/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Chat provider (currently "ollama")
    pub provider: String,

    /// Chat endpoint base URL
    pub endpoint: String,

    /// Default chat model identifier
    pub model: String,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub embedding: EmbeddingSettings,

    pub store: StoreSettings,

    pub agent: AgentSettings,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// "ollama" or "mock"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    /// Defaults to the chat endpoint when unset
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
        }
    }
}

/// Relational/vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// "postgres" or "sqlite"
    pub backend: String,

    /// Connection URL (postgres) or file path; ":memory:" for in-memory sqlite
    pub url: String,

    /// Table registry searched on the default path
    pub tables: Vec<String>,

    /// Table holding collection metadata for the sql path
    pub metadata_table: String,

    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "postgres".to_string(),
            url: "postgres://localhost/gamefi".to_string(),
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
            metadata_table: "collection".to_string(),
            max_connections: 5,
        }
    }
}

/// Orchestration tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    /// Default top-K per similarity search
    pub search_limit: usize,

    /// Upper bound on sub-questions kept from a decomposition
    pub max_sub_questions: usize,

    /// Sub-questions answered in parallel
    pub max_concurrency: usize,

    /// Hallucination checks before moving on
    pub hallucination_checks: usize,

    /// Deadline for a single model or store call
    pub call_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            search_limit: 5,
            max_sub_questions: 3,
            max_concurrency: 3,
            hallucination_checks: 2,
            call_timeout_secs: 120,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    embedding: Option<EmbeddingSection>,
    store: Option<StoreSection>,
    agent: Option<AgentSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingSection {
    provider: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSection {
    backend: Option<String>,
    url: Option<String>,
    tables: Option<Vec<String>>,
    metadata_table: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentSection {
    search_limit: Option<usize>,
    max_sub_questions: Option<usize>,
    max_concurrency: Option<usize>,
    hallucination_checks: Option<usize>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            log_level: None,
            verbose: false,
            no_color: false,
            embedding: EmbeddingSettings::default(),
            store: StoreSettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `GAMEFI_WORKSPACE`: Override workspace path
    /// - `GAMEFI_CONFIG`: Path to config file
    /// - `GAMEFI_PROVIDER`, `GAMEFI_MODEL`: Chat provider and model
    /// - `OLLAMA_URL`: Chat endpoint
    /// - `GAMEFI_EMBEDDING_PROVIDER`, `GAMEFI_EMBEDDING_MODEL`
    /// - `GAMEFI_STORE`: Store backend
    /// - `DATABASE_URL`, or `TIMESCALE_ADDRESS`/`TIMESCALE_USER`/`TIMESCALE_PASSWORD`/`TIMESCALE_DATABASE`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use gamefi_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Model: {}", config.model);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with a workspace and config file given on
    /// the command line taking the place of `GAMEFI_WORKSPACE`/`GAMEFI_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        match workspace {
            Some(workspace) => config.workspace = workspace,
            None => {
                if let Ok(workspace) = std::env::var("GAMEFI_WORKSPACE") {
                    config.workspace = PathBuf::from(workspace);
                }
            }
        }

        match config_file {
            Some(config_file) => config.config_file = Some(config_file),
            None => {
                if let Ok(config_file) = std::env::var("GAMEFI_CONFIG") {
                    config.config_file = Some(PathBuf::from(config_file));
                }
            }
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.merge_file(file))
    }

    fn merge_file(&self, file: ConfigFile) -> Self {
        let mut result = self.clone();

        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(endpoint) = llm.endpoint {
                result.endpoint = endpoint;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
        }

        if let Some(embedding) = file.embedding {
            if let Some(provider) = embedding.provider {
                result.embedding.provider = provider;
            }
            if let Some(model) = embedding.model {
                result.embedding.model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                result.embedding.dimensions = dimensions;
            }
            if embedding.endpoint.is_some() {
                result.embedding.endpoint = embedding.endpoint;
            }
        }

        if let Some(store) = file.store {
            if let Some(backend) = store.backend {
                result.store.backend = backend;
            }
            if let Some(url) = store.url {
                result.store.url = url;
            }
            if let Some(tables) = store.tables {
                result.store.tables = tables;
            }
            if let Some(metadata_table) = store.metadata_table {
                result.store.metadata_table = metadata_table;
            }
            if let Some(max_connections) = store.max_connections {
                result.store.max_connections = max_connections;
            }
        }

        if let Some(agent) = file.agent {
            if let Some(v) = agent.search_limit {
                result.agent.search_limit = v;
            }
            if let Some(v) = agent.max_sub_questions {
                result.agent.max_sub_questions = v;
            }
            if let Some(v) = agent.max_concurrency {
                result.agent.max_concurrency = v;
            }
            if let Some(v) = agent.hallucination_checks {
                result.agent.hallucination_checks = v;
            }
            if let Some(v) = agent.call_timeout_secs {
                result.agent.call_timeout_secs = v;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        result
    }

    /// Environment variables override the YAML config.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("GAMEFI_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(model) = std::env::var("GAMEFI_MODEL") {
            self.model = model;
        }
        if let Ok(endpoint) = std::env::var("OLLAMA_URL") {
            self.endpoint = endpoint;
        }
        if let Ok(provider) = std::env::var("GAMEFI_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("GAMEFI_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(backend) = std::env::var("GAMEFI_STORE") {
            self.store.backend = backend;
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.store.url = url;
        } else if let Some(url) = timescale_url_from_env() {
            self.store.url = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        database_url: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(url) = database_url {
            self.store.url = url;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .gamefi directory.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace.join(WORKSPACE_DIR)
    }

    /// Endpoint used by the embedding provider.
    pub fn embedding_endpoint(&self) -> &str {
        self.embedding.endpoint.as_deref().unwrap_or(&self.endpoint)
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        let known_embedders = ["ollama", "mock"];
        if !known_embedders.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                known_embedders.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        let known_backends = ["postgres", "sqlite"];
        if !known_backends.contains(&self.store.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown store backend: {}. Supported: {}",
                self.store.backend,
                known_backends.join(", ")
            )));
        }

        if self.store.url.trim().is_empty() {
            return Err(AppError::Config("Store URL is empty".to_string()));
        }

        if self.store.metadata_table.trim().is_empty() {
            return Err(AppError::Config("Metadata table is empty".to_string()));
        }

        if self.agent.search_limit == 0 {
            return Err(AppError::Config(
                "agent.searchLimit must be greater than zero".to_string(),
            ));
        }
        if self.agent.max_sub_questions == 0 {
            return Err(AppError::Config(
                "agent.maxSubQuestions must be greater than zero".to_string(),
            ));
        }
        if self.agent.max_concurrency == 0 {
            return Err(AppError::Config(
                "agent.maxConcurrency must be greater than zero".to_string(),
            ));
        }
        if self.agent.call_timeout_secs == 0 {
            return Err(AppError::Config(
                "agent.callTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Compose a postgres URL from the `TIMESCALE_*` variables, if all are set.
fn timescale_url_from_env() -> Option<String> {
    let address = std::env::var("TIMESCALE_ADDRESS").ok()?;
    let user = std::env::var("TIMESCALE_USER").ok()?;
    let password = std::env::var("TIMESCALE_PASSWORD").ok()?;
    let database = std::env::var("TIMESCALE_DATABASE").ok()?;
    match compose_postgres_url(&address, &user, &password, &database) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("Ignoring TIMESCALE_* settings: {}", e);
            None
        }
    }
}

/// Credentials are percent-encoded, so any password survives the round trip
/// through the connection URL.
fn compose_postgres_url(
    address: &str,
    user: &str,
    password: &str,
    database: &str,
) -> AppResult<String> {
    let invalid = |what: &str| AppError::Config(format!("Invalid database {}", what));

    let mut url = Url::parse(&format!("postgres://{}", address))
        .map_err(|e| AppError::Config(format!("Invalid database address '{}': {}", address, e)))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("address"));
    }
    url.set_username(user).map_err(|_| invalid("user"))?;
    url.set_password(Some(password)).map_err(|_| invalid("password"))?;
    url.set_path(&format!("/{}", database));
    Ok(url.to_string())
}

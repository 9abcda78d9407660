//! Orchestration entry point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gamefi_core::{AgentSettings, AppConfig, AppError, AppResult};
use gamefi_knowledge::{EmbeddingProvider, Sanitizer, SanitizerRules, Store};
use gamefi_llm::LlmClient;
use gamefi_prompt::{stages, PromptSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::classifier::Classifier;
use crate::coordinator::Coordinator;
use crate::decomposer::Decomposer;
use crate::gateway::{vars, Gateway};
use crate::router::Router;
use crate::runtime::RunContext;
use crate::synthesizer::Synthesizer;
use crate::types::{OrchestrationResult, Question};
use crate::verifier::Verifier;
use crate::worker::Pipeline;

/// Answers questions end to end.
pub struct Orchestrator {
    gateway: Arc<Gateway>,
    decomposer: Decomposer,
    coordinator: Coordinator,
    synthesizer: Synthesizer,
    router: Arc<Router>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn Store>,
    settings: AgentSettings,
}

impl Orchestrator {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompts: PromptSet,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn Store>,
        sanitizer: Sanitizer,
        settings: AgentSettings,
    ) -> AppResult<Self> {
        prompts.ensure_complete()?;

        let gateway = Arc::new(Gateway::new(client, Arc::new(prompts)));
        let router = Arc::new(Router::new(
            Arc::clone(&gateway),
            Arc::clone(&embedder),
            Arc::clone(&store),
            Arc::new(sanitizer),
        ));
        let pipeline = Pipeline::new(
            Classifier::new(Arc::clone(&gateway)),
            Arc::clone(&router),
            Verifier::new(
                Arc::clone(&gateway),
                Arc::clone(&router),
                settings.hallucination_checks,
            ),
        );

        Ok(Self {
            decomposer: Decomposer::new(Arc::clone(&gateway), settings.max_sub_questions),
            coordinator: Coordinator::new(Arc::new(pipeline), settings.max_concurrency),
            synthesizer: Synthesizer::new(Arc::clone(&gateway)),
            gateway,
            router,
            embedder,
            store,
            settings,
        })
    }

    /// Build every collaborator from configuration.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = gamefi_llm::create_client(&config.provider, Some(&config.endpoint))?;
        let prompts = PromptSet::load(&config.workspace)?;
        let embedder =
            gamefi_knowledge::create_provider(&config.embedding, config.embedding_endpoint())?;
        let store = gamefi_knowledge::connect(&config.store).await?;
        let sanitizer = Sanitizer::new(SanitizerRules::default())?;

        info!(
            provider = client.provider_name(),
            embedder = embedder.provider_name(),
            store = store.backend_name(),
            "Orchestrator ready"
        );
        Self::new(client, prompts, embedder, store, sanitizer, config.agent.clone())
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// A run context for `question` with a fresh cancellation token.
    pub fn context(&self, question: &Question) -> RunContext {
        self.context_with(question, CancellationToken::new())
    }

    fn context_with(&self, question: &Question, cancel: CancellationToken) -> RunContext {
        RunContext::new(
            question.model.clone(),
            question.search_limit.unwrap_or(self.settings.search_limit),
            Duration::from_secs(self.settings.call_timeout_secs),
            cancel,
        )
    }

    /// Answer a question through the full pipeline.
    pub async fn run(&self, question: &Question) -> AppResult<OrchestrationResult> {
        self.run_with_cancellation(question, CancellationToken::new())
            .await
    }

    /// [`Orchestrator::run`], aborting when `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        question: &Question,
        cancel: CancellationToken,
    ) -> AppResult<OrchestrationResult> {
        validate(question)?;
        let ctx = self.context_with(question, cancel);
        let span = info_span!(
            "orchestration",
            run_id = %ctx.run_id(),
            conversation_id = question.conversation_id.as_deref().unwrap_or("-"),
        );
        self.orchestrate(&ctx, question).instrument(span).await
    }

    async fn orchestrate(
        &self,
        ctx: &RunContext,
        question: &Question,
    ) -> AppResult<OrchestrationResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(model = ctx.model(), limit = ctx.search_limit(), "Starting orchestration");

        let mut sub_questions = self.decomposer.decompose(ctx, &question.input).await?;
        if sub_questions.is_empty() {
            warn!("No sub-questions parsed, answering the question as a whole");
            sub_questions.push(question.input.clone());
        }

        let sub_answers = self.coordinator.answer_all(ctx, &sub_questions).await;
        if ctx.is_cancelled() {
            return Err(AppError::Cancelled("run cancelled before synthesis".to_string()));
        }

        let answer = self
            .synthesizer
            .synthesize(ctx, &question.input, &sub_answers)
            .await?;

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(
            sub_questions = sub_answers.len(),
            answered = sub_answers.iter().filter(|a| a.is_answered()).count(),
            elapsed_ms,
            "Orchestration complete"
        );

        Ok(OrchestrationResult {
            run_id: ctx.run_id(),
            answer,
            sub_answers,
            started_at,
            elapsed_ms,
        })
    }

    /// One model call without decomposition or retrieval.
    pub async fn ask_direct(&self, question: &Question) -> AppResult<String> {
        validate(question)?;
        let ctx = self.context(question);
        let span = info_span!("orchestration", run_id = %ctx.run_id(), direct = true);
        self.gateway
            .ask(&ctx, stages::DIRECT, vars([("question", question.input.as_str())]))
            .instrument(span)
            .await
    }
}

fn validate(question: &Question) -> AppResult<()> {
    if question.input.trim().is_empty() {
        return Err(AppError::Config("Question is empty".to_string()));
    }
    if question.model.trim().is_empty() {
        return Err(AppError::Config("No model specified".to_string()));
    }
    if question.search_limit == Some(0) {
        return Err(AppError::Config("Search limit must be at least 1".to_string()));
    }
    Ok(())
}

//! Data source routing.
//!
//! Every requested source is fetched independently in selection order.
//! A failing source becomes a warning on the context and the others still
//! contribute; only when every source fails does retrieval itself fail.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use gamefi_knowledge::{
    search_documents, Document, EmbeddingProvider, RetrievedContext, Row, SafeQuery, Sanitizer,
    Store,
};
use gamefi_prompt::stages;
use tracing::{debug, info, warn};

use crate::gateway::{vars, Gateway};
use crate::runtime::RunContext;
use crate::types::{Source, SourceSelection};

/// Table name the rows of a generated query are grouped under.
pub const SQL_RESULT_TABLE: &str = "sql_result";

/// Outcome of routing a sub-question.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Context gathered from the requested sources
    Context(RetrievedContext),
    /// `NA` was selected; the model's direct answer
    Direct(String),
}

/// A generated query and the rows it returned.
#[derive(Debug, Clone)]
pub struct SqlAnswer {
    pub query: SafeQuery,
    pub rows: Vec<Row>,
}

/// Retrieves context for a sub-question from the store.
pub struct Router {
    gateway: Arc<Gateway>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn Store>,
    sanitizer: Arc<Sanitizer>,
}

impl Router {
    pub fn new(
        gateway: Arc<Gateway>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn Store>,
        sanitizer: Arc<Sanitizer>,
    ) -> Self {
        Self {
            gateway,
            embedder,
            store,
            sanitizer,
        }
    }

    /// Gather context for `question` from each source in `selection`.
    pub async fn retrieve(
        &self,
        ctx: &RunContext,
        question: &str,
        selection: &SourceSelection,
    ) -> AppResult<Retrieval> {
        if selection.is_na() {
            let answer = self
                .gateway
                .ask(ctx, stages::DIRECT, vars([("question", question)]))
                .await?;
            return Ok(Retrieval::Direct(answer));
        }

        let embedding = self.embed(ctx, question).await?;

        let mut context = RetrievedContext::new();
        let mut failures = 0;
        for &source in selection.sources() {
            match self.fetch(ctx, source, question, &embedding).await {
                Ok(fetched) => context.merge(fetched),
                Err(e @ AppError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!(%source, error = %e, "Data source failed");
                    context.warn(format!("{} source failed: {}", source, e));
                    failures += 1;
                }
            }
        }

        if failures == selection.sources().len() {
            return Err(AppError::Retrieval(context.warnings.join("; ")));
        }

        info!(
            sources = %selection,
            rows = context.row_count(),
            documents = context.documents.len(),
            warnings = context.warnings.len(),
            "Retrieved context"
        );
        Ok(Retrieval::Context(context))
    }

    /// Generate a query for `question` and pass it through the gate.
    ///
    /// The nearest metadata rows and the live schema are given to the model;
    /// if either lookup fails the prompt is built without it.
    pub async fn generate_sql(&self, ctx: &RunContext, question: &str) -> AppResult<SafeQuery> {
        let embedding = self.embed(ctx, question).await?;
        self.generate_sql_with(ctx, question, &embedding).await
    }

    /// Execute a gate-passed query.
    pub async fn run_sql(&self, ctx: &RunContext, query: &SafeQuery) -> AppResult<Vec<Row>> {
        let rows = ctx
            .guard("sql execution", self.store.execute_read_only(query))
            .await?;
        debug!(rows = rows.len(), query = %query, "Executed generated query");
        Ok(rows)
    }

    /// [`Router::generate_sql`] followed by [`Router::run_sql`].
    pub async fn answer_sql(&self, ctx: &RunContext, question: &str) -> AppResult<SqlAnswer> {
        let query = self.generate_sql(ctx, question).await?;
        let rows = self.run_sql(ctx, &query).await?;
        Ok(SqlAnswer { query, rows })
    }

    /// Nearest documents for `text`, at most the run's search limit.
    pub async fn search_documents(&self, ctx: &RunContext, text: &str) -> AppResult<Vec<Document>> {
        ctx.guard(
            "document search",
            search_documents(
                self.embedder.as_ref(),
                self.store.as_ref(),
                text,
                ctx.search_limit(),
            ),
        )
        .await
    }

    async fn embed(&self, ctx: &RunContext, text: &str) -> AppResult<Vec<f32>> {
        ctx.guard("embedding", self.embedder.embed(text)).await
    }

    async fn fetch(
        &self,
        ctx: &RunContext,
        source: Source,
        question: &str,
        embedding: &[f32],
    ) -> AppResult<RetrievedContext> {
        let mut context = RetrievedContext::new();
        match source {
            Source::Documents => {
                let documents = self.similar_documents(ctx, embedding).await?;
                context.add_documents(documents);
            }
            Source::Sql => {
                let query = self.generate_sql_with(ctx, question, embedding).await?;
                let rows = self.run_sql(ctx, &query).await?;
                context.add_rows(SQL_RESULT_TABLE, rows);
            }
            Source::Default => self.search_everything(ctx, embedding, &mut context).await?,
            Source::Na => {
                return Err(AppError::Other(
                    "NA cannot be combined with other data sources".to_string(),
                ))
            }
        }
        Ok(context)
    }

    async fn similar_documents(
        &self,
        ctx: &RunContext,
        embedding: &[f32],
    ) -> AppResult<Vec<gamefi_knowledge::Document>> {
        ctx.guard(
            "document search",
            self.store.similar_documents(embedding, ctx.search_limit()),
        )
        .await
    }

    /// Every registered table, then the documents table. Individual lookups
    /// that fail are recorded as warnings.
    async fn search_everything(
        &self,
        ctx: &RunContext,
        embedding: &[f32],
        context: &mut RetrievedContext,
    ) -> AppResult<()> {
        let registry = self.store.table_registry();
        let mut attempted = 0;
        let mut failed = Vec::new();

        for table in registry.tables() {
            attempted += 1;
            let search = self.store.similar_rows(table, embedding, ctx.search_limit());
            match ctx.guard("table search", search).await {
                Ok(rows) => context.add_rows(table, rows),
                Err(e @ AppError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    debug!(table = %table, error = %e, "Table search failed");
                    failed.push(format!("{}: {}", table, e));
                }
            }
        }

        attempted += 1;
        match self.similar_documents(ctx, embedding).await {
            Ok(documents) => context.add_documents(documents),
            Err(e @ AppError::Cancelled(_)) => return Err(e),
            Err(e) => failed.push(format!("documents: {}", e)),
        }

        if failed.len() == attempted {
            return Err(AppError::Retrieval(format!(
                "every lookup failed ({})",
                failed.join("; ")
            )));
        }
        for failure in failed {
            context.warn(format!("default source skipped {}", failure));
        }
        Ok(())
    }

    async fn generate_sql_with(
        &self,
        ctx: &RunContext,
        question: &str,
        embedding: &[f32],
    ) -> AppResult<SafeQuery> {
        let registry = self.store.table_registry();
        let metadata_table = registry.metadata_table();

        let metadata = match ctx
            .guard(
                "metadata search",
                self.store
                    .similar_rows(metadata_table, embedding, ctx.search_limit()),
            )
            .await
        {
            Ok(rows) => render_metadata(&rows),
            Err(e @ AppError::Cancelled(_)) => return Err(e),
            Err(e) => {
                warn!(table = metadata_table, error = %e, "Metadata lookup failed");
                String::new()
            }
        };

        let schema = match ctx.guard("schema", self.store.describe_schema()).await {
            Ok(schema) => schema,
            Err(e @ AppError::Cancelled(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Schema description failed");
                String::new()
            }
        };

        let reply = self
            .gateway
            .ask(
                ctx,
                stages::SQL,
                vars([
                    ("metadata", metadata.as_str()),
                    ("schema", schema.as_str()),
                    ("question", question),
                ]),
            )
            .await?;

        let query = self.sanitizer.sanitize(&reply)?;
        info!(query = %query, "Generated query passed the gate");
        Ok(query)
    }
}

/// One JSON object per line.
fn render_metadata(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| serde_json::Value::Object(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

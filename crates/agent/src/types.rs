//! Orchestration data types.

use chrono::{DateTime, Utc};
use gamefi_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One incoming question. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// The user's question text
    pub input: String,

    /// Chat model used for every call of the run
    pub model: String,

    /// Top-K per similarity search; the configured default when unset
    #[serde(rename = "searchLimit", default, skip_serializing_if = "Option::is_none")]
    pub search_limit: Option<usize>,

    /// Conversation the question belongs to, for log correlation
    #[serde(rename = "conversationId", default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Question {
    pub fn new(input: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            model: model.into(),
            search_limit: None,
            conversation_id: None,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = Some(limit);
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// A retrieval path for a sub-question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Generated read-only query against the store
    Sql,
    /// Similarity search over the documents table
    Documents,
    /// Similarity search over every registered table plus documents
    Default,
    /// No retrieval; the model answers directly
    #[serde(rename = "NA")]
    Na,
}

impl Source {
    /// Parse a classifier token. Case-sensitive, as the vocabulary is fixed.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "sql" => Some(Source::Sql),
            "documents" => Some(Source::Documents),
            "default" => Some(Source::Default),
            "NA" => Some(Source::Na),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Sql => "sql",
            Source::Documents => "documents",
            Source::Default => "default",
            Source::Na => "NA",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, deduplicated set of sources. `NA` is always alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSelection(Vec<Source>);

impl SourceSelection {
    /// Build a selection, dropping repeats and keeping first-seen order.
    pub fn new(sources: impl IntoIterator<Item = Source>) -> AppResult<Self> {
        let mut selected = Vec::new();
        for source in sources {
            if !selected.contains(&source) {
                selected.push(source);
            }
        }

        if selected.is_empty() {
            return Err(AppError::MalformedReply("No data sources selected".to_string()));
        }
        if selected.len() > 1 && selected.contains(&Source::Na) {
            return Err(AppError::MalformedReply(
                "NA cannot be combined with other data sources".to_string(),
            ));
        }
        Ok(Self(selected))
    }

    /// The broadest selection, used for fallback retrieval.
    pub fn default_only() -> Self {
        Self(vec![Source::Default])
    }

    pub fn na() -> Self {
        Self(vec![Source::Na])
    }

    pub fn is_na(&self) -> bool {
        self.0 == [Source::Na]
    }

    pub fn sources(&self) -> &[Source] {
        &self.0
    }
}

impl fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Source::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// How a sub-question ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum SubOutcome {
    Answered(String),
    Failed(String),
}

/// A sub-question with its final answer or the error that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubAnswer {
    #[serde(rename = "subQuestion")]
    pub sub_question: String,
    pub outcome: SubOutcome,
}

impl SubAnswer {
    pub fn answered(sub_question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            sub_question: sub_question.into(),
            outcome: SubOutcome::Answered(answer.into()),
        }
    }

    pub fn failed(sub_question: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            sub_question: sub_question.into(),
            outcome: SubOutcome::Failed(error.to_string()),
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self.outcome, SubOutcome::Answered(_))
    }
}

impl fmt::Display for SubAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SubOutcome::Answered(answer) => {
                write!(f, "Sub-question: {}\nAnswer: {}", self.sub_question, answer)
            }
            SubOutcome::Failed(error) => write!(
                f,
                "Sub-question: {}\nError answering sub-question: {}",
                self.sub_question, error
            ),
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    #[serde(rename = "runId")]
    pub run_id: Uuid,

    /// The synthesized final answer
    pub answer: String,

    /// Sub-answers in dispatch order
    #[serde(rename = "subAnswers")]
    pub sub_answers: Vec<SubAnswer>,

    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

//! Agentic query orchestration for the GameFi analytics database.
//!
//! A question is decomposed into sub-questions, each sub-question is
//! classified, routed to its data sources and answered under a bounded
//! verification loop, and the verified sub-answers are synthesized into one
//! final answer. [`Orchestrator`] is the entry point.

pub mod classifier;
pub mod coordinator;
pub mod decomposer;
pub mod gateway;
pub mod orchestrator;
pub mod router;
pub mod runtime;
pub mod synthesizer;
pub mod types;
pub mod verifier;
pub mod worker;

#[cfg(test)]
mod tests;

pub use classifier::{parse_sources, Classifier};
pub use coordinator::Coordinator;
pub use decomposer::{parse_sub_questions, Decomposer};
pub use gateway::Gateway;
pub use orchestrator::Orchestrator;
pub use router::{Retrieval, Router, SqlAnswer};
pub use runtime::RunContext;
pub use synthesizer::{format_sub_answers, Synthesizer};
pub use types::{OrchestrationResult, Question, Source, SourceSelection, SubAnswer, SubOutcome};
pub use verifier::{parse_verdict, Check, VerifiedAnswer, Verdict, Verifier};
pub use worker::Pipeline;

//! Per-sub-question pipeline: classify, retrieve, verify.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use tracing::{info, info_span, warn, Instrument};

use crate::classifier::Classifier;
use crate::router::{Retrieval, Router};
use crate::runtime::RunContext;
use crate::types::{SourceSelection, SubAnswer};
use crate::verifier::Verifier;

/// The stages one worker runs, shared by all workers of a run.
pub struct Pipeline {
    classifier: Classifier,
    router: Arc<Router>,
    verifier: Verifier,
}

impl Pipeline {
    pub fn new(classifier: Classifier, router: Arc<Router>, verifier: Verifier) -> Self {
        Self {
            classifier,
            router,
            verifier,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Answer one sub-question. Never fails: errors become a failed
    /// [`SubAnswer`].
    pub async fn answer(&self, ctx: &RunContext, index: usize, sub_question: &str) -> SubAnswer {
        let span = info_span!("sub_question", index, question = %sub_question);
        async {
            match self.try_answer(ctx, sub_question).await {
                Ok(answer) => {
                    info!("Sub-question answered");
                    SubAnswer::answered(sub_question, answer)
                }
                Err(e) => {
                    warn!(error = %e, kind = ?e.kind(), "Sub-question failed");
                    SubAnswer::failed(sub_question, e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_answer(&self, ctx: &RunContext, sub_question: &str) -> AppResult<String> {
        let selection = match self.classifier.classify(ctx, sub_question).await {
            Ok(selection) => selection,
            Err(AppError::MalformedReply(reason)) => {
                warn!(%reason, "Unusable classification, falling back to default sources");
                SourceSelection::default_only()
            }
            Err(e) => return Err(e),
        };

        let context = match self.router.retrieve(ctx, sub_question, &selection).await? {
            Retrieval::Direct(answer) => return Ok(answer),
            Retrieval::Context(context) => context,
        };
        for warning in &context.warnings {
            warn!(%warning, "Partial retrieval");
        }

        let verified = self
            .verifier
            .verify_and_answer(ctx, sub_question, &context.render())
            .await?;
        Ok(verified.answer)
    }
}

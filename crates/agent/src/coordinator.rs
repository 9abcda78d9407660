//! Concurrent fan-out of sub-questions.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::runtime::RunContext;
use crate::types::SubAnswer;
use crate::worker::Pipeline;

/// Runs one worker per sub-question, at most `max_concurrency` at a time.
pub struct Coordinator {
    pipeline: Arc<Pipeline>,
    max_concurrency: usize,
}

impl Coordinator {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrency: usize) -> Self {
        Self {
            pipeline,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Answer every sub-question.
    ///
    /// Returns exactly one entry per sub-question, in dispatch order. A worker
    /// that fails or panics contributes a failed entry.
    pub async fn answer_all(&self, ctx: &RunContext, sub_questions: &[String]) -> Vec<SubAnswer> {
        info!(
            count = sub_questions.len(),
            max_concurrency = self.max_concurrency,
            "Dispatching sub-questions"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (index, sub_question) in sub_questions.iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let ctx = ctx.clone();
            let sub_question = sub_question.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, SubAnswer::failed(sub_question, e)),
                };

                let work = AssertUnwindSafe(pipeline.answer(&ctx, index, &sub_question));
                let answer = match work.catch_unwind().await {
                    Ok(answer) => answer,
                    Err(_) => SubAnswer::failed(&sub_question, "worker panicked"),
                };
                (index, answer)
            });
        }

        let mut slots: Vec<Option<SubAnswer>> = vec![None; sub_questions.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, answer)) => {
                    debug!(index, answered = answer.is_answered(), "Worker finished");
                    slots[index] = Some(answer);
                }
                Err(e) => warn!("Task join error: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(sub_questions)
            .map(|(slot, sub_question)| {
                slot.unwrap_or_else(|| SubAnswer::failed(sub_question.as_str(), "worker did not finish"))
            })
            .collect()
    }
}

//! Answer drafting under a bounded verification loop.
//!
//! ```text
//! Draft -> HallucinationCheck(1) -FAIL-> Redraft -> HallucinationCheck(2) -FAIL-> Redraft
//!              |PASS                                     |PASS                      |
//!              +--------------------> CorrectnessCheck <-+--------------------------+
//!                                        |PASS         |FAIL
//!                                       Done     Fallback (default sources) -> Done
//! ```
//!
//! A verdict reply outside `YES`/`NO`, or a check call that errors, counts as
//! FAIL. The loop ends after at most `hallucination_checks` redrafts and one
//! fallback, and always yields the last draft.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use gamefi_prompt::stages;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::gateway::{vars, Gateway};
use crate::router::{Retrieval, Router};
use crate::runtime::RunContext;
use crate::types::SourceSelection;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
}

/// The two model-judged checks, each with its own reply polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// "NO" means no hallucination was found
    Hallucination,
    /// "YES" means the answer is correct
    Correctness,
}

impl Check {
    fn stage(self) -> &'static str {
        match self {
            Check::Hallucination => stages::HALLUCINATION,
            Check::Correctness => stages::CORRECTNESS,
        }
    }

    /// Map a single-token reply onto a verdict.
    pub fn verdict(self, reply: &str) -> AppResult<Verdict> {
        let yes = parse_verdict(reply)?;
        let pass = match self {
            Check::Hallucination => !yes,
            Check::Correctness => yes,
        };
        Ok(if pass { Verdict::Pass } else { Verdict::Fail })
    }
}

/// Strict `YES`/`NO` parser: case, surrounding whitespace, quotes and one
/// trailing period are tolerated; anything else is malformed.
pub fn parse_verdict(reply: &str) -> AppResult<bool> {
    let token = reply.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let token = token.strip_suffix('.').unwrap_or(token).trim();

    if token.eq_ignore_ascii_case("YES") {
        Ok(true)
    } else if token.eq_ignore_ascii_case("NO") {
        Ok(false)
    } else {
        Err(AppError::MalformedReply(format!(
            "Expected YES or NO, got {:?}",
            reply
        )))
    }
}

/// The final draft and how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedAnswer {
    pub answer: String,

    /// Drafts generated, including the first
    pub drafts: usize,

    /// Hallucination checks run
    pub hallucination_checks: usize,

    /// Whether the last hallucination check passed
    pub grounded: bool,

    pub correctness: Verdict,

    /// Whether the default-source fallback produced the answer
    pub fell_back: bool,
}

#[derive(Debug)]
enum Stage {
    Draft,
    HallucinationCheck,
    Redraft,
    CorrectnessCheck,
    Fallback,
    Done,
}

/// Drafts and checks answers for one sub-question.
pub struct Verifier {
    gateway: Arc<Gateway>,
    router: Arc<Router>,
    max_hallucination_checks: usize,
}

impl Verifier {
    pub fn new(gateway: Arc<Gateway>, router: Arc<Router>, max_hallucination_checks: usize) -> Self {
        Self {
            gateway,
            router,
            max_hallucination_checks,
        }
    }

    /// Draft an answer from `context` and verify it.
    ///
    /// Only a failure of the first draft (or cancellation) is an error; every
    /// later failure degrades to keeping the current draft.
    pub async fn verify_and_answer(
        &self,
        ctx: &RunContext,
        question: &str,
        context: &str,
    ) -> AppResult<VerifiedAnswer> {
        let mut context = context.to_string();
        let mut result = VerifiedAnswer {
            answer: String::new(),
            drafts: 0,
            hallucination_checks: 0,
            grounded: false,
            correctness: Verdict::Fail,
            fell_back: false,
        };

        let mut stage = Stage::Draft;
        loop {
            debug!(?stage, "Verifier stage");
            stage = match stage {
                Stage::Draft => {
                    result.answer = self.draft(ctx, question, &context).await?;
                    result.drafts += 1;
                    if self.max_hallucination_checks == 0 {
                        Stage::CorrectnessCheck
                    } else {
                        Stage::HallucinationCheck
                    }
                }

                Stage::HallucinationCheck => {
                    result.hallucination_checks += 1;
                    let verdict = self
                        .check(ctx, Check::Hallucination, question, &context, &result.answer)
                        .await?;
                    result.grounded = verdict == Verdict::Pass;
                    if result.grounded {
                        Stage::CorrectnessCheck
                    } else {
                        Stage::Redraft
                    }
                }

                Stage::Redraft => {
                    match self.draft(ctx, question, &context).await {
                        Ok(answer) => {
                            result.answer = answer;
                            result.drafts += 1;
                        }
                        Err(e @ AppError::Cancelled(_)) => return Err(e),
                        Err(e) => warn!(error = %e, "Redraft failed, keeping previous draft"),
                    }
                    if result.hallucination_checks < self.max_hallucination_checks {
                        Stage::HallucinationCheck
                    } else {
                        warn!("Hallucination checks exhausted, continuing with last draft");
                        Stage::CorrectnessCheck
                    }
                }

                Stage::CorrectnessCheck => {
                    result.correctness = self
                        .check(ctx, Check::Correctness, question, &context, &result.answer)
                        .await?;
                    match result.correctness {
                        Verdict::Pass => Stage::Done,
                        Verdict::Fail => Stage::Fallback,
                    }
                }

                Stage::Fallback => {
                    info!("Correctness check failed, retrying with default sources");
                    match self.fallback(ctx, question).await {
                        Ok((fallback_context, answer)) => {
                            context = fallback_context;
                            result.answer = answer;
                            result.drafts += 1;
                            result.fell_back = true;
                        }
                        Err(e @ AppError::Cancelled(_)) => return Err(e),
                        Err(e) => warn!(error = %e, "Fallback failed, keeping current draft"),
                    }
                    Stage::Done
                }

                Stage::Done => break,
            };
        }

        info!(
            drafts = result.drafts,
            hallucination_checks = result.hallucination_checks,
            grounded = result.grounded,
            fell_back = result.fell_back,
            "Verification finished"
        );
        Ok(result)
    }

    async fn draft(&self, ctx: &RunContext, question: &str, context: &str) -> AppResult<String> {
        self.gateway
            .ask(
                ctx,
                stages::ANSWER,
                vars([("context", context), ("question", question)]),
            )
            .await
    }

    /// Run a check; errors other than cancellation count as FAIL.
    async fn check(
        &self,
        ctx: &RunContext,
        check: Check,
        question: &str,
        context: &str,
        answer: &str,
    ) -> AppResult<Verdict> {
        let reply = self
            .gateway
            .ask(
                ctx,
                check.stage(),
                vars([("question", question), ("context", context), ("answer", answer)]),
            )
            .await;

        match reply.and_then(|reply| check.verdict(&reply)) {
            Ok(verdict) => {
                debug!(?check, ?verdict, "Check verdict");
                Ok(verdict)
            }
            Err(e @ AppError::Cancelled(_)) => Err(e),
            Err(e) => {
                warn!(?check, error = %e, "Check failed, treating as FAIL");
                Ok(Verdict::Fail)
            }
        }
    }

    async fn fallback(&self, ctx: &RunContext, question: &str) -> AppResult<(String, String)> {
        let context = match self
            .router
            .retrieve(ctx, question, &SourceSelection::default_only())
            .await?
        {
            Retrieval::Context(context) => context.render(),
            Retrieval::Direct(answer) => return Ok((String::new(), answer)),
        };
        let answer = self.draft(ctx, question, &context).await?;
        Ok((context, answer))
    }
}

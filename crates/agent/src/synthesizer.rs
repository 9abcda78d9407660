//! Final answer synthesis.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use gamefi_prompt::stages;
use tracing::info;

use crate::gateway::{vars, Gateway};
use crate::runtime::RunContext;
use crate::types::SubAnswer;

/// Label the synthesis reply may start with.
const RESPONSE_LABEL: &str = "RESPONSE:";

pub struct Synthesizer {
    gateway: Arc<Gateway>,
}

impl Synthesizer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Combine the sub-answers into one answer to `question`.
    pub async fn synthesize(
        &self,
        ctx: &RunContext,
        question: &str,
        sub_answers: &[SubAnswer],
    ) -> AppResult<String> {
        let block = format_sub_answers(sub_answers);
        let reply = self
            .gateway
            .ask(
                ctx,
                stages::SYNTHESIZE,
                vars([("question", question), ("answers", block.as_str())]),
            )
            .await?;

        let answer = strip_response_label(&reply);
        if answer.is_empty() {
            return Err(AppError::MalformedReply(
                "Synthesis reply has no answer after its label".to_string(),
            ));
        }
        info!(chars = answer.len(), "Synthesized final answer");
        Ok(answer.to_string())
    }
}

/// Numbered entries separated by `---` rules.
pub fn format_sub_answers(sub_answers: &[SubAnswer]) -> String {
    sub_answers
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {}\n", i + 1, entry))
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

fn strip_response_label(reply: &str) -> &str {
    let trimmed = reply.trim();
    match trimmed.get(..RESPONSE_LABEL.len()) {
        Some(head) if head.eq_ignore_ascii_case(RESPONSE_LABEL) => {
            trimmed[RESPONSE_LABEL.len()..].trim()
        }
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sub_answers() {
        let entries = vec![
            SubAnswer::answered("What is Axie?", "A pet battler."),
            SubAnswer::failed("Floor price?", "Store error: down"),
        ];
        assert_eq!(
            format_sub_answers(&entries),
            "1. Sub-question: What is Axie?\nAnswer: A pet battler.\n\
             \n---\n\n\
             2. Sub-question: Floor price?\nError answering sub-question: Store error: down\n"
        );
    }

    #[test]
    fn test_format_single_and_empty() {
        let entries = vec![SubAnswer::answered("q", "a")];
        assert_eq!(format_sub_answers(&entries), "1. Sub-question: q\nAnswer: a\n");
        assert_eq!(format_sub_answers(&[]), "");
    }

    #[test]
    fn test_strip_response_label() {
        assert_eq!(strip_response_label("RESPONSE: GameFi is..."), "GameFi is...");
        assert_eq!(strip_response_label("response:\nGameFi"), "GameFi");
        assert_eq!(strip_response_label("GameFi is..."), "GameFi is...");
        assert_eq!(strip_response_label("RESPONSE:"), "");
        assert_eq!(strip_response_label("é"), "é");
    }
}

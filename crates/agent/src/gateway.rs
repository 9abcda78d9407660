//! Model calls by pipeline stage.

use std::sync::Arc;

use gamefi_core::{AppError, AppResult};
use gamefi_llm::{ChatMessage, LlmClient, LlmRequest};
use gamefi_prompt::{stages, BuiltPrompt, PromptSet, PromptVars};
use tracing::debug;

use crate::runtime::RunContext;

/// Renders a stage's instruction and sends it to the model.
pub struct Gateway {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptSet>,
}

impl Gateway {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptSet>) -> Self {
        Self { client, prompts }
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Render `stage` with `vars`, call the model and return the trimmed reply.
    ///
    /// A blank reply is a [`AppError::MalformedReply`].
    pub async fn ask(&self, ctx: &RunContext, stage: &str, vars: PromptVars) -> AppResult<String> {
        let prompt = self.prompts.render(stage, vars)?;
        let request = request(ctx.model(), stage, prompt);

        debug!(stage, messages = ?request.messages, "Sending model request");
        let response = ctx.guard(stage, self.client.complete(&request)).await?;
        debug!(stage, reply = %response.content, "Model replied");

        let reply = response.content.trim();
        if reply.is_empty() {
            return Err(AppError::MalformedReply(format!("Empty reply for stage {}", stage)));
        }
        Ok(reply.to_string())
    }
}

/// Stages whose replies are parsed strictly run greedy, and the
/// single-token verdicts get a short output budget.
fn request(model: &str, stage: &str, prompt: BuiltPrompt) -> LlmRequest {
    let request = LlmRequest::new(model, messages(prompt));
    match stage {
        stages::HALLUCINATION | stages::CORRECTNESS => {
            request.with_temperature(0.0).with_max_tokens(8)
        }
        stages::CLASSIFY => request.with_temperature(0.0).with_max_tokens(16),
        stages::SQL | stages::DECOMPOSE => request.with_temperature(0.0),
        _ => request,
    }
}

fn messages(prompt: BuiltPrompt) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = prompt.system.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt.user));
    messages
}

/// Build template variables from pairs.
pub fn vars<const N: usize>(pairs: [(&str, &str); N]) -> PromptVars {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

//! Ollama chat provider implementation.
//!
//! Talks to the `/api/chat` endpoint, which replies with newline-delimited
//! JSON fragments. Fragments may be split across network reads, so bytes are
//! buffered until a full line is available.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::collections::VecDeque;

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::types::ChatMessage;
use futures::stream::BoxStream;
use futures::StreamExt;
use gamefi_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, PartialEq)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One NDJSON fragment of a chat reply.
#[derive(Debug, Deserialize)]
struct OllamaChatFragment {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaFragmentMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaFragmentMessage {
    #[serde(default)]
    content: String,
}

/// Ollama chat client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    ///
    /// Default URL: http://localhost:11434
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Convert LlmRequest to Ollama format.
    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaChatRequest {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            stream: true,
            options,
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Feed bytes and return every line completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Flush whatever is left once the stream ends.
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

struct LineState {
    inner: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Parse one fragment line. Lines that are not fragments yield `None`.
fn parse_fragment(line: &str) -> Option<LlmStreamChunk> {
    match serde_json::from_str::<OllamaChatFragment>(line) {
        Ok(fragment) => {
            let usage = if fragment.done {
                Some(LlmUsage::new(
                    fragment.prompt_eval_count.unwrap_or(0),
                    fragment.eval_count.unwrap_or(0),
                ))
            } else {
                None
            };
            Some(LlmStreamChunk {
                content: fragment.message.map(|m| m.content).unwrap_or_default(),
                model: fragment.model,
                done: fragment.done,
                usage,
            })
        }
        Err(e) => {
            tracing::warn!("Skipping unparseable chat fragment: {}", e);
            None
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let mut stream = self.stream(request).await?;

        let mut content = String::new();
        let mut model = request.model.clone();
        let mut usage = LlmUsage::default();
        let mut done = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            content.push_str(&chunk.content);
            if !chunk.model.is_empty() {
                model = chunk.model;
            }
            if let Some(u) = chunk.usage {
                usage = u;
            }
            if chunk.done {
                done = true;
                break;
            }
        }

        if content.trim().is_empty() {
            return Err(AppError::Llm(format!(
                "Ollama returned an empty reply for model {}",
                request.model
            )));
        }

        tracing::debug!(
            model = %model,
            completion_tokens = usage.completion_tokens,
            "Received completion from Ollama"
        );

        Ok(LlmResponse {
            content,
            model,
            usage,
            done,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, messages = request.messages.len(), "Sending chat request to Ollama");

        let ollama_request = self.to_ollama_request(request);
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let state = LineState {
            inner: response
                .bytes_stream()
                .map(|r| r.map(|b| b.to_vec()))
                .boxed(),
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let lines = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(line) = st.pending.pop_front() {
                    return Some((Ok(line), st));
                }
                if st.finished {
                    return None;
                }
                match st.inner.next().await {
                    Some(Ok(bytes)) => st.pending.extend(st.decoder.push(&bytes)),
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((Err(AppError::Llm(format!("Stream error: {}", e))), st));
                    }
                    None => {
                        st.finished = true;
                        if let Some(rest) = st.decoder.finish() {
                            st.pending.push_back(rest);
                        }
                    }
                }
            }
        });

        let chunks = lines.filter_map(|line: AppResult<String>| async move {
            match line {
                Ok(line) => parse_fragment(&line).map(Ok),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }
}

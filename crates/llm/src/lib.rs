//! LLM integration crate for the GameFi orchestrator.
//!
//! This crate provides a provider-agnostic chat abstraction. Every pipeline
//! stage talks to the model through [`LlmClient`], so stages can be exercised
//! against scripted fakes in tests.
//!
//! # Providers
//! - **Ollama**: Local chat runtime (default), streamed NDJSON over `/api/chat`
//!
//! # Example
//! ```no_run
//! use gamefi_llm::{ChatMessage, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("llama3", vec![ChatMessage::user("How many NFTs?")]);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
pub use types::{ChatMessage, ProviderType, Role};

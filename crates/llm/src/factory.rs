//! LLM provider factory.
//!
//! Creates chat clients from the configured provider name.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use crate::types::ProviderType;
use gamefi_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            tracing::debug!("Creating Ollama chat client at {}", base_url);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

//! Provider selection from configuration.

use defibot_config::AppConfig;
use defibot_core::provider::Provider;
use std::sync::Arc;
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Build the chat provider described by `[llm]`.
///
/// Every supported backend speaks the OpenAI wire format, so the provider
/// name only selects a default base URL when `api_url` is not set.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let llm = &config.llm;
    let base_url = llm
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&llm.provider));
    let api_key = llm.api_key.clone().unwrap_or_default();

    if api_key.is_empty() && !is_local(&base_url) {
        warn!(provider = %llm.provider, "No API key configured; requests will likely fail");
    }

    info!(
        provider = %llm.provider,
        base_url = %base_url,
        model = %llm.model,
        "Provider configured"
    );
    Arc::new(OpenAiCompatProvider::new(&llm.provider, base_url, api_key))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

fn is_local(base_url: &str) -> bool {
    base_url.contains("localhost") || base_url.contains("127.0.0.1")
}

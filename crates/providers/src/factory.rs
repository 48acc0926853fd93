//! Provider factory: builds the completion backend named by the config.
//!
//! Capability flags come from per-backend defaults, a small table of
//! well-known context windows, and finally the explicit overrides in
//! `[capabilities]`.

use std::sync::Arc;

use ragstream_config::{CapabilityOverrides, RagConfig};
use ragstream_core::provider::{ModelCapabilities, Provider};
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider described by `config`.
pub fn build_from_config(config: &RagConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    let capabilities = apply_overrides(
        default_capabilities(&config.provider, &config.model),
        &config.capabilities,
    );

    debug!(
        provider = %config.provider,
        base_url = %base_url,
        function_calling = capabilities.function_calling,
        optional_tool_streaming = capabilities.optional_tool_streaming,
        "Building completion provider"
    );

    Arc::new(
        OpenAiCompatProvider::new(&config.provider, base_url, api_key)
            .with_capabilities(capabilities),
    )
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

/// Capability defaults for a backend/model pair.
pub fn default_capabilities(provider_name: &str, model: &str) -> ModelCapabilities {
    ModelCapabilities {
        function_calling: true,
        // llama.cpp cannot stream with tool_choice = "auto"
        optional_tool_streaming: !matches!(provider_name, "llamacpp" | "llama.cpp"),
        context_size: known_context_size(model),
    }
}

/// Context windows of a few widely deployed hosted models.
fn known_context_size(model: &str) -> Option<usize> {
    let model = model.rsplit('/').next().unwrap_or(model);
    if model.starts_with("gpt-4o") || model.starts_with("gpt-4-turbo") {
        Some(128_000)
    } else if model.starts_with("gpt-4.1") {
        Some(1_047_576)
    } else if model.starts_with("gpt-3.5-turbo") {
        Some(16_385)
    } else {
        None
    }
}

fn apply_overrides(
    mut capabilities: ModelCapabilities,
    overrides: &CapabilityOverrides,
) -> ModelCapabilities {
    if let Some(function_calling) = overrides.function_calling {
        capabilities.function_calling = function_calling;
    }
    if let Some(optional) = overrides.optional_tool_streaming {
        capabilities.optional_tool_streaming = optional;
    }
    if overrides.context_size.is_some() {
        capabilities.context_size = overrides.context_size;
    }
    capabilities
}

//! Configuration loading, validation, and management for ragstream.
//!
//! Loads configuration from `~/.ragstream/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use ragstream_core::retrieval::RetrievalQuery;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default instruction template used to embed retrieved context in a user
/// message. `{context}` receives the rendered `<document>` tags and
/// `{user_prompt}` the trimmed user text.
pub const DEFAULT_RAG_INSTRUCTION_TEMPLATE: &str = "\
You are a friendly and knowledgeable assistant that provides complete and insightful answers.
Whenever possible, use only the provided context to respond to the question at the end.
When responding, you MUST NOT reference the existence of the context, directly or indirectly.
Instead, you MUST treat the context as if its contents are entirely part of your working memory.

{context}

{user_prompt}";

/// The root configuration structure.
///
/// Maps directly to `~/.ragstream/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// API key for the completion backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion backend name (e.g., "openai", "ollama", "llamacpp")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override for the backend's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model identifier passed to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Context window used when the backend does not know the model's.
    /// 0 turns an unknown window into a configuration error.
    #[serde(default = "default_context_size_fallback")]
    pub context_size_fallback: usize,

    /// Template for user messages that embed retrieved context
    #[serde(default = "default_rag_instruction_template")]
    pub rag_instruction_template: String,

    /// Retrieval settings for the search tool
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Explicit capability flags for the configured model
    #[serde(default)]
    pub capabilities: CapabilityOverrides,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_context_size_fallback() -> usize {
    2048
}
fn default_rag_instruction_template() -> String {
    DEFAULT_RAG_INSTRUCTION_TEMPLATE.into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("context_size_fallback", &self.context_size_fallback)
            .field("rag_instruction_template", &self.rag_instruction_template)
            .field("retrieval", &self.retrieval)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks kept per search after (re)ranking
    #[serde(default = "default_num_chunks")]
    pub num_chunks: usize,

    /// Neighbor offsets used to widen each hit into a span.
    /// Empty disables neighbor expansion.
    #[serde(default = "default_chunk_neighbors")]
    pub chunk_neighbors: Vec<i64>,

    /// Multiplier applied to each sub-search of a hybrid search
    #[serde(default = "default_search_oversample")]
    pub search_oversample: usize,

    /// Reciprocal Rank Fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

fn default_num_chunks() -> usize {
    5
}
fn default_chunk_neighbors() -> Vec<i64> {
    vec![-1, 1]
}
fn default_search_oversample() -> usize {
    4
}
fn default_rrf_k() -> u32 {
    60
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_chunks: default_num_chunks(),
            chunk_neighbors: default_chunk_neighbors(),
            search_oversample: default_search_oversample(),
            rrf_k: default_rrf_k(),
        }
    }
}

impl RetrievalConfig {
    /// A retrieval query for `text` with the configured defaults.
    pub fn query(&self, text: impl Into<String>) -> RetrievalQuery {
        let neighbors = if self.chunk_neighbors.is_empty() {
            None
        } else {
            Some(self.chunk_neighbors.clone())
        };
        RetrievalQuery::new(text)
            .with_num_chunks(self.num_chunks)
            .with_neighbors(neighbors)
    }
}

/// Capability flags that override what the backend reports for a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_calling: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_tool_streaming: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_size: Option<usize>,
}

impl RagConfig {
    /// Load configuration from the default path (~/.ragstream/config.toml).
    ///
    /// Also checks environment variables:
    /// - `RAGSTREAM_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RAGSTREAM_PROVIDER`
    /// - `RAGSTREAM_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("RAGSTREAM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("RAGSTREAM_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGSTREAM_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(model = %config.model, provider = %config.provider, "Loaded config");
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragstream")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if self.retrieval.num_chunks == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.num_chunks must be > 0".into(),
            ));
        }

        if self.retrieval.search_oversample == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.search_oversample must be > 0".into(),
            ));
        }

        if self.retrieval.rrf_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.rrf_k must be > 0".into(),
            ));
        }

        for placeholder in ["{context}", "{user_prompt}"] {
            if !self.rag_instruction_template.contains(placeholder) {
                return Err(ConfigError::ValidationError(format!(
                    "rag_instruction_template must contain {placeholder}"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            context_size_fallback: default_context_size_fallback(),
            rag_instruction_template: default_rag_instruction_template(),
            retrieval: RetrievalConfig::default(),
            capabilities: CapabilityOverrides::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.context_size_fallback, 2048);
        assert_eq!(config.retrieval.chunk_neighbors, vec![-1, 1]);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = RagConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: RagConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.rag_instruction_template, config.rag_instruction_template);
    }

    #[test]
    fn template_without_placeholders_rejected() {
        let config = RagConfig {
            rag_instruction_template: "Answer: {user_prompt}".into(),
            ..RagConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{context}"));
    }

    #[test]
    fn zero_chunks_rejected() {
        let mut config = RagConfig::default();
        config.retrieval.num_chunks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rrf_k_rejected() {
        let mut config = RagConfig::default();
        config.retrieval.rrf_k = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rrf_k"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = RagConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
provider = "llamacpp"
model = "qwen2.5-7b-instruct"

[retrieval]
num_chunks = 3
chunk_neighbors = []

[capabilities]
optional_tool_streaming = false
context_size = 8192
"#,
        )
        .unwrap();

        let config = RagConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, "llamacpp");
        assert_eq!(config.retrieval.num_chunks, 3);
        assert_eq!(config.capabilities.optional_tool_streaming, Some(false));
        assert_eq!(config.capabilities.context_size, Some(8192));
        assert!(config.retrieval.query("paris").chunk_neighbors.is_none());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            RagConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = RagConfig {
            api_key: Some("sk-secret".into()),
            ..RagConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = RagConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("num_chunks"));
    }
}

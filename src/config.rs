//! Application configuration.
//!
//! One explicit [`Config`] struct, loaded once from a TOML file at process
//! start and passed by reference into every component constructor. There is
//! no ambient global settings object. Secrets (`SLACK_BOT_TOKEN`,
//! `OPENAI_API_KEY`) come from the environment, not the config file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    /// Cap on total messages fetched per run; `None` means unbounded.
    #[serde(default)]
    pub max_messages: Option<usize>,
    /// Rate-limited calls are retried at most this many times per page
    /// before the run fails.
    #[serde(default = "default_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            max_messages: None,
            max_rate_limit_retries: default_rate_limit_retries(),
            timeout_secs: default_slack_timeout_secs(),
        }
    }
}

fn default_rate_limit_retries() -> u32 {
    10
}
fn default_slack_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_qdrant_port")]
    pub port: u16,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            port: default_qdrant_port(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost".to_string()
}
fn default_qdrant_port() -> u16 {
    6333
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector width. When absent, probed once by embedding a sentinel string.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CursorConfig {
    /// Path of the persisted per-channel cursor file (JSON).
    #[serde(default = "default_cursor_path")]
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            path: default_cursor_path(),
        }
    }
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from("./ingestion_cursors.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Load and validate configuration from a TOML file.
///
/// A missing file yields the built-in defaults so that `sqa` works out of
/// the box against a local Qdrant; a present but malformed file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if let Some(0) = config.embedding.dims {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }
    if let Some(0) = config.slack.max_messages {
        anyhow::bail!("slack.max_messages must be > 0 when set");
    }
    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.qdrant.port, 6333);
        assert_eq!(config.slack.max_rate_limit_retries, 10);
        assert_eq!(config.cursor.path, PathBuf::from("./ingestion_cursors.json"));
    }

    #[test]
    fn test_partial_section_override() {
        let config: Config = toml::from_str(
            r#"
[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
url = "http://localhost:11434"

[slack]
max_messages = 5000
"#,
        )
        .unwrap();
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.slack.max_messages, Some(5000));
        // Untouched sections keep their defaults.
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_validation_rejects_zero_batch_size() {
        let config: Config = toml::from_str("[embedding]\nbatch_size = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }
}

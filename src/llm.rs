//! Answer-generation (chat completion) provider boundary.
//!
//! Mirrors the embedding boundary: a closed sum type over supported
//! backends, resolved once from config, with an unknown provider name
//! failing at resolution time.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug)]
enum LlmKind {
    OpenAi { api_key: String },
    Ollama { url: String },
}

#[derive(Debug)]
pub struct Llm {
    kind: LlmKind,
    model: String,
    http: reqwest::Client,
}

impl Llm {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let kind = match config.provider.as_str() {
            "openai" => LlmKind::OpenAi {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?,
            },
            "ollama" => LlmKind::Ollama {
                url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            },
            other => bail!("Unknown LLM provider: {}", other),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            kind,
            model: config.model.clone(),
            http,
        })
    }

    /// Run one chat completion with a system and a user message.
    pub async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let messages = serde_json::json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ]);

        let (request, parse): (_, fn(&Value) -> Result<String>) = match &self.kind {
            LlmKind::OpenAi { api_key } => (
                self.http
                    .post(OPENAI_CHAT_URL)
                    .bearer_auth(api_key)
                    .json(&serde_json::json!({
                        "model": self.model,
                        "messages": messages,
                    })),
                parse_openai_chat,
            ),
            LlmKind::Ollama { url } => (
                self.http
                    .post(format!("{url}/api/chat"))
                    .json(&serde_json::json!({
                        "model": self.model,
                        "messages": messages,
                        "stream": false,
                    })),
                parse_ollama_chat,
            ),
        };

        let response = request.send().await.context("LLM request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error {status}: {body}");
        }
        let json: Value = response.json().await?;
        parse(&json)
    }
}

fn parse_openai_chat(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(String::from)
        .context("Invalid OpenAI chat response: missing message content")
}

fn parse_ollama_chat(json: &Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(Value::as_str)
        .map(String::from)
        .context("Invalid Ollama chat response: missing message content")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openai_chat() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": "42"}}]
        });
        assert_eq!(parse_openai_chat(&json).unwrap(), "42");
    }

    #[test]
    fn test_parse_ollama_chat() {
        let json = json!({"message": {"role": "assistant", "content": "hi"}});
        assert_eq!(parse_ollama_chat(&json).unwrap(), "hi");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "bard".to_string(),
            ..LlmConfig::default()
        };
        let err = Llm::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }
}

//! Embedding provider boundary.
//!
//! Providers form a closed sum type ([`EmbedderKind`]) rather than a
//! string-keyed registry: resolution happens exactly once, at construction,
//! and an unknown provider name is a configuration error at that point.
//! Supported backends:
//! - **OpenAI** — `POST /v1/embeddings`, authenticated via `OPENAI_API_KEY`.
//! - **Ollama** — `POST /api/embed` on a local instance.
//!
//! Both backends batch inputs and retry transient failures (HTTP 429 and
//! 5xx) with exponential backoff capped by `embedding.max_retries`; other
//! client errors fail immediately.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The closed set of embedding backends.
#[derive(Debug)]
enum EmbedderKind {
    OpenAi { api_key: String },
    Ollama { url: String },
}

#[derive(Debug)]
pub struct Embedder {
    kind: EmbedderKind,
    model: String,
    dims: Option<usize>,
    batch_size: usize,
    max_retries: u32,
    http: reqwest::Client,
}

impl Embedder {
    /// Resolve the configured provider. Unknown names and missing
    /// credentials fail here, before any pipeline work starts.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let kind = match config.provider.as_str() {
            "openai" => EmbedderKind::OpenAi {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?,
            },
            "ollama" => EmbedderKind::Ollama {
                url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            },
            other => bail!("Unknown embedding provider: {}", other),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            kind,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            http,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Configured vector width, if any. When absent the index gateway probes
    /// it by embedding a sentinel string once.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// Embed a batch of texts, preserving input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    /// Embed a single text (e.g. a search query or the probe sentinel).
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let request = match &self.kind {
                EmbedderKind::OpenAi { api_key } => self
                    .http
                    .post(OPENAI_EMBEDDINGS_URL)
                    .bearer_auth(api_key)
                    .json(&body),
                EmbedderKind::Ollama { url } => {
                    self.http.post(format!("{url}/api/embed")).json(&body)
                }
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return match &self.kind {
                            EmbedderKind::OpenAi { .. } => parse_openai_response(&json),
                            EmbedderKind::Ollama { .. } => parse_ollama_response(&json),
                        };
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Embedding API error {status}: {body_text}"));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Embedding API error {status}: {body_text}");
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Extract `data[].embedding` arrays from an OpenAI response, in input order.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .context("Invalid OpenAI response: missing data array")?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .context("Invalid OpenAI response: missing embedding")?;
        embeddings.push(to_f32_vec(embedding));
    }
    Ok(embeddings)
}

/// Extract the `embeddings` array from an Ollama `/api/embed` response.
fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(Value::as_array)
        .context("Invalid Ollama response: missing embeddings array")?;

    embeddings
        .iter()
        .map(|row| {
            row.as_array()
                .map(|values| to_f32_vec(values))
                .context("Invalid Ollama response: embedding is not an array")
        })
        .collect()
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openai_response() {
        let json = json!({
            "data": [
                {"index": 0, "embedding": [0.1, 0.2, 0.3]},
                {"index": 1, "embedding": [0.4, 0.5, 0.6]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 3);
        assert!((vectors[1][0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        assert!(parse_openai_response(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({"embeddings": [[1.0, 2.0], [3.0, 4.0]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "sentence-transformers".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = Embedder::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dims: Some(768),
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dims(), Some(768));
    }
}

//! Qdrant vector index gateway.
//!
//! Talks to Qdrant's REST API over reqwest. One collection per channel,
//! cosine distance. Point ids are UUIDs derived deterministically from
//! `channel:ordering_key` (SHA-256), so re-indexing the same message range
//! after a partially failed run overwrites points instead of duplicating
//! them.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::QdrantConfig;
use crate::embedding::Embedder;
use crate::models::{Document, DocumentMetadata};

/// Embedded once to discover vector width when `embedding.dims` is unset.
const PROBE_SENTINEL: &str = "hello";

pub struct QdrantStore {
    http: reqwest::Client,
    base: String,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: format!("{}:{}", config.url.trim_end_matches('/'), config.port),
        })
    }

    /// Make sure the channel's collection exists. No-op when it does;
    /// otherwise create it with cosine distance, probing the vector width
    /// with a single sentinel embedding if the config does not pin one.
    pub async fn ensure_collection(
        &self,
        name: &str,
        dims: Option<usize>,
        embedder: &Embedder,
    ) -> Result<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        let dims = match dims {
            Some(d) => d,
            None => embedder.embed_query(PROBE_SENTINEL).await?.len(),
        };
        let body = serde_json::json!({
            "vectors": {"size": dims, "distance": "Cosine"}
        });
        let response = self
            .http
            .put(format!("{}/collections/{name}", self.base))
            .json(&body)
            .send()
            .await
            .context("Qdrant create collection request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant create collection error {status}: {body}");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .http
            .get(format!("{}/collections/{name}/exists", self.base))
            .send()
            .await
            .context("Qdrant existence check failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant existence check error {status}: {body}");
        }
        let json: Value = response.json().await?;
        Ok(json
            .pointer("/result/exists")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Stored vector width of a collection, or `None` if the collection
    /// does not exist. Used for the dimension-parity fail-fast check.
    pub async fn collection_dims(&self, name: &str) -> Result<Option<usize>> {
        let response = self
            .http
            .get(format!("{}/collections/{name}", self.base))
            .send()
            .await
            .context("Qdrant collection info request failed")?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant collection info error {status}: {body}");
        }
        let json: Value = response.json().await?;
        Ok(json
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|d| d as usize))
    }

    /// Upsert documents with their embeddings, waiting for the write to be
    /// durable before returning.
    pub async fn upsert(
        &self,
        name: &str,
        documents: &[Document],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if documents.len() != vectors.len() {
            bail!(
                "Document/vector count mismatch: {} documents, {} vectors",
                documents.len(),
                vectors.len()
            );
        }
        let body = serde_json::json!({ "points": build_points(documents, vectors) });
        let response = self
            .http
            .put(format!("{}/collections/{name}/points?wait=true", self.base))
            .json(&body)
            .send()
            .await
            .context("Qdrant upsert request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant upsert error {status}: {body}");
        }
        Ok(())
    }

    /// Nearest-neighbor search, returning documents with their scores,
    /// best match first.
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        let body = serde_json::json!({
            "vector": query_vector,
            "limit": k,
            "with_payload": true,
        });
        let response = self
            .http
            .post(format!("{}/collections/{name}/points/search", self.base))
            .json(&body)
            .send()
            .await
            .context("Qdrant search request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant search error {status}: {body}");
        }
        let json: Value = response.json().await?;
        parse_search_response(&json)
    }
}

/// Deterministic point id for a message: UUID from the first 16 bytes of
/// SHA-256 over `channel:ordering_key`.
fn point_id(channel: &str, ts: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(channel.as_bytes());
    hasher.update(b":");
    hasher.update(ts.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn build_points(documents: &[Document], vectors: &[Vec<f32>]) -> Vec<Value> {
    documents
        .iter()
        .zip(vectors)
        .map(|(doc, vector)| {
            serde_json::json!({
                "id": point_id(&doc.metadata.channel, &doc.metadata.ts).to_string(),
                "vector": vector,
                "payload": {
                    "content": doc.content,
                    "channel": doc.metadata.channel,
                    "ts": doc.metadata.ts,
                    "datetime": doc.metadata.datetime,
                    "user": doc.metadata.user,
                },
            })
        })
        .collect()
}

fn parse_search_response(json: &Value) -> Result<Vec<(Document, f32)>> {
    let hits = json
        .get("result")
        .and_then(Value::as_array)
        .context("Invalid Qdrant search response: missing result array")?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let payload = hit
            .get("payload")
            .context("Invalid Qdrant search response: missing payload")?;
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        results.push((
            Document {
                content: field("content"),
                metadata: DocumentMetadata {
                    channel: field("channel"),
                    ts: field("ts"),
                    datetime: field("datetime"),
                    user: field("user"),
                },
            },
            score,
        ));
    }
    Ok(results)
}

//! Retrieval-augmented question answering over an ingested channel.
//!
//! Embeds the question with the same provider used at ingestion time,
//! retrieves the top-k nearest documents from the channel's collection,
//! formats them into a numbered context block, and asks the LLM. The raw
//! retrieved documents are returned alongside the answer so callers can
//! show their sources.

use anyhow::{bail, Result};
use tracing::info;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::llm::Llm;
use crate::models::Document;
use crate::qdrant::QdrantStore;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using only the \
provided Slack channel context. If the answer is not in the context, say you don't know.";

pub struct QaResult {
    pub answer: String,
    pub sources: Vec<Document>,
}

pub async fn answer_question(
    config: &Config,
    channel: &str,
    question: &str,
    k: usize,
) -> Result<QaResult> {
    let embedder = Embedder::from_config(&config.embedding)?;
    let index = QdrantStore::new(&config.qdrant)?;

    let query_vector = embedder.embed_query(question).await?;

    // Dimension parity between the query embedding and the stored collection
    // is a hard invariant; a mismatch means the channel was indexed with a
    // different model and searching would silently return garbage.
    match index.collection_dims(channel).await? {
        None => bail!("Channel not ingested yet: {channel}"),
        Some(dims) if dims != query_vector.len() => bail!(
            "Embedding dimension mismatch for '{channel}': collection has {dims}, \
             model '{}' produces {}. Re-ingest the channel with the current model.",
            embedder.model_name(),
            query_vector.len()
        ),
        Some(_) => {}
    }

    let hits = index.search(channel, &query_vector, k).await?;
    info!(channel, retrieved = hits.len(), "retrieved context documents");

    let sources: Vec<Document> = hits.into_iter().map(|(doc, _)| doc).collect();
    let context = format_context(&sources);

    let llm = Llm::from_config(&config.llm)?;
    let answer = llm
        .generate(
            SYSTEM_PROMPT,
            &format!("Question: {question}\n\nContext:\n{context}"),
        )
        .await?;

    Ok(QaResult { answer, sources })
}

/// Concatenate document contents as numbered blocks: `[1] …`, `[2] …`.
/// The numbering is stable so the model can cite sources by index.
fn format_context(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, d)| format!("[{}] {}", i + 1, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn doc(content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocumentMetadata {
                channel: "general".to_string(),
                ts: "1.0".to_string(),
                datetime: String::new(),
                user: String::new(),
            },
        }
    }

    #[test]
    fn test_format_context_numbering() {
        let docs = vec![doc("first snippet"), doc("second snippet")];
        assert_eq!(
            format_context(&docs),
            "[1] first snippet\n\n[2] second snippet"
        );
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
    }
}

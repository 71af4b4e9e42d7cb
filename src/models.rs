//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! A raw Slack [`Message`] flows through normalization into a [`Document`],
//! which is what gets embedded and stored in the vector index. Ingestion
//! progress per channel is tracked by a persisted [`ChannelCursor`].

use serde::{Deserialize, Serialize};

/// A raw message as returned by the Slack `conversations.history` API.
///
/// Only the fields the pipeline cares about are deserialized; everything
/// else in the Slack payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message timestamp — unique within a channel and monotonically
    /// increasing, so it doubles as the ordering and dedup key.
    #[serde(default)]
    pub ts: Option<String>,
    /// Parent thread timestamp; fallback ordering key when `ts` is absent.
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Message {
    /// The ordering key: the message's own timestamp, falling back to the
    /// thread timestamp only when the primary is absent.
    pub fn ordering_key(&self) -> Option<&str> {
        self.ts.as_deref().or(self.thread_ts.as_deref())
    }

    /// Author id, preferring `user` over the legacy `username` field.
    pub fn author(&self) -> &str {
        self.user
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("")
    }
}

/// A channel name/id pair from `conversations.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// An indexable unit: normalized message text plus a fixed metadata schema.
///
/// Immutable once built. `metadata.ts` always equals the source message's
/// ordering key, so a document can be re-derived deterministically from its
/// source message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub channel: String,
    pub ts: String,
    pub datetime: String,
    pub user: String,
}

/// Persisted ingestion progress for one channel.
///
/// `extra` carries any keys a future schema version may add, so rewriting
/// the cursor file never drops fields it does not understand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCursor {
    /// Ordering key of the most recently committed message.
    #[serde(default)]
    pub last_timestamp: String,
    /// Cumulative count of messages committed across all runs.
    #[serde(default)]
    pub total_messages: u64,
    /// Wall-clock marker of the last commit (RFC 3339).
    #[serde(default)]
    pub last_updated: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// How an ingestion run decided to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// No cursor exists yet; fetch the whole channel history.
    Full,
    /// Fetch only messages strictly newer than the stored cursor.
    Incremental,
    /// Caller requested a refetch that ignores the stored cursor.
    ForcedFull,
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Full => write!(f, "full"),
            IngestMode::Incremental => write!(f, "incremental"),
            IngestMode::ForcedFull => write!(f, "forced-full"),
        }
    }
}

/// Summary of one ingestion run. Ephemeral — reported to the caller and
/// never persisted.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub channel: String,
    pub mode: IngestMode,
    /// Messages returned by the fetch, before any filtering.
    pub fetched: usize,
    /// Messages fetched but not indexed: excluded at the cursor boundary,
    /// or dropped during build (empty content, missing ordering key).
    pub filtered: usize,
    /// Documents actually written to the vector index.
    pub committed: usize,
}

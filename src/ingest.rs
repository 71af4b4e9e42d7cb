//! Ingestion pipeline orchestration.
//!
//! One run walks a fixed sequence: resolve the channel, decide full vs.
//! incremental vs. forced-full, fetch, filter out already-seen messages,
//! build documents, write them to the vector index, and only then commit
//! the cursor. The cursor never advances past messages that are not
//! verifiably indexed, so a failed run is always safe to retry — the next
//! run re-fetches the same range (at-least-once; deterministic point ids
//! keep retries from duplicating documents).

use anyhow::{Context, Result};
use std::cmp::Ordering;
use tracing::info;

use crate::clean::messages_to_documents;
use crate::config::Config;
use crate::cursor::CursorStore;
use crate::embedding::Embedder;
use crate::models::{ChannelCursor, IngestMode, IngestOutcome, Message};
use crate::qdrant::QdrantStore;
use crate::slack::SlackClient;
use crate::ts::cmp_ts;

/// Run one ingestion pass for a channel.
///
/// Strictly sequential, blocking the caller for the duration of the run.
/// Concurrent runs against the same channel are not coordinated here; the
/// HTTP layer serializes them with a per-channel lock.
pub async fn run_ingest(
    config: &Config,
    channel: &str,
    force_full_refresh: bool,
) -> Result<IngestOutcome> {
    let slack = SlackClient::new(&config.slack)?;
    let mut cursors = CursorStore::load(&config.cursor.path);

    let channel_id = slack
        .resolve_channel(channel)
        .await?
        .with_context(|| format!("Channel not found: {channel}"))?;

    let (mode, oldest) = determine_mode(force_full_refresh, cursors.get(channel));
    match mode {
        IngestMode::Incremental => info!(
            channel,
            last_timestamp = oldest.as_deref().unwrap_or(""),
            "incremental update: fetching only messages after the stored cursor"
        ),
        IngestMode::Full => info!(channel, "first-time ingestion: fetching full history"),
        IngestMode::ForcedFull => {
            info!(channel, "forced full refresh: ignoring the stored cursor")
        }
    }

    let fetched = slack.fetch_messages(&channel_id, oldest.as_deref()).await?;
    let fetched_count = fetched.len();

    // The commit key comes from the fetched set, before boundary filtering.
    let max_ts = max_ordering_key(&fetched);

    let new_messages = filter_new(fetched, oldest.as_deref());
    let boundary_dropped = fetched_count - new_messages.len();
    if boundary_dropped > 0 {
        info!(
            channel,
            filtered = boundary_dropped,
            "dropped already-processed messages at the cursor boundary"
        );
    }

    let documents = messages_to_documents(channel, &new_messages);
    let filtered_count = filtered_message_count(fetched_count, new_messages.len(), documents.len());
    if documents.is_empty() {
        // Nothing indexable: finish without touching the cursor, so messages
        // that produced no content are reconsidered next run.
        info!(channel, "no new documents; cursor unchanged");
        return Ok(IngestOutcome {
            channel: channel.to_string(),
            mode,
            fetched: fetched_count,
            filtered: filtered_count,
            committed: 0,
        });
    }

    let embedder = Embedder::from_config(&config.embedding)?;
    let index = QdrantStore::new(&config.qdrant)?;
    index
        .ensure_collection(channel, embedder.dims(), &embedder)
        .await?;

    let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
    let vectors = embedder.embed_texts(&texts).await?;
    index.upsert(channel, &documents, &vectors).await?;

    let new_last_timestamp = max_ts
        .context("No ordering key among fetched messages despite non-empty document set")?;
    cursors.commit(channel, &new_last_timestamp, new_messages.len() as u64)?;

    info!(
        channel,
        documents = documents.len(),
        last_timestamp = %new_last_timestamp,
        "ingestion committed"
    );

    Ok(IngestOutcome {
        channel: channel.to_string(),
        mode,
        fetched: fetched_count,
        filtered: filtered_count,
        committed: documents.len(),
    })
}

/// Decide the run mode and the fetch lower bound.
///
/// Forced refresh never uses a bound; otherwise an existing cursor puts the
/// run in incremental mode bounded at its `last_timestamp`.
fn determine_mode(
    force_full_refresh: bool,
    cursor: Option<&ChannelCursor>,
) -> (IngestMode, Option<String>) {
    if force_full_refresh {
        return (IngestMode::ForcedFull, None);
    }
    match cursor {
        Some(c) if !c.last_timestamp.is_empty() => {
            (IngestMode::Incremental, Some(c.last_timestamp.clone()))
        }
        _ => (IngestMode::Full, None),
    }
}

/// Re-exclude the boundary: keep only messages whose ordering key is
/// strictly greater than the lower bound. Slack's `oldest` filter is
/// best-effort and may return the boundary message itself. Messages with
/// no ordering key at all cannot be placed relative to the bound and are
/// dropped too. Without a bound the set passes through untouched.
fn filter_new(messages: Vec<Message>, oldest: Option<&str>) -> Vec<Message> {
    let Some(bound) = oldest else {
        return messages;
    };
    messages
        .into_iter()
        .filter(|m| {
            m.ordering_key()
                .map(|ts| cmp_ts(ts, bound) == Ordering::Greater)
                .unwrap_or(false)
        })
        .collect()
}

/// Messages fetched but never indexed: boundary re-exclusions plus
/// messages the builder dropped (empty content, no ordering key).
fn filtered_message_count(fetched: usize, kept: usize, built: usize) -> usize {
    (fetched - kept) + (kept - built)
}

/// Maximum ordering key across a message set, by exact decimal comparison.
fn max_ordering_key(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .filter_map(Message::ordering_key)
        .max_by(|a, b| cmp_ts(a, b))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: &str) -> Message {
        Message {
            ts: Some(ts.to_string()),
            thread_ts: None,
            text: Some("text".to_string()),
            user: None,
            username: None,
        }
    }

    fn cursor(last_timestamp: &str) -> ChannelCursor {
        ChannelCursor {
            last_timestamp: last_timestamp.to_string(),
            total_messages: 10,
            last_updated: String::new(),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_mode_full_when_no_cursor() {
        let (mode, oldest) = determine_mode(false, None);
        assert_eq!(mode, IngestMode::Full);
        assert!(oldest.is_none());
    }

    #[test]
    fn test_mode_incremental_with_cursor() {
        let c = cursor("1727000000.000100");
        let (mode, oldest) = determine_mode(false, Some(&c));
        assert_eq!(mode, IngestMode::Incremental);
        assert_eq!(oldest.as_deref(), Some("1727000000.000100"));
    }

    #[test]
    fn test_mode_forced_full_ignores_cursor() {
        let c = cursor("1727000000.000100");
        let (mode, oldest) = determine_mode(true, Some(&c));
        assert_eq!(mode, IngestMode::ForcedFull);
        assert!(oldest.is_none());
    }

    #[test]
    fn test_filter_excludes_boundary_message() {
        let messages = vec![
            msg("1727000000.000100"),
            msg("1727000000.000200"),
            msg("1727000000.000300"),
        ];
        let kept = filter_new(messages, Some("1727000000.000100"));
        let keys: Vec<&str> = kept.iter().filter_map(Message::ordering_key).collect();
        assert_eq!(keys, ["1727000000.000200", "1727000000.000300"]);
    }

    #[test]
    fn test_filter_passthrough_without_bound() {
        let messages = vec![msg("1.0"), msg("2.0")];
        assert_eq!(filter_new(messages, None).len(), 2);
    }

    #[test]
    fn test_filter_drops_keyless_messages_under_bound() {
        let keyless = Message {
            ts: None,
            thread_ts: None,
            text: Some("x".to_string()),
            user: None,
            username: None,
        };
        let kept = filter_new(vec![keyless, msg("3.0")], Some("2.0"));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_max_ordering_key_is_exact_decimal() {
        // A float parse would see these as equal at the margin.
        let messages = vec![msg("1727000000.000000001"), msg("1727000000.000000002")];
        assert_eq!(
            max_ordering_key(&messages).as_deref(),
            Some("1727000000.000000002")
        );
        assert!(max_ordering_key(&[]).is_none());
    }

    #[test]
    fn test_filtered_counts_boundary_and_content_drops() {
        // 4 fetched, 1 excluded at the cursor boundary, 1 normalized to
        // empty during build: both count as filtered, neither as committed.
        assert_eq!(filtered_message_count(4, 3, 2), 2);
        // No bound, nothing dropped.
        assert_eq!(filtered_message_count(3, 3, 3), 0);
        // Everything fetched sat at or below the boundary.
        assert_eq!(filtered_message_count(1, 0, 0), 1);
    }

    #[test]
    fn test_max_over_prefilter_set_matches_scenario() {
        // Cursor at T; fetch returns [T, T+1, T+2]. The filter drops T, but
        // the commit key is computed over the fetched set and lands on T+2.
        let fetched = vec![
            msg("1727000000.000100"),
            msg("1727000000.000200"),
            msg("1727000000.000300"),
        ];
        let max_ts = max_ordering_key(&fetched);
        let kept = filter_new(fetched, Some("1727000000.000100"));
        assert_eq!(kept.len(), 2);
        assert_eq!(max_ts.as_deref(), Some("1727000000.000300"));
    }
}

//! Slack markup normalization and document building.
//!
//! Raw Slack message text carries inline tokens for user mentions (`<@U123>`),
//! channel mentions (`<#C123|general>`), and links (`<https://x|label>`).
//! [`strip_slack_formatting`] rewrites those into plain readable text;
//! [`messages_to_documents`] then maps normalized messages into indexable
//! [`Document`]s, dropping anything that normalizes to empty.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;

use crate::models::{Document, DocumentMetadata, Message};

static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+>").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([A-Z0-9]+)\|[^>]+>").unwrap());
static LABELED_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>|]+)\|[^>]+>").unwrap());
static BARE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip Slack inline markup and collapse whitespace.
///
/// Pure and idempotent: normalizing already-normalized text is a no-op.
/// User mentions are removed, channel mentions become `#<channel-id>`,
/// `<url|label>` becomes `label`, and bare `<url>` becomes `url`.
pub fn strip_slack_formatting(text: &str) -> String {
    let text = USER_MENTION.replace_all(text, "");
    let text = CHANNEL_MENTION.replace_all(&text, "#$1");
    let text = LABELED_LINK.replace_all(&text, "$1");
    let text = BARE_TOKEN.replace_all(&text, "$1");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Build indexable documents from fetched messages, preserving input order.
///
/// Messages whose text normalizes to the empty string are dropped entirely,
/// as are messages with no ordering key at all — the key is the document's
/// identity in the index, and keyless documents would collide on it.
/// The document's `ts` is the message's ordering key; `datetime` is a
/// best-effort ISO rendering of that key and is left empty when the key
/// does not parse as fixed-point seconds.
pub fn messages_to_documents(channel: &str, messages: &[Message]) -> Vec<Document> {
    let mut docs = Vec::new();
    for message in messages {
        let cleaned = strip_slack_formatting(message.text.as_deref().unwrap_or(""));
        if cleaned.is_empty() {
            continue;
        }
        let Some(ts) = message.ordering_key() else {
            continue;
        };
        let ts = ts.to_string();
        docs.push(Document {
            content: cleaned,
            metadata: DocumentMetadata {
                channel: channel.to_string(),
                datetime: ts_to_iso(&ts),
                ts,
                user: message.author().to_string(),
            },
        });
    }
    docs
}

/// Render a fixed-point timestamp as an RFC 3339 datetime, for display only.
/// Ordering comparisons never go through this conversion.
fn ts_to_iso(ts: &str) -> String {
    let (int_part, frac_part) = match ts.split_once('.') {
        Some((i, f)) => (i, f),
        None => (ts, ""),
    };
    let Ok(secs) = int_part.parse::<i64>() else {
        return String::new();
    };
    // Pad or truncate the fraction to nanoseconds.
    let mut frac = String::from(frac_part);
    frac.truncate(9);
    while frac.len() < 9 {
        frac.push('0');
    }
    let Ok(nanos) = frac.parse::<u32>() else {
        return String::new();
    };
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: Option<&str>, thread_ts: Option<&str>, text: &str, user: Option<&str>) -> Message {
        Message {
            ts: ts.map(String::from),
            thread_ts: thread_ts.map(String::from),
            text: Some(text.to_string()),
            user: user.map(String::from),
            username: None,
        }
    }

    #[test]
    fn test_strips_user_mentions() {
        assert_eq!(strip_slack_formatting("<@U12345> hello"), "hello");
        assert_eq!(strip_slack_formatting("hey <@U12345>, ping <@U67890>"), "hey , ping");
    }

    #[test]
    fn test_rewrites_channel_mentions() {
        assert_eq!(
            strip_slack_formatting("see <#C042ABC|general> for details"),
            "see #C042ABC for details"
        );
    }

    #[test]
    fn test_rewrites_links() {
        assert_eq!(
            strip_slack_formatting("read <https://example.com/doc|the doc>"),
            "read the doc"
        );
        assert_eq!(
            strip_slack_formatting("see <https://example.com>"),
            "see https://example.com"
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(strip_slack_formatting("  a \t b\n\nc  "), "a b c");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "<@U1> said <#C2|dev> has <https://x.io|news>\t here",
            "plain text",
            "   ",
            "<https://example.com>",
        ];
        for raw in samples {
            let once = strip_slack_formatting(raw);
            assert_eq!(strip_slack_formatting(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn test_empty_message_dropped() {
        let messages = vec![
            msg(Some("1727000000.000100"), None, "hello world", Some("U1")),
            msg(Some("1727000000.000200"), None, "<@U999>", Some("U2")),
        ];
        let docs = messages_to_documents("general", &messages);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "hello world");
        assert_eq!(docs[0].metadata.ts, "1727000000.000100");
        assert_eq!(docs[0].metadata.user, "U1");
        assert_eq!(docs[0].metadata.channel, "general");
    }

    #[test]
    fn test_thread_ts_fallback_only_when_primary_absent() {
        let fallback = msg(None, Some("1727000000.000300"), "in thread", None);
        let primary = msg(
            Some("1727000000.000400"),
            Some("1727000000.000300"),
            "reply",
            None,
        );
        let docs = messages_to_documents("general", &[fallback, primary]);
        assert_eq!(docs[0].metadata.ts, "1727000000.000300");
        assert_eq!(docs[1].metadata.ts, "1727000000.000400");
    }

    #[test]
    fn test_keyless_message_dropped() {
        // Without an ordering key the document would have no identity in
        // the index, and every such message would overwrite the last one.
        let keyless = msg(None, None, "orphaned text", Some("U1"));
        let keyed = msg(Some("1727000000.000100"), None, "kept", None);
        let docs = messages_to_documents("general", &[keyless, keyed]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "kept");
    }

    #[test]
    fn test_order_preserved() {
        let messages = vec![
            msg(Some("1.0"), None, "first", None),
            msg(Some("2.0"), None, "second", None),
            msg(Some("3.0"), None, "third", None),
        ];
        let docs = messages_to_documents("general", &messages);
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn test_iso_conversion() {
        assert_eq!(ts_to_iso("0"), "1970-01-01T00:00:00+00:00");
        assert!(ts_to_iso("1727000000.000100").starts_with("2024-09-22T"));
    }

    #[test]
    fn test_unparseable_ts_gives_empty_datetime() {
        let messages = vec![msg(Some("not-a-number"), None, "text survives", None)];
        let docs = messages_to_documents("general", &messages);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.datetime, "");
        assert_eq!(docs[0].metadata.ts, "not-a-number");
    }
}

//! Slack Web API client for channel resolution and message history.
//!
//! Wraps `conversations.list` and `conversations.history` with cursor-based
//! pagination and rate-limit backoff. Slack signals throttling either as
//! HTTP 429 with a `Retry-After` header or as `ok: false` with
//! `error: "ratelimited"`; both are retried after sleeping for the hinted
//! duration, up to a configured cap. Every other API error fails the call.
//!
//! `conversations.history` returns newest-first; [`SlackClient::fetch_messages`]
//! reverses the collected pages so callers always see strictly oldest-first
//! order, matching the ordering key.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SlackConfig;
use crate::models::{ChannelInfo, Message};

const SLACK_API_BASE: &str = "https://slack.com/api";
/// Slack caps `conversations.history` at 200 messages per call.
const HISTORY_PAGE_LIMIT: usize = 200;
/// Backoff used when a rate-limited response carries no `Retry-After` hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
    max_messages: Option<usize>,
    max_rate_limit_retries: u32,
}

impl SlackClient {
    /// Build a client from config. The bot token comes from the
    /// `SLACK_BOT_TOKEN` environment variable and its absence is a
    /// configuration error, raised here rather than on first call.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let token = std::env::var("SLACK_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("SLACK_BOT_TOKEN environment variable not set"))?;
        Self::with_api_base(config, token, SLACK_API_BASE.to_string())
    }

    /// Build a client against an explicit API base URL. Tests point this at
    /// a local stub server to exercise pagination and backoff.
    fn with_api_base(config: &SlackConfig, token: String, api_base: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            token,
            api_base,
            max_messages: config.max_messages,
            max_rate_limit_retries: config.max_rate_limit_retries,
        })
    }

    /// Resolve a channel name to its id by paging through
    /// `conversations.list`. Returns `None` when no page contains the name.
    pub async fn resolve_channel(&self, name: &str) -> Result<Option<String>> {
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .call(
                    "conversations.list",
                    &list_params(cursor.as_deref(), true),
                )
                .await?;
            for channel in parse_channel_page(&page)? {
                if channel.name == name {
                    info!(channel = name, id = %channel.id, "resolved channel");
                    return Ok(Some(channel.id));
                }
            }
            cursor = next_cursor(&page);
            if cursor.is_none() {
                warn!(channel = name, "channel not found");
                return Ok(None);
            }
        }
    }

    /// List all channels visible to the bot, optionally including private ones.
    pub async fn list_channels(&self, include_private: bool) -> Result<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .call(
                    "conversations.list",
                    &list_params(cursor.as_deref(), include_private),
                )
                .await?;
            channels.extend(parse_channel_page(&page)?);
            cursor = next_cursor(&page);
            if cursor.is_none() {
                return Ok(channels);
            }
        }
    }

    /// Fetch channel history, oldest-first.
    ///
    /// `oldest` is passed through to the API unmodified as a lower bound on
    /// the ordering key. Slack's bound semantics are best-effort and may
    /// still include the boundary message; the orchestrator re-excludes it.
    /// Pagination stops when the API stops returning a continuation cursor,
    /// a page comes back empty, or the configured total-message budget is
    /// exhausted.
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        oldest: Option<&str>,
    ) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let remaining = match self.max_messages {
                Some(max) => {
                    let left = max.saturating_sub(messages.len());
                    if left == 0 {
                        break;
                    }
                    left
                }
                None => usize::MAX,
            };
            let limit = remaining.min(HISTORY_PAGE_LIMIT);

            let mut params = vec![
                ("channel".to_string(), channel_id.to_string()),
                ("limit".to_string(), limit.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor".to_string(), c.clone()));
            }
            if let Some(o) = oldest {
                params.push(("oldest".to_string(), o.to_string()));
            }

            let page = self.call("conversations.history", &params).await?;
            let (batch, next) = parse_history_page(&page)?;
            debug!(
                batch = batch.len(),
                total = messages.len() + batch.len(),
                "fetched history page"
            );
            let batch_empty = batch.is_empty();
            messages.extend(batch);
            cursor = next;
            if cursor.is_none() || batch_empty {
                break;
            }
        }

        // Slack returns newest-first; callers get strictly oldest-first.
        messages.reverse();
        info!(channel_id, count = messages.len(), "fetched messages");
        Ok(messages)
    }

    /// Perform one Slack API call, retrying rate-limited responses after the
    /// hinted backoff. Retries are bounded; exhaustion fails the call.
    async fn call(&self, method: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}/{method}", self.api_base);
        let mut rate_limit_attempts = 0u32;

        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(params)
                .send()
                .await
                .with_context(|| format!("Slack API request failed: {method}"))?;

            if response.status().as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                self.backoff(method, &mut rate_limit_attempts, retry_after)
                    .await?;
                continue;
            }

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("Slack API error {status} on {method}: {body}");
            }

            let json: Value = response.json().await?;
            if json.get("ok").and_then(Value::as_bool) != Some(true) {
                let error = json
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error");
                if error == "ratelimited" {
                    self.backoff(method, &mut rate_limit_attempts, DEFAULT_RETRY_AFTER_SECS)
                        .await?;
                    continue;
                }
                bail!("Slack API error on {method}: {error}");
            }
            return Ok(json);
        }
    }

    async fn backoff(&self, method: &str, attempts: &mut u32, retry_after: u64) -> Result<()> {
        *attempts += 1;
        if *attempts > self.max_rate_limit_retries {
            bail!(
                "Slack rate limit on {method} persisted after {} retries",
                self.max_rate_limit_retries
            );
        }
        warn!(
            method,
            retry_after, attempt = *attempts, "rate limited; backing off"
        );
        tokio::time::sleep(Duration::from_secs(retry_after)).await;
        Ok(())
    }
}

fn list_params(cursor: Option<&str>, include_private: bool) -> Vec<(String, String)> {
    let types = if include_private {
        "public_channel,private_channel"
    } else {
        "public_channel"
    };
    let mut params = vec![
        ("limit".to_string(), "1000".to_string()),
        ("types".to_string(), types.to_string()),
    ];
    if let Some(c) = cursor {
        params.push(("cursor".to_string(), c.to_string()));
    }
    params
}

/// Pull the channel list out of a `conversations.list` response.
fn parse_channel_page(page: &Value) -> Result<Vec<ChannelInfo>> {
    let channels = page
        .get("channels")
        .cloned()
        .unwrap_or_else(|| Value::Array(vec![]));
    serde_json::from_value(channels).context("Invalid conversations.list response")
}

/// Pull messages and the continuation cursor out of a
/// `conversations.history` response. The page is newest-first as returned.
fn parse_history_page(page: &Value) -> Result<(Vec<Message>, Option<String>)> {
    let messages = page
        .get("messages")
        .cloned()
        .unwrap_or_else(|| Value::Array(vec![]));
    let messages: Vec<Message> =
        serde_json::from_value(messages).context("Invalid conversations.history response")?;
    Ok((messages, next_cursor(page)))
}

/// Slack signals "no more pages" with a missing or empty `next_cursor`.
fn next_cursor(page: &Value) -> Option<String> {
    page.get("response_metadata")
        .and_then(|m| m.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(String::from)
}

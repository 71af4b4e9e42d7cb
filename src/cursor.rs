//! Persisted per-channel ingestion cursors.
//!
//! One JSON object keyed by channel name tracks how far ingestion has
//! progressed (`last_timestamp`), how many messages have been committed in
//! total, and when the last commit happened. The store is deliberately
//! self-healing: a missing, unreadable, or corrupt file degrades to "no
//! channels ingested yet", which costs a re-fetch but never corrupts state.

use anyhow::{Context, Result};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::ChannelCursor;
use crate::ts::cmp_ts;

pub struct CursorStore {
    path: PathBuf,
    data: BTreeMap<String, ChannelCursor>,
}

impl CursorStore {
    /// Load the cursor file. Absence and corruption are both normal states
    /// that start the store empty; only later writes can fail.
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "cursor file is corrupt; starting fresh (channels will re-ingest)"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cursor file is unreadable; starting fresh (channels will re-ingest)"
                );
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            data,
        }
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelCursor> {
        self.data.get(channel)
    }

    /// Record a successful run: bump the cumulative message counter and
    /// advance `last_timestamp`.
    ///
    /// The timestamp only ever moves forward — a commit carrying a key older
    /// than the stored one (possible with racing runs) keeps the stored
    /// value. The merged record is persisted durably (temp file + rename)
    /// before this returns; unrecognized keys in the existing record are
    /// carried through untouched.
    pub fn commit(
        &mut self,
        channel: &str,
        new_last_timestamp: &str,
        newly_committed_count: u64,
    ) -> Result<()> {
        let entry = self.data.entry(channel.to_string()).or_default();
        entry.total_messages += newly_committed_count;
        if cmp_ts(new_last_timestamp, &entry.last_timestamp) == Ordering::Greater {
            entry.last_timestamp = new_last_timestamp.to_string();
        }
        entry.last_updated = Utc::now().to_rfc3339();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, format!("{json}\n"))
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

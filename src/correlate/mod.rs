// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cross-process call correlation.
//!
//! A pre-tool handler and the matching post-tool handler run as independent
//! processes with no shared memory, so they rendezvous on a deterministic
//! content hash of the call identity instead of a shared counter: both sides
//! derive the same [`CorrelationKey`] from (tool name, serialized input).
//!
//! Known limitation, accepted by the correlation contract: two genuinely
//! simultaneous, content-identical invocations of the same tool collide on
//! one key. The second `end` then finds no entry and is recorded as
//! incomplete rather than failing the invocation.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::SessionStore;

/// Deterministic identifier linking a call's begin and end records.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Derive a key from call identity.
    ///
    /// Two independent processes observing the same call must produce the
    /// same key, so the input is serialized with serde_json's stable field
    /// ordering before hashing.
    pub fn derive(tool: &str, input: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(input.to_string().as_bytes());
        let digest = hasher.finalize();
        // 16 hex chars is plenty for a per-session keyspace
        Self(hex_prefix(&digest, 8))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationKey({})", self.0)
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{:02x}", b)).collect()
}

/// Ephemeral per-key state persisted by `begin` and consumed by `end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub trace_id: String,
    pub started_at_ms: i64,
}

/// Outcome of matching a call's end against its begin record.
#[derive(Debug, Clone)]
pub struct CompletedCall {
    pub trace_id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub elapsed_ms: u64,
    /// False when no begin record was found (crashed pre handler or a true
    /// key collision); the sentinel start time is the end time itself so
    /// downstream duration sums are not poisoned.
    pub matched: bool,
}

/// Keyed, expiring map of in-flight calls, backed by one small file per key
/// under the session directory.
#[derive(Debug, Clone)]
pub struct PendingArena {
    dir: PathBuf,
}

impl PendingArena {
    /// Open the arena for a session, creating its directory if needed.
    pub fn open(store: &SessionStore) -> Result<Self, StoreError> {
        let dir = store.pending_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Record the start of a call. Returns the entry that was persisted.
    pub fn begin(&self, key: &CorrelationKey) -> Result<PendingEntry, StoreError> {
        let entry = PendingEntry {
            trace_id: Uuid::new_v4().to_string(),
            started_at_ms: Utc::now().timestamp_millis(),
        };
        let content = serde_json::to_string(&entry)?;
        std::fs::write(self.entry_path(key), content)?;
        Ok(entry)
    }

    /// Match and consume the begin record for `key`.
    ///
    /// An unmatched end still yields a usable outcome: sentinel start time,
    /// zero elapsed, fresh trace id, `matched: false`.
    pub fn end(&self, key: &CorrelationKey) -> Result<CompletedCall, StoreError> {
        let ended_at_ms = Utc::now().timestamp_millis();
        let path = self.entry_path(key);

        let entry: Option<PendingEntry> = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let _ = std::fs::remove_file(&path);
                serde_json::from_str(&content).ok()
            }
            Err(_) => None,
        };

        Ok(match entry {
            Some(entry) => CompletedCall {
                trace_id: entry.trace_id,
                started_at_ms: entry.started_at_ms,
                ended_at_ms,
                elapsed_ms: ended_at_ms.saturating_sub(entry.started_at_ms).max(0) as u64,
                matched: true,
            },
            None => CompletedCall {
                trace_id: Uuid::new_v4().to_string(),
                started_at_ms: ended_at_ms,
                ended_at_ms,
                elapsed_ms: 0,
                matched: false,
            },
        })
    }

    /// Remove entries older than `max_age`. Returns how many were removed.
    ///
    /// Entries only go stale when a post/failure handler never ran (host
    /// crash mid-call), so this runs at session boundaries, not per call.
    pub fn sweep(&self, max_age: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let stale = std::fs::read_to_string(entry.path())
                .ok()
                .and_then(|c| serde_json::from_str::<PendingEntry>(&c).ok())
                .map(|e| e.started_at_ms <= cutoff)
                // Unreadable entries are stale by definition
                .unwrap_or(true);
            if stale && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn entry_path(&self, key: &CorrelationKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

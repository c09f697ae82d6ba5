// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock-free statistics aggregation.
//!
//! Many handler processes produce [`StatsDelta`] records by appending to the
//! deltas stream; nothing ever reads-modifies-writes it, so no lock is
//! needed. A single consumer folds the stream into [`SessionStats`] at
//! defined checkpoints (session stop, session end): the pending file is
//! first renamed to a private consumed file, then folded into the previously
//! persisted stats, the new total is persisted via atomic replace, and the
//! consumed file is deleted. Re-running a reduce is cheap and never double
//! counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::{Doc, SessionStore, Stream};

/// Filename the pending deltas stream is renamed to while being consumed.
const CONSUMED_FILE: &str = "deltas.consumed.ndjson";

/// One completed call's contribution to cumulative statistics.
/// Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsDelta {
    pub tool: String,
    pub tokens: u64,
    pub error: bool,
    pub duration_ms: u64,
}

/// Per-tool cumulative counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub calls: u64,
    pub errors: u64,
    pub tokens: u64,
    pub duration_ms: u64,
}

/// Cumulative session counters, derived as the fold of all deltas.
///
/// Never authored directly: always recomputed by reduction and persisted as
/// a whole-file replace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub calls: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    pub by_tool: BTreeMap<String, ToolStats>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            calls: 0,
            errors: 0,
            error_rate: 0.0,
            total_tokens: 0,
            total_duration_ms: 0,
            by_tool: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl SessionStats {
    /// Fold one delta into the totals.
    pub fn fold(&mut self, delta: &StatsDelta) {
        self.calls += 1;
        if delta.error {
            self.errors += 1;
        }
        self.total_tokens += delta.tokens;
        self.total_duration_ms += delta.duration_ms;

        let tool = self.by_tool.entry(delta.tool.clone()).or_default();
        tool.calls += 1;
        if delta.error {
            tool.errors += 1;
        }
        tool.tokens += delta.tokens;
        tool.duration_ms += delta.duration_ms;
    }

    /// Recompute derived fields after folding.
    pub fn finish(&mut self) {
        self.error_rate = if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64
        };
        self.updated_at = Utc::now();
    }
}

/// Append one delta to the session's pending stream.
pub fn record(store: &SessionStore, delta: &StatsDelta) -> Result<(), StoreError> {
    store.append(Stream::Deltas, delta)
}

/// Fold all not-yet-consumed deltas into the persisted stats.
///
/// Consume-then-fold: the pending stream is atomically renamed out of the
/// producers' way before reading, so deltas appended during the reduce land
/// in a fresh pending file and are picked up by the next checkpoint. A
/// leftover consumed file from an interrupted reduce is folded before the
/// pending stream is touched.
pub fn reduce(store: &SessionStore) -> Result<SessionStats, StoreError> {
    let pending = store.path().join(Stream::Deltas.filename());
    let consumed = store.path().join(CONSUMED_FILE);

    let mut stats: SessionStats = store.read_doc(Doc::Stats)?.unwrap_or_default();

    // An interrupted earlier reduce may have left a consumed file behind;
    // fold it first so its deltas are not lost.
    if consumed.exists() {
        fold_file(&consumed, &mut stats)?;
        stats.finish();
        store.replace(Doc::Stats, &stats)?;
        std::fs::remove_file(&consumed)?;
    }

    if pending.exists() {
        std::fs::rename(&pending, &consumed)?;
        fold_file(&consumed, &mut stats)?;
        stats.finish();
        store.replace(Doc::Stats, &stats)?;
        std::fs::remove_file(&consumed)?;
    } else if store.read_doc::<SessionStats>(Doc::Stats)?.is_none() {
        // Zero calls still yields a defined stats document
        stats.finish();
        store.replace(Doc::Stats, &stats)?;
    }

    Ok(stats)
}

fn fold_file(path: &std::path::Path, stats: &mut SessionStats) -> Result<(), StoreError> {
    let content = std::fs::read_to_string(path)?;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StatsDelta>(line) {
            Ok(delta) => stats.fold(&delta),
            Err(e) => tracing::warn!("Skipping malformed delta: {}", e),
        }
    }
    Ok(())
}

/// Token-equivalent size estimate for arbitrary text (roughly four
/// characters per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

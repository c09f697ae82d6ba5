// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File-based session storage.
//!
//! Each session owns a directory of independent append-only NDJSON streams
//! plus two whole-file JSON documents (metadata and cumulative statistics).
//! Appends are a single small write to an append-mode file handle, safe for
//! concurrent handler processes. Whole-file documents are never rewritten in
//! place: they go through a private temporary file and an atomic rename so a
//! concurrent reader can never observe a partial document.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

use super::types::{Alert, SessionSummary};

/// Append-only record streams within a session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Tool invocation trace records.
    ToolTraces,
    /// Model/API call trace records.
    ModelTraces,
    /// Normalized spans (synthesized or ingested).
    Spans,
    /// Security and DLP events.
    Security,
    /// Not-yet-reduced statistics deltas.
    Deltas,
}

impl Stream {
    pub fn filename(&self) -> &'static str {
        match self {
            Stream::ToolTraces => "tool_traces.ndjson",
            Stream::ModelTraces => "model_traces.ndjson",
            Stream::Spans => "spans.ndjson",
            Stream::Security => "security.ndjson",
            Stream::Deltas => "deltas.ndjson",
        }
    }
}

/// Whole-file JSON documents within a session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Doc {
    Meta,
    Stats,
    /// Indicator kinds already turned into alerts for this session.
    AlertLedger,
    /// How far into the collector export ingestion has consumed.
    IngestCursor,
}

impl Doc {
    pub fn filename(&self) -> &'static str {
        match self {
            Doc::Meta => "meta.json",
            Doc::Stats => "stats.json",
            Doc::AlertLedger => "alerted.json",
            Doc::IngestCursor => "ingest_cursor.json",
        }
    }
}

/// Storage for one session's record set.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open (creating if needed) the store for a session.
    pub fn open(sessions_root: &Path, session_id: &str) -> Result<Self, StoreError> {
        let dir = sessions_root.join(session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The session directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Directory holding ephemeral correlation entries.
    pub fn pending_dir(&self) -> PathBuf {
        self.dir.join("pending")
    }

    /// Append one record as a single NDJSON line.
    pub fn append<T: Serialize>(&self, stream: Stream, record: &T) -> Result<(), StoreError> {
        append_line(&self.dir.join(stream.filename()), record)
    }

    /// Read every well-formed record from a stream.
    ///
    /// Malformed lines are skipped record-by-record, never fatally: a
    /// half-written trailing line from a concurrent writer must not poison
    /// the rest of the stream.
    pub fn read_stream<T: DeserializeOwned>(&self, stream: Stream) -> Result<Vec<T>, StoreError> {
        read_lines(&self.dir.join(stream.filename()))
    }

    /// Atomically replace a whole-file document.
    pub fn replace<T: Serialize>(&self, doc: Doc, value: &T) -> Result<(), StoreError> {
        atomic_replace(&self.dir, doc.filename(), value)
    }

    /// Read a whole-file document, `None` if it does not exist yet.
    pub fn read_doc<T: DeserializeOwned>(&self, doc: Doc) -> Result<Option<T>, StoreError> {
        let path = self.dir.join(doc.filename());
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Storage shared across sessions: alerts, history, and the baseline.
#[derive(Debug, Clone)]
pub struct GlobalStore {
    root: PathBuf,
}

/// Filename of the cross-session alerts stream.
pub const ALERTS_FILE: &str = "alerts.ndjson";

/// Filename of the cross-session history stream.
pub const HISTORY_FILE: &str = "history.ndjson";

/// Filename of the rebuildable baseline document.
pub const BASELINE_FILE: &str = "baseline.json";

impl GlobalStore {
    /// Open (creating if needed) the global store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root.join("sessions"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Open the per-session store for `session_id`.
    pub fn session(&self, session_id: &str) -> Result<SessionStore, StoreError> {
        SessionStore::open(&self.sessions_dir(), session_id)
    }

    pub fn append_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        append_line(&self.root.join(ALERTS_FILE), alert)
    }

    pub fn read_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        read_lines(&self.root.join(ALERTS_FILE))
    }

    pub fn append_history(&self, summary: &SessionSummary) -> Result<(), StoreError> {
        append_line(&self.root.join(HISTORY_FILE), summary)
    }

    pub fn read_history(&self) -> Result<Vec<SessionSummary>, StoreError> {
        read_lines(&self.root.join(HISTORY_FILE))
    }

    /// Atomically replace the baseline document.
    pub fn write_baseline<T: Serialize>(&self, baseline: &T) -> Result<(), StoreError> {
        atomic_replace(&self.root, BASELINE_FILE, baseline)
    }

    pub fn read_baseline<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        let path = self.root.join(BASELINE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove session directories older than `max_age_days`.
    ///
    /// Age is taken from the directory's modification time so sessions that
    /// never wrote an end timestamp still get pruned eventually.
    pub fn prune_sessions(&self, max_age_days: u32) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
        let mut removed = 0;

        for entry in std::fs::read_dir(self.sessions_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let modified: chrono::DateTime<Utc> = modified.into();
            if modified < cutoff {
                if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                    tracing::warn!("Failed to prune session {:?}: {}", entry.path(), e);
                } else {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

/// Append one serialized record plus newline with a single write call.
fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Read all well-formed NDJSON records from a file, skipping bad lines.
fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping malformed record in {:?}: {}", path, e),
        }
    }
    Ok(records)
}

/// Write `value` to a private temp file in `dir` and atomically rename it
/// over `filename`.
pub(crate) fn atomic_replace<T: Serialize>(
    dir: &Path,
    filename: &str,
    value: &T,
) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(dir.join(filename))
        .map_err(|e| StoreError::ReplaceFailed {
            name: filename.to_string(),
            message: e.error.to_string(),
        })?;

    Ok(())
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace span synthesis and merging.
//!
//! A session is served by exactly one of two sources, decided once at
//! session start and never re-evaluated mid-session: [`synth`] builds spans
//! locally from matched hook events (Tier 0), [`ingest`] normalizes the
//! export output of an external collector (Tier 1). Mixing the two would
//! double count the same logical call, so the tier is cached in the session
//! metadata and every emission path checks it.

pub mod ingest;
pub mod synth;
pub mod tier;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use ingest::ingest_export;
pub use synth::{emit_agent_span, emit_tool_span, span_identity};
pub use tier::detect_tier;

/// Span kind, shared by both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Internal,
    Tool,
    Agent,
    Chat,
}

/// Span status, shared by both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

/// Where a span came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Synthesized,
    Ingested,
}

/// One timed unit of work in a session's trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub status: SpanStatus,
    pub provenance: Provenance,
}

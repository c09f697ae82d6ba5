// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local span synthesis (Tier 0).
//!
//! Each matched tool invocation becomes one span: pre-event time as start,
//! post-event time as end. Nesting is approximated with a "current parent"
//! pointer persisted in the session directory and updated on every
//! emission - each new span is parented to the previously emitted one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlate::CompletedCall;
use crate::error::StoreError;
use crate::session::{SessionStore, Stream};

use super::{Provenance, Span, SpanKind, SpanStatus};

/// File holding the most recently emitted span id.
const PARENT_FILE: &str = "current_parent.json";

#[derive(Debug, Serialize, Deserialize)]
struct ParentPointer {
    span_id: String,
}

/// Derive a span's kind and name from the tool it observes.
///
/// Sub-agent dispatch is tagged as an agent-invocation span and model calls
/// as chat spans so the trace reads like the conversation it traces.
pub fn span_identity(tool: &str) -> (SpanKind, String) {
    let lower = tool.to_lowercase();
    if lower.contains("task") || lower.contains("agent") {
        (SpanKind::Agent, "invoke_agent".to_string())
    } else if lower.contains("chat") || lower.contains("completion") || lower.contains("llm") {
        (SpanKind::Chat, format!("chat {}", lower))
    } else {
        (SpanKind::Tool, format!("tool {}", lower))
    }
}

/// Emit one span for a completed tool call.
pub fn emit_tool_span(
    store: &SessionStore,
    call: &CompletedCall,
    tool: &str,
    error: bool,
    attributes: BTreeMap<String, String>,
) -> Result<Span, StoreError> {
    let (kind, name) = span_identity(tool);
    let span = Span {
        trace_id: call.trace_id.clone(),
        span_id: Uuid::new_v4().simple().to_string(),
        parent_span_id: take_parent(store),
        name,
        kind,
        start_ms: call.started_at_ms,
        end_ms: call.ended_at_ms,
        duration_ms: call.elapsed_ms,
        attributes,
        status: if error { SpanStatus::Error } else { SpanStatus::Ok },
        provenance: Provenance::Synthesized,
    };

    store.append(Stream::Spans, &span)?;
    set_parent(store, &span.span_id);
    Ok(span)
}

/// Emit a zero-length marker span for a sub-agent boundary event.
pub fn emit_agent_span(
    store: &SessionStore,
    trace_id: &str,
    attributes: BTreeMap<String, String>,
) -> Result<Span, StoreError> {
    let now = Utc::now().timestamp_millis();
    let span = Span {
        trace_id: trace_id.to_string(),
        span_id: Uuid::new_v4().simple().to_string(),
        parent_span_id: take_parent(store),
        name: "invoke_agent".to_string(),
        kind: SpanKind::Agent,
        start_ms: now,
        end_ms: now,
        duration_ms: 0,
        attributes,
        status: SpanStatus::Ok,
        provenance: Provenance::Synthesized,
    };

    store.append(Stream::Spans, &span)?;
    set_parent(store, &span.span_id);
    Ok(span)
}

fn parent_path(store: &SessionStore) -> PathBuf {
    store.path().join(PARENT_FILE)
}

fn take_parent(store: &SessionStore) -> Option<String> {
    std::fs::read_to_string(parent_path(store))
        .ok()
        .and_then(|c| serde_json::from_str::<ParentPointer>(&c).ok())
        .map(|p| p.span_id)
}

fn set_parent(store: &SessionStore, span_id: &str) {
    let pointer = ParentPointer {
        span_id: span_id.to_string(),
    };
    // Best effort: a lost parent pointer only flattens the trace
    if let Ok(content) = serde_json::to_string(&pointer) {
        let _ = std::fs::write(parent_path(store), content);
    }
}

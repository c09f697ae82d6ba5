// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! External collector ingestion (Tier 1).
//!
//! The collector appends OTLP-JSON export batches (one per line) to a known
//! file. Ingestion parses each batch, converts unix-nano times to
//! milliseconds, filters to spans whose start falls inside the session
//! window, flattens nested attribute lists into a flat map, maps integer
//! kind and status codes onto the Tier 0 enums, and appends the result
//! tagged `ingested`. Malformed batches and records are skipped one by one,
//! never fatally.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::session::{Doc, SessionStore, Stream};

use super::{Provenance, Span, SpanKind, SpanStatus};

/// High-water mark into the collector export, persisted per session so a
/// re-run of the ingest checkpoint never re-appends spans it already took.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IngestCursor {
    offset: usize,
}

/// Ingest every not-yet-consumed span batch in `export_path` that falls
/// inside the session window. Returns the number of spans appended.
///
/// Idempotent: only content past the persisted cursor is read, and the
/// cursor advances to the end of what was read. A shrunken export (rotated
/// by the collector) resets the cursor to the start.
pub fn ingest_export(
    store: &SessionStore,
    export_path: &Path,
    window_start: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let content = match std::fs::read_to_string(export_path) {
        Ok(c) => c,
        // A vanished export is an empty one, not a failure
        Err(_) => return Ok(0),
    };

    let cursor: IngestCursor = store.read_doc(Doc::IngestCursor)?.unwrap_or_default();
    let fresh = match content.get(cursor.offset..) {
        Some(rest) => rest,
        None => content.as_str(),
    };

    let window_start_ms = window_start.timestamp_millis();
    let window_end_ms = Utc::now().timestamp_millis();
    let mut appended = 0;

    for line in fresh.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let batch: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Skipping malformed span batch: {}", e);
                continue;
            }
        };

        for raw in batch_spans(&batch) {
            match normalize_span(raw) {
                Some(span) if span.start_ms >= window_start_ms && span.start_ms <= window_end_ms => {
                    store.append(Stream::Spans, &span)?;
                    appended += 1;
                }
                Some(_) => {} // outside the session window
                None => tracing::warn!("Skipping malformed span record"),
            }
        }
    }

    store.replace(
        Doc::IngestCursor,
        &IngestCursor {
            offset: content.len(),
        },
    )?;
    Ok(appended)
}

/// Walk resourceSpans -> scopeSpans -> spans, tolerating the older
/// instrumentationLibrarySpans field name.
fn batch_spans(batch: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    let resource_spans = batch
        .get("resourceSpans")
        .and_then(Value::as_array)
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    for rs in resource_spans {
        let scopes = rs
            .get("scopeSpans")
            .or_else(|| rs.get("instrumentationLibrarySpans"))
            .and_then(Value::as_array)
            .map(|a| a.as_slice())
            .unwrap_or(&[]);
        for scope in scopes {
            if let Some(spans) = scope.get("spans").and_then(Value::as_array) {
                out.extend(spans.iter());
            }
        }
    }

    out
}

fn normalize_span(raw: &Value) -> Option<Span> {
    let trace_id = raw.get("traceId")?.as_str()?.to_string();
    let span_id = raw.get("spanId")?.as_str()?.to_string();
    let name = raw.get("name")?.as_str()?.to_string();

    let start_ns = nano_field(raw.get("startTimeUnixNano")?)?;
    let end_ns = nano_field(raw.get("endTimeUnixNano")?)?;
    let start_ms = (start_ns / 1_000_000) as i64;
    let end_ms = (end_ns / 1_000_000) as i64;

    let parent_span_id = raw
        .get("parentSpanId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let attributes = flatten_attributes(raw.get("attributes"));
    let kind = map_kind(
        raw.get("kind").and_then(Value::as_u64).unwrap_or(0),
        &name,
        &attributes,
    );
    let status = map_status(
        raw.get("status")
            .and_then(|s| s.get("code"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
    );

    Some(Span {
        trace_id,
        span_id,
        parent_span_id,
        name,
        kind,
        start_ms,
        end_ms,
        duration_ms: end_ms.saturating_sub(start_ms).max(0) as u64,
        attributes,
        status,
        provenance: Provenance::Ingested,
    })
}

/// OTLP encodes nano timestamps as either a JSON number or a string.
fn nano_field(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Flatten the OTLP `[{key, value: {stringValue | intValue | ...}}]` list
/// into a flat string map. Entries with unsupported value shapes are
/// dropped, not fatal.
fn flatten_attributes(attributes: Option<&Value>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let Some(list) = attributes.and_then(Value::as_array) else {
        return map;
    };

    for attr in list {
        let Some(key) = attr.get("key").and_then(Value::as_str) else {
            continue;
        };
        let Some(value) = attr.get("value") else {
            continue;
        };
        let flat = value
            .get("stringValue")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| value.get("intValue").map(scalar_to_string))
            .or_else(|| value.get("doubleValue").map(scalar_to_string))
            .or_else(|| value.get("boolValue").map(scalar_to_string));
        if let Some(flat) = flat {
            map.insert(key.to_string(), flat);
        }
    }

    map
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map OTLP span kind integers onto the Tier 0 enumeration. Attribute
/// content wins over the wire code when it identifies the operation.
fn map_kind(code: u64, name: &str, attributes: &BTreeMap<String, String>) -> SpanKind {
    if attributes.contains_key("tool.name") {
        return SpanKind::Tool;
    }
    if name.starts_with("invoke_agent") || attributes.contains_key("agent.name") {
        return SpanKind::Agent;
    }
    match code {
        // SPAN_KIND_CLIENT: outbound model/API calls
        3 => SpanKind::Chat,
        _ => SpanKind::Internal,
    }
}

fn map_status(code: u64) -> SpanStatus {
    match code {
        1 => SpanStatus::Ok,
        2 => SpanStatus::Error,
        _ => SpanStatus::Unset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (SessionStore, TempDir) {
        let temp = TempDir::new().unwrap();
        (SessionStore::open(temp.path(), "s1").unwrap(), temp)
    }

    fn batch(spans: &str) -> String {
        format!(
            r#"{{"resourceSpans":[{{"scopeSpans":[{{"spans":[{}]}}]}}]}}"#,
            spans
        )
    }

    // One line: the export is NDJSON, a batch must never span lines.
    fn span_json(trace: &str, span: &str, start_ns: u64, end_ns: u64) -> String {
        format!(
            r#"{{"traceId":"{trace}","spanId":"{span}","name":"tool bash","startTimeUnixNano":{start_ns},"endTimeUnixNano":{end_ns},"kind":3,"status":{{"code":1}},"attributes":[{{"key":"tool.name","value":{{"stringValue":"bash"}}}},{{"key":"tokens","value":{{"intValue":42}}}}]}}"#
        )
    }

    #[test]
    fn test_ingest_normalizes_spans() {
        let (store, temp) = test_store();
        let export = temp.path().join("spans.ndjson");

        let window_start = Utc::now() - chrono::Duration::seconds(60);
        let now_ns = Utc::now().timestamp_millis() as u64 * 1_000_000;
        std::fs::write(&export, batch(&span_json("t1", "s1", now_ns, now_ns + 5_000_000)) + "\n")
            .unwrap();

        let count = ingest_export(&store, &export, window_start).unwrap();
        assert_eq!(count, 1);

        let spans: Vec<Span> = store.read_stream(Stream::Spans).unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.provenance, Provenance::Ingested);
        // tool.name attribute wins over the client kind code
        assert_eq!(span.kind, SpanKind::Tool);
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.duration_ms, 5);
        assert_eq!(span.attributes["tool.name"], "bash");
        assert_eq!(span.attributes["tokens"], "42");
    }

    #[test]
    fn test_ingest_filters_session_window() {
        let (store, temp) = test_store();
        let export = temp.path().join("spans.ndjson");

        let window_start = Utc::now() - chrono::Duration::seconds(60);
        let old_ns = (Utc::now() - chrono::Duration::hours(2)).timestamp_millis() as u64 * 1_000_000;
        std::fs::write(&export, batch(&span_json("t1", "s1", old_ns, old_ns + 1_000_000)) + "\n")
            .unwrap();

        let count = ingest_export(&store, &export, window_start).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_ingest_skips_malformed_batches() {
        let (store, temp) = test_store();
        let export = temp.path().join("spans.ndjson");

        let window_start = Utc::now() - chrono::Duration::seconds(60);
        let now_ns = Utc::now().timestamp_millis() as u64 * 1_000_000;
        let content = format!(
            "not json at all\n{}\n{}\n",
            batch(r#"{"traceId":"t1"}"#), // missing required fields
            batch(&span_json("t2", "s2", now_ns, now_ns))
        );
        std::fs::write(&export, content).unwrap();

        let count = ingest_export(&store, &export, window_start).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reingest_takes_only_new_content() {
        let (store, temp) = test_store();
        let export = temp.path().join("spans.ndjson");

        let window_start = Utc::now() - chrono::Duration::seconds(60);
        let now_ns = Utc::now().timestamp_millis() as u64 * 1_000_000;
        std::fs::write(&export, batch(&span_json("t1", "s1", now_ns, now_ns)) + "\n").unwrap();

        assert_eq!(ingest_export(&store, &export, window_start).unwrap(), 1);
        // A second pass over the same export appends nothing
        assert_eq!(ingest_export(&store, &export, window_start).unwrap(), 0);
        let spans: Vec<Span> = store.read_stream(Stream::Spans).unwrap();
        assert_eq!(spans.len(), 1);

        // New batch appended after the cursor is picked up alone
        let mut content = std::fs::read_to_string(&export).unwrap();
        content.push_str(&(batch(&span_json("t1", "s2", now_ns, now_ns)) + "\n"));
        std::fs::write(&export, content).unwrap();

        assert_eq!(ingest_export(&store, &export, window_start).unwrap(), 1);
        let spans: Vec<Span> = store.read_stream(Stream::Spans).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].span_id, "s2");
    }

    #[test]
    fn test_rotated_export_resets_cursor() {
        let (store, temp) = test_store();
        let export = temp.path().join("spans.ndjson");

        let window_start = Utc::now() - chrono::Duration::seconds(60);
        let now_ns = Utc::now().timestamp_millis() as u64 * 1_000_000;
        let long = batch(&span_json("t1", "s1", now_ns, now_ns)) + "\n"
            + &batch(&span_json("t1", "s2", now_ns, now_ns))
            + "\n";
        std::fs::write(&export, long).unwrap();
        assert_eq!(ingest_export(&store, &export, window_start).unwrap(), 2);

        // Collector rotated: the file is shorter than the saved offset
        std::fs::write(&export, batch(&span_json("t2", "s3", now_ns, now_ns)) + "\n").unwrap();
        assert_eq!(ingest_export(&store, &export, window_start).unwrap(), 1);
    }

    #[test]
    fn test_ingest_missing_export_is_zero() {
        let (store, temp) = test_store();
        let export = temp.path().join("gone.ndjson");
        assert_eq!(ingest_export(&store, &export, Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_string_encoded_nanos() {
        assert_eq!(nano_field(&serde_json::json!("1700000000000000000")), Some(1_700_000_000_000_000_000));
        assert_eq!(nano_field(&serde_json::json!(12345u64)), Some(12345));
        assert_eq!(nano_field(&serde_json::json!("nope")), None);
    }

    #[test]
    fn test_status_and_kind_mapping() {
        assert_eq!(map_status(0), SpanStatus::Unset);
        assert_eq!(map_status(1), SpanStatus::Ok);
        assert_eq!(map_status(2), SpanStatus::Error);

        let empty = BTreeMap::new();
        assert_eq!(map_kind(3, "request", &empty), SpanKind::Chat);
        assert_eq!(map_kind(1, "work", &empty), SpanKind::Internal);
        assert_eq!(map_kind(0, "invoke_agent worker", &empty), SpanKind::Agent);
    }
}

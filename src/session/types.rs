// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session record types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::Severity;

/// Collection tier for a session, decided once at session start.
///
/// `Local` synthesizes spans from matched hook events; `Collector` ingests
/// and normalizes the output of an external trace collector. The two are
/// mutually exclusive for a session's lifetime so the same logical call is
/// never counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Collector,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Local
    }
}

/// Per-session metadata, persisted as a whole-file JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub cwd: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub tier: Tier,
}

impl SessionMeta {
    pub fn new(id: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            ended_at: None,
            cwd,
            git_branch: None,
            git_commit: None,
            tier: Tier::Local,
        }
    }
}

/// Lifecycle phase of a tool invocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pre,
    Post,
    Failure,
    Subagent,
}

/// One tool invocation record in the trace stream.
///
/// Pre and post/failure records for the same logical call share a
/// correlation key; a post record whose pre record was never seen carries
/// `incomplete: true` rather than failing the invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub trace_id: String,
    pub tool: String,
    pub correlation_key: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_excerpt: Option<String>,
    #[serde(rename = "_incomplete", default, skip_serializing_if = "is_false")]
    pub incomplete: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Cross-session alert, appended to the global alerts stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub kind: String,
    pub message: String,
    pub session_id: String,
}

impl Alert {
    pub fn new(
        severity: Severity,
        kind: impl Into<String>,
        message: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            kind: kind.into(),
            message: message.into(),
            session_id: session_id.into(),
        }
    }
}

/// One finalized record per completed session, appended to the global
/// history stream and consumed by the baseline builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub ended_at: DateTime<Utc>,
    pub calls: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    /// Total security events recorded during the session.
    #[serde(default)]
    pub security_events: u64,
    /// CRITICAL security events recorded during the session.
    #[serde(default)]
    pub critical_events: u64,
    /// Security event counts keyed by tool name.
    #[serde(default)]
    pub events_by_tool: BTreeMap<String, u64>,
    /// Security event counts keyed by severity label.
    #[serde(default)]
    pub events_by_severity: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&Tier::Collector).unwrap();
        assert_eq!(json, "\"collector\"");
        let tier: Tier = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(tier, Tier::Local);
    }

    #[test]
    fn test_incomplete_flag_rename() {
        let inv = ToolInvocation {
            trace_id: "t1".to_string(),
            tool: "bash".to_string(),
            correlation_key: "abc".to_string(),
            phase: Phase::Post,
            timestamp: Utc::now(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: None,
            error: false,
            error_excerpt: None,
            incomplete: true,
        };
        let json = serde_json::to_string(&inv).unwrap();
        assert!(json.contains("\"_incomplete\":true"));

        // The flag is omitted entirely for matched records
        let matched = ToolInvocation {
            incomplete: false,
            ..inv
        };
        let json = serde_json::to_string(&matched).unwrap();
        assert!(!json.contains("_incomplete"));
    }

    #[test]
    fn test_session_meta_defaults() {
        let meta = SessionMeta::new("s1", PathBuf::from("/tmp"));
        assert_eq!(meta.tier, Tier::Local);
        assert!(meta.ended_at.is_none());
    }
}

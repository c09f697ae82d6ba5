// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hook boundary: event payloads, outcomes, and the fail-open wrapper.
//!
//! The binary is invoked once per lifecycle event with a JSON payload on
//! stdin. Everything inside the boundary is fail-open: an observability
//! failure must never break the tool call it observes, so every handler
//! error except an explicit security denial is logged and swallowed. The
//! only signal the host ever sees is the process exit code plus an optional
//! control document on stdout.

pub mod handlers;

use std::io::Read;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::error::HookError;

pub use handlers::{
    on_post_tool, on_pre_tool, on_session_end, on_session_start, on_session_stop,
    on_subagent_stop, on_tool_failure,
};

/// Event payload supplied by the host on stdin.
///
/// Every field is optional; handlers require what they need and fall back
/// where the contract allows it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub transcript_path: Option<PathBuf>,
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Value,
    pub error: Option<String>,
}

impl HookInput {
    /// Parse a payload from a reader, tolerating an empty stream.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, HookError> {
        let mut raw = String::new();
        reader
            .read_to_string(&mut raw)
            .map_err(|e| HookError::MalformedPayload(e.to_string()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn require_tool(&self) -> Result<&str, HookError> {
        self.tool_name
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HookError::MissingContext("tool_name".to_string()))
    }
}

/// What the handler tells the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Proceed normally.
    Continue,
    /// Block the pending tool call.
    Deny { reason: String },
}

impl HookOutcome {
    /// Exit code the process should return for this outcome. Denial uses 2
    /// so hosts distinguish it from ordinary failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HookOutcome::Continue => 0,
            HookOutcome::Deny { .. } => 2,
        }
    }

    /// Control document for stdout, `None` when nothing needs saying.
    pub fn control_json(&self) -> Option<String> {
        match self {
            HookOutcome::Continue => None,
            HookOutcome::Deny { reason } => Some(
                serde_json::json!({
                    "decision": "block",
                    "reason": reason,
                })
                .to_string(),
            ),
        }
    }
}

/// Run a handler fail-open.
///
/// A denial passes through untouched; every error becomes `Continue` after
/// a log line. The observed tool call must never fail because observation
/// did.
pub fn run(handler: impl FnOnce() -> Result<HookOutcome, HookError>) -> HookOutcome {
    match handler() {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Hook handler failed (continuing): {}", e);
            HookOutcome::Continue
        }
    }
}

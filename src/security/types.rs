// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Security event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordinal risk level. Ordering matters: `Critical` compares greatest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What kind of check produced a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    CommandRisk,
    SensitiveWrite,
    DlpInput,
    DlpOutput,
    StaticScan,
}

/// Whether the event was merely recorded or the call was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    Logged,
    Blocked,
}

/// One security event in the per-session security stream.
///
/// The excerpt is always sanitized: secret values are masked and the text is
/// length-capped before it ever touches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub category: SecurityCategory,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub excerpt: String,
    pub action: SecurityAction,
}

impl SecurityEvent {
    pub fn new(
        category: SecurityCategory,
        severity: Severity,
        tool: Option<String>,
        excerpt: impl Into<String>,
        action: SecurityAction,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            severity,
            tool,
            excerpt: excerpt.into(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(
            [Severity::Medium, Severity::Critical, Severity::Low]
                .iter()
                .max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_severity_serde() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        let s: Severity = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(s, Severity::Low);
    }
}

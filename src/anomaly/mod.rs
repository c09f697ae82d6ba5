// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Anomaly detection against a learned baseline.
//!
//! The baseline is a per-tool historical distribution of security-event
//! frequency and severity, rebuilt on demand from the cross-session history
//! stream and read-only during a session. The check runs once, at session
//! stop, and only ever produces descriptive indicators - alerting is the
//! caller's job, blocking is nobody's.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::security::{SecurityEvent, Severity};
use crate::session::SessionSummary;
use crate::stats::SessionStats;

/// Per-tool slice of the baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolBaseline {
    pub events: u64,
    pub by_severity: BTreeMap<String, u64>,
}

/// Historical security-event distribution across recent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub built_at: DateTime<Utc>,
    pub window_days: u32,
    /// Sessions inside the window the baseline was computed from.
    pub sessions: u64,
    pub avg_events_per_session: f64,
    pub by_tool: BTreeMap<String, ToolBaseline>,
}

impl Baseline {
    /// Whether the baseline predates its own recency window.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.built_at;
        age > chrono::Duration::days(i64::from(self.window_days))
    }
}

/// Build a baseline from the session history, restricted to the recency
/// window.
pub fn build_baseline(history: &[SessionSummary], window_days: u32) -> Baseline {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(window_days));
    let recent: Vec<&SessionSummary> =
        history.iter().filter(|s| s.ended_at >= cutoff).collect();

    let mut by_tool: BTreeMap<String, ToolBaseline> = BTreeMap::new();
    let mut total_events = 0u64;

    for summary in &recent {
        total_events += summary.security_events;
        for (tool, count) in &summary.events_by_tool {
            by_tool.entry(tool.clone()).or_default().events += count;
        }
        // History keeps the severity split per session, not per tool, so
        // apportion it across tools by their share of the session's events.
        if summary.security_events == 0 {
            continue;
        }
        for (severity, count) in &summary.events_by_severity {
            for (tool, tool_count) in &summary.events_by_tool {
                let share = (*count as f64 * *tool_count as f64
                    / summary.security_events as f64)
                    .round() as u64;
                if share > 0 {
                    *by_tool
                        .entry(tool.clone())
                        .or_default()
                        .by_severity
                        .entry(severity.clone())
                        .or_insert(0) += share;
                }
            }
        }
    }

    let sessions = recent.len() as u64;
    Baseline {
        built_at: Utc::now(),
        window_days,
        sessions,
        avg_events_per_session: if sessions == 0 {
            0.0
        } else {
            total_events as f64 / sessions as f64
        },
        by_tool,
    }
}

/// Descriptive anomaly tag. Never a blocking decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnomalyIndicator {
    CriticalEvents {
        count: u64,
    },
    EventVolume {
        observed: u64,
        baseline_avg: f64,
    },
    ErrorRate {
        rate: f64,
        calls: u64,
    },
    TokenUsage {
        tokens: u64,
        cap: u64,
    },
}

impl AnomalyIndicator {
    /// Stable kind tag for the alert stream.
    pub fn kind(&self) -> &'static str {
        match self {
            AnomalyIndicator::CriticalEvents { .. } => "critical_events",
            AnomalyIndicator::EventVolume { .. } => "event_volume",
            AnomalyIndicator::ErrorRate { .. } => "error_rate",
            AnomalyIndicator::TokenUsage { .. } => "token_usage",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AnomalyIndicator::CriticalEvents { .. } => Severity::Critical,
            AnomalyIndicator::EventVolume { .. } => Severity::High,
            AnomalyIndicator::ErrorRate { .. } => Severity::Medium,
            AnomalyIndicator::TokenUsage { .. } => Severity::Medium,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AnomalyIndicator::CriticalEvents { count } => {
                format!("{} critical security event(s) this session", count)
            }
            AnomalyIndicator::EventVolume { observed, baseline_avg } => format!(
                "{} security events vs baseline average {:.1}",
                observed, baseline_avg
            ),
            AnomalyIndicator::ErrorRate { rate, calls } => {
                format!("error rate {:.0}% across {} calls", rate * 100.0, calls)
            }
            AnomalyIndicator::TokenUsage { tokens, cap } => {
                format!("{} tokens used, over the {} cap", tokens, cap)
            }
        }
    }
}

/// Compare a session's counters against the baseline and fixed thresholds.
pub fn check(
    stats: &SessionStats,
    events: &[SecurityEvent],
    baseline: Option<&Baseline>,
    config: &ResolvedConfig,
) -> Vec<AnomalyIndicator> {
    let mut indicators = Vec::new();

    let critical = events
        .iter()
        .filter(|e| e.severity == Severity::Critical)
        .count() as u64;
    if critical > 0 {
        indicators.push(AnomalyIndicator::CriticalEvents { count: critical });
    }

    if let Some(baseline) = baseline {
        let observed = events.len() as u64;
        let threshold = baseline.avg_events_per_session * config.baseline_multiplier;
        if baseline.sessions > 0 && observed as f64 > threshold && observed > 0 {
            indicators.push(AnomalyIndicator::EventVolume {
                observed,
                baseline_avg: baseline.avg_events_per_session,
            });
        }
    }

    if stats.calls >= config.error_rate_min_calls
        && stats.error_rate > config.error_rate_threshold
    {
        indicators.push(AnomalyIndicator::ErrorRate {
            rate: stats.error_rate,
            calls: stats.calls,
        });
    }

    if stats.total_tokens > config.token_cap {
        indicators.push(AnomalyIndicator::TokenUsage {
            tokens: stats.total_tokens,
            cap: config.token_cap,
        });
    }

    indicators
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{SecurityAction, SecurityCategory};

    fn summary(events: u64, days_ago: i64) -> SessionSummary {
        SessionSummary {
            session_id: format!("s-{}", days_ago),
            ended_at: Utc::now() - chrono::Duration::days(days_ago),
            calls: 20,
            errors: 1,
            error_rate: 0.05,
            total_tokens: 10_000,
            total_duration_ms: 60_000,
            security_events: events,
            critical_events: 0,
            events_by_tool: BTreeMap::from([("bash".to_string(), events)]),
            events_by_severity: BTreeMap::from([("MEDIUM".to_string(), events)]),
        }
    }

    fn event(severity: Severity) -> SecurityEvent {
        SecurityEvent::new(
            SecurityCategory::CommandRisk,
            severity,
            Some("bash".to_string()),
            "curl ****",
            SecurityAction::Logged,
        )
    }

    fn quiet_stats() -> SessionStats {
        SessionStats {
            calls: 20,
            errors: 1,
            error_rate: 0.05,
            total_tokens: 10_000,
            total_duration_ms: 60_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_baseline_averages() {
        let history = vec![summary(4, 1), summary(6, 2), summary(2, 3)];
        let baseline = build_baseline(&history, 30);

        assert_eq!(baseline.sessions, 3);
        assert!((baseline.avg_events_per_session - 4.0).abs() < f64::EPSILON);
        assert_eq!(baseline.by_tool["bash"].events, 12);
    }

    #[test]
    fn test_build_baseline_respects_window() {
        let history = vec![summary(4, 1), summary(100, 90)];
        let baseline = build_baseline(&history, 30);

        assert_eq!(baseline.sessions, 1);
        assert!((baseline.avg_events_per_session - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_history_baseline() {
        let baseline = build_baseline(&[], 30);
        assert_eq!(baseline.sessions, 0);
        assert_eq!(baseline.avg_events_per_session, 0.0);
    }

    #[test]
    fn test_quiet_session_no_indicators() {
        let baseline = build_baseline(&[summary(4, 1), summary(4, 2)], 30);
        let events: Vec<SecurityEvent> = (0..4).map(|_| event(Severity::Medium)).collect();

        let indicators = check(
            &quiet_stats(),
            &events,
            Some(&baseline),
            &ResolvedConfig::default(),
        );
        assert!(indicators.is_empty());
    }

    #[test]
    fn test_one_critical_event_always_flags() {
        let baseline = build_baseline(&[summary(4, 1)], 30);
        let events = vec![event(Severity::Critical)];

        let indicators = check(
            &quiet_stats(),
            &events,
            Some(&baseline),
            &ResolvedConfig::default(),
        );
        assert!(indicators
            .iter()
            .any(|i| matches!(i, AnomalyIndicator::CriticalEvents { count: 1 })));
    }

    #[test]
    fn test_event_volume_over_twice_baseline() {
        let baseline = build_baseline(&[summary(2, 1), summary(2, 2)], 30);
        let events: Vec<SecurityEvent> = (0..5).map(|_| event(Severity::Medium)).collect();

        let indicators = check(
            &quiet_stats(),
            &events,
            Some(&baseline),
            &ResolvedConfig::default(),
        );
        assert!(indicators
            .iter()
            .any(|i| matches!(i, AnomalyIndicator::EventVolume { observed: 5, .. })));
    }

    #[test]
    fn test_error_rate_needs_call_floor() {
        let mut stats = quiet_stats();
        stats.calls = 5;
        stats.errors = 4;
        stats.error_rate = 0.8;

        // Below the minimum call floor: small-sample noise, no indicator
        let indicators = check(&stats, &[], None, &ResolvedConfig::default());
        assert!(indicators.is_empty());

        stats.calls = 20;
        stats.errors = 16;
        stats.error_rate = 0.8;
        let indicators = check(&stats, &[], None, &ResolvedConfig::default());
        assert!(indicators
            .iter()
            .any(|i| matches!(i, AnomalyIndicator::ErrorRate { .. })));
    }

    #[test]
    fn test_token_cap() {
        let mut stats = quiet_stats();
        stats.total_tokens = 600_000;

        let indicators = check(&stats, &[], None, &ResolvedConfig::default());
        assert!(indicators
            .iter()
            .any(|i| matches!(i, AnomalyIndicator::TokenUsage { .. })));
    }

    #[test]
    fn test_indicator_messages() {
        let indicator = AnomalyIndicator::CriticalEvents { count: 2 };
        assert!(indicator.message().contains("2 critical"));
        assert_eq!(indicator.severity(), Severity::Critical);
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Command risk classification.
//!
//! An explicit ordered rule list evaluated top to bottom, first match wins.
//! The list is ordered by tier (CRITICAL, then HIGH, then MEDIUM), so a
//! command matching rules in several tiers always classifies at the highest
//! one. Anything unmatched is LOW. This path runs before the tool executes
//! and can gate it, so every pattern is pre-compiled.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::Severity;

/// One classification rule: a pre-compiled predicate and the severity it
/// assigns.
pub struct CommandRule {
    pub severity: Severity,
    pub label: &'static str,
    pattern: Lazy<Regex>,
}

macro_rules! rule {
    ($severity:expr, $label:expr, $pattern:expr) => {
        CommandRule {
            severity: $severity,
            label: $label,
            pattern: Lazy::new(|| Regex::new($pattern).unwrap()),
        }
    };
}

/// The ordered rule list. Order is the contract: do not sort or dedup.
static COMMAND_RULES: [CommandRule; 17] = [
    // ── CRITICAL: data exfiltration shapes ─────────────────────────────
    rule!(
        Severity::Critical,
        "outbound upload",
        r"(?i)\bcurl\b[^|;&]*(?:-X\s*POST|--data\b|-d\s|--data-raw|--upload-file|-T\s|-F\s)"
    ),
    rule!(
        Severity::Critical,
        "outbound upload",
        r"(?i)\bwget\b[^|;&]*--post-(?:data|file)"
    ),
    rule!(
        Severity::Critical,
        "reverse shell",
        r"(?i)/dev/(?:tcp|udp)/"
    ),
    rule!(
        Severity::Critical,
        "reverse shell",
        r"(?i)\bnc\b[^|;&]*\s(?:-e\s|-c\s)"
    ),
    rule!(
        Severity::Critical,
        "credential read",
        r"(?i)\b(?:cat|less|head|tail|more|grep|cp|scp|rsync)\b[^|;&]*(?:\.aws/credentials|\.ssh/id_|/etc/shadow|\.gnupg/)"
    ),
    rule!(
        Severity::Critical,
        "remote code execution",
        r"(?i)\b(?:curl|wget)\b[^|;&]*\|\s*(?:bash|sh|zsh)\b"
    ),
    rule!(
        Severity::Critical,
        "encoded execution",
        r"(?i)\bbase64\b[^|;&]*(?:-d|--decode)[^|;&]*\|\s*(?:bash|sh)\b"
    ),
    rule!(Severity::Critical, "dynamic eval", r#"(?i)\beval\s+["$`]"#),
    // ── HIGH: escalation and credential exposure ───────────────────────
    rule!(
        Severity::High,
        "privilege escalation",
        r"(?i)\b(?:sudo|doas|pkexec)\b"
    ),
    rule!(
        Severity::High,
        "environment dump",
        r"(?i)\bprintenv\b|(?:^|[;&|]\s*)env\s*(?:$|[;&|>])"
    ),
    rule!(
        Severity::High,
        "credential file read",
        r"(?i)\b(?:cat|grep|less)\b[^|;&]*\.env\b"
    ),
    rule!(
        Severity::High,
        "recursive permission loosening",
        r"(?i)\bchmod\b\s+(?:-R|--recursive)\s+(?:777|a\+rwx)"
    ),
    rule!(
        Severity::High,
        "credential archive",
        r"(?i)\b(?:tar|zip|7z)\b[^|;&]*(?:\.ssh\b|\.aws\b|\.gnupg\b)"
    ),
    // ── MEDIUM: network, installs, interpreters, permissions ───────────
    rule!(
        Severity::Medium,
        "outbound network",
        r"(?i)\b(?:curl|wget|nc|ncat|telnet)\b"
    ),
    rule!(
        Severity::Medium,
        "package install",
        r"(?i)\b(?:pip3?|npm|pnpm|yarn|cargo|gem|apt(?:-get)?|dnf|brew)\s+(?:install|add)\b"
    ),
    rule!(
        Severity::Medium,
        "inline interpreter",
        r"(?i)\b(?:python3?|node|ruby|perl)\b\s+-[ce]\s"
    ),
    rule!(
        Severity::Medium,
        "permission change",
        r"(?i)\b(?:chmod|chown)\b"
    ),
];

/// Classify a command, returning the severity and the label of the matching
/// rule (`None` for the LOW default).
pub fn classify_command(text: &str) -> (Severity, Option<&'static str>) {
    for rule in &COMMAND_RULES {
        if rule.pattern.is_match(text) {
            return (rule.severity, Some(rule.label));
        }
    }
    (Severity::Low, None)
}

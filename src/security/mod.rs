// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Security and DLP classification.
//!
//! Three layers, deliberately separate:
//!
//! - **Classification** ([`command`], [`secrets`]): pure pattern evaluation,
//!   assigns severities and categorical findings, never decides anything.
//! - **Policy** ([`policy`]): turns classifications into allow/flag/deny
//!   decisions under the configured toggles.
//! - **Static scanning** ([`scanner`]): batch analysis of plugin files with
//!   the same pattern families plus prompt-injection detection.

pub mod command;
pub mod policy;
pub mod scanner;
pub mod secrets;
mod types;

pub use command::classify_command;
pub use policy::{evaluate_command, evaluate_write, is_sensitive_path, Decision, GatePolicy};
pub use scanner::{scan_plugin, FindingFamily, ScanFinding, ScanReport};
pub use secrets::{redact, sanitize_excerpt, scan_for_secrets, SecretFinding, SecretKind};
pub use types::{SecurityAction, SecurityCategory, SecurityEvent, Severity};

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracewatch - observability and security sidecar for AI coding agents.
//!
//! Tracewatch is invoked by an agent host once per lifecycle hook event
//! (session start, pre/post tool, tool failure, sub-agent stop, session
//! stop/end). Each invocation is an independent short-lived process; all
//! coordination happens through append-only files under the data directory.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and resolution
//! - [`session`] - Session identity, metadata, and file-based storage
//! - [`correlate`] - Cross-process matching of call starts to call ends
//! - [`stats`] - Append-many/reduce-once statistics aggregation
//! - [`trace`] - Span synthesis (Tier 0) and collector ingestion (Tier 1)
//! - [`security`] - Command gating, DLP scanning, and offline plugin scans
//! - [`anomaly`] - Baseline building and end-of-session anomaly checks
//! - [`hooks`] - The hook boundary: payloads, handlers, fail-open wrapper
//!
//! # Design rules
//!
//! Observation must never break the observed call: handlers are fail-open,
//! stream reads skip malformed lines, whole-file documents are replaced
//! atomically. Secret values never reach the store; findings are
//! categorical with masked excerpts.

pub mod anomaly;
pub mod config;
pub mod correlate;
pub mod error;
pub mod hooks;
pub mod security;
pub mod session;
pub mod stats;
pub mod trace;

// Re-export commonly used types at crate root
pub use config::{load_config, ResolvedConfig};
pub use error::{ConfigError, HookError, Result, ScanError, StoreError};
pub use hooks::{HookInput, HookOutcome};
pub use security::{Decision, SecurityEvent, Severity};
pub use session::{SessionContext, SessionMeta, Tier};

/// Tracewatch version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _config = ResolvedConfig::default();
        let _outcome = HookOutcome::Continue;
    }
}

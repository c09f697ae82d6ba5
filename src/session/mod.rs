// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session state: context resolution, record types, and the file store.
//!
//! A session is the unit of scope for all telemetry and security state. Its
//! record set lives in one directory of append-only NDJSON streams plus two
//! atomically replaced JSON documents, shared by every handler process.

mod context;
mod store;
mod types;

pub use context::{git_metadata, resolve_cwd, SessionContext, DEFAULT_SESSION_ID, SESSION_ID_ENV};
pub use store::{Doc, GlobalStore, SessionStore, Stream, ALERTS_FILE, BASELINE_FILE, HISTORY_FILE};
pub use types::{Alert, Phase, SessionMeta, SessionSummary, Tier, ToolInvocation};

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Collection tier detection.
//!
//! Cheap existence and liveness checks, run once at session start; the
//! result is cached in the session metadata and holds for the session's
//! lifetime. Tier 1 (collector) wins iff the collector's export location
//! exists and either its owning process is alive or the export already
//! contains data written during this run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::session::Tier;

/// Pid file the collector writes next to its export output.
pub const COLLECTOR_PID_FILE: &str = "collector.pid";

/// Default export location under the data directory.
pub fn default_export_path(data_dir: &Path) -> PathBuf {
    data_dir.join("otel").join("spans.ndjson")
}

/// Look for an external collector and pick the session's tier.
pub fn detect_tier(export_path: &Path, session_start: DateTime<Utc>) -> Tier {
    if !export_path.exists() {
        return Tier::Local;
    }

    if collector_alive(export_path) {
        return Tier::Collector;
    }

    // Dead or unknown collector process, but the export may already hold
    // data for this run.
    if export_written_since(export_path, session_start) {
        return Tier::Collector;
    }

    Tier::Local
}

fn collector_alive(export_path: &Path) -> bool {
    let pid_path = match export_path.parent() {
        Some(dir) => dir.join(COLLECTOR_PID_FILE),
        None => return false,
    };
    let pid = match std::fs::read_to_string(&pid_path) {
        Ok(content) => match content.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    process_alive(pid)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

fn export_written_since(export_path: &Path, since: DateTime<Utc>) -> bool {
    let modified = match export_path.metadata().and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let modified: DateTime<Utc> = modified.into();
    // A non-empty export touched at or after session start counts as data
    // for this run.
    modified >= since
        && export_path
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_export_is_local() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("otel").join("spans.ndjson");
        assert_eq!(detect_tier(&export, Utc::now()), Tier::Local);
    }

    #[test]
    fn test_fresh_export_data_is_collector() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("spans.ndjson");
        let session_start = Utc::now() - chrono::Duration::seconds(60);
        std::fs::write(&export, "{}\n").unwrap();

        assert_eq!(detect_tier(&export, session_start), Tier::Collector);
    }

    #[test]
    fn test_stale_empty_export_is_local() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("spans.ndjson");
        std::fs::write(&export, "").unwrap();

        // Empty export, no live pid: stale leftovers from an earlier run
        let future_start = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(detect_tier(&export, future_start), Tier::Local);
    }

    #[cfg(unix)]
    #[test]
    fn test_live_collector_pid_is_collector() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("spans.ndjson");
        std::fs::write(&export, "").unwrap();
        // Our own pid is certainly alive
        std::fs::write(
            temp.path().join(COLLECTOR_PID_FILE),
            std::process::id().to_string(),
        )
        .unwrap();

        let future_start = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(detect_tier(&export, future_start), Tier::Collector);
    }

    #[test]
    fn test_garbage_pid_file_ignored() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("spans.ndjson");
        std::fs::write(&export, "").unwrap();
        std::fs::write(temp.path().join(COLLECTOR_PID_FILE), "not-a-pid").unwrap();

        let future_start = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(detect_tier(&export, future_start), Tier::Local);
    }
}

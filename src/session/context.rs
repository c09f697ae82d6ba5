// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session context resolution.
//!
//! Hook handlers run as independent short-lived processes, so the active
//! session cannot live in process-global state. This module is the single
//! place where host-supplied identity (event payload, then environment) is
//! turned into a [`SessionContext`] value; every component takes the context
//! as an explicit argument.

use std::path::{Path, PathBuf};

use crate::config::ResolvedConfig;
use crate::error::StoreError;

use super::store::{GlobalStore, SessionStore};

/// Environment fallback for the session identifier when the event payload
/// does not carry one.
pub const SESSION_ID_ENV: &str = "TRACEWATCH_SESSION_ID";

/// Session identifier used when neither the payload nor the environment
/// supplies one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Resolved per-invocation context handed to every component.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub config: ResolvedConfig,
    global: GlobalStore,
    store: SessionStore,
}

impl SessionContext {
    /// Resolve a context from the host-supplied session id and configuration.
    ///
    /// Identity resolution order: explicit id from the event payload, then
    /// the `TRACEWATCH_SESSION_ID` environment variable, then a fixed
    /// default.
    pub fn resolve(
        session_id: Option<&str>,
        config: ResolvedConfig,
    ) -> Result<Self, StoreError> {
        let session_id = session_id
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(SESSION_ID_ENV).ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        let global = GlobalStore::open(&config.data_dir)?;
        let store = global.session(&session_id)?;

        Ok(Self {
            session_id,
            config,
            global,
            store,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn global(&self) -> &GlobalStore {
        &self.global
    }
}

/// Read git branch and commit for a working directory without spawning git.
///
/// Parses `.git/HEAD` directly: a symbolic ref yields a branch name and the
/// commit behind it, a bare hash yields a detached commit only.
pub fn git_metadata(cwd: &Path) -> (Option<String>, Option<String>) {
    let head_path = cwd.join(".git").join("HEAD");
    let head = match std::fs::read_to_string(&head_path) {
        Ok(content) => content.trim().to_string(),
        Err(_) => return (None, None),
    };

    if let Some(refname) = head.strip_prefix("ref: ") {
        let branch = refname
            .strip_prefix("refs/heads/")
            .map(str::to_string)
            .or_else(|| Some(refname.to_string()));
        let commit = std::fs::read_to_string(cwd.join(".git").join(refname))
            .ok()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        (branch, commit)
    } else if head.len() >= 40 {
        // Detached HEAD
        (None, Some(head))
    } else {
        (None, None)
    }
}

/// Resolve the working directory: payload value first, else the process cwd.
pub fn resolve_cwd(payload_cwd: Option<&Path>) -> PathBuf {
    payload_cwd
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> ResolvedConfig {
        ResolvedConfig {
            data_dir: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_explicit_id() {
        let temp = TempDir::new().unwrap();
        let ctx = SessionContext::resolve(Some("abc-123"), test_config(temp.path())).unwrap();
        assert_eq!(ctx.session_id, "abc-123");
        assert!(ctx.store().path().ends_with("abc-123"));
    }

    #[test]
    fn test_resolve_defaults_without_id() {
        let temp = TempDir::new().unwrap();
        // Explicitly empty id falls through to the fixed default (the env
        // fallback is not set in the test environment).
        let ctx = SessionContext::resolve(Some(""), test_config(temp.path())).unwrap();
        assert!(!ctx.session_id.is_empty());
    }

    #[test]
    fn test_git_metadata_missing_repo() {
        let temp = TempDir::new().unwrap();
        let (branch, commit) = git_metadata(temp.path());
        assert!(branch.is_none());
        assert!(commit.is_none());
    }

    #[test]
    fn test_git_metadata_symbolic_ref() {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(
            git_dir.join("refs/heads/main"),
            "0123456789abcdef0123456789abcdef01234567\n",
        )
        .unwrap();

        let (branch, commit) = git_metadata(temp.path());
        assert_eq!(branch.as_deref(), Some("main"));
        assert_eq!(
            commit.as_deref(),
            Some("0123456789abcdef0123456789abcdef01234567")
        );
    }

    #[test]
    fn test_git_metadata_detached() {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(
            git_dir.join("HEAD"),
            "fedcba9876543210fedcba9876543210fedcba98\n",
        )
        .unwrap();

        let (branch, commit) = git_metadata(temp.path());
        assert!(branch.is_none());
        assert!(commit.is_some());
    }
}

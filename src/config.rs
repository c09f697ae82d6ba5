// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading and resolution.
//!
//! Configuration is layered: defaults, then `~/.tracewatch/config.json`, then
//! `TRACEWATCH_*` environment variable overrides. The rest of the crate only
//! ever sees the fully resolved form - concrete booleans and numbers, never
//! optional fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".tracewatch";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Partial configuration as written by the user.
///
/// Every field is optional; anything absent falls back to the defaults in
/// [`ResolvedConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Root directory for all tracewatch state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Enable DLP scanning of tool inputs and outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlp_enabled: Option<bool>,

    /// Enable the pre-execution command risk gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_enabled: Option<bool>,

    /// Convert CRITICAL classifications into deny decisions
    /// (logging-only when false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_enabled: Option<bool>,

    /// Days to keep finished session directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,

    /// Recency window for baseline building, in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_window_days: Option<u32>,

    /// Error rate above which a session is flagged (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate_threshold: Option<f64>,

    /// Minimum calls before the error rate threshold applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate_min_calls: Option<u64>,

    /// Absolute token usage cap for anomaly flagging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_cap: Option<u64>,

    /// Multiplier over the baseline per-session event average
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_multiplier: Option<f64>,

    /// Override for the external collector's span export file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_export_path: Option<PathBuf>,
}

/// Fully resolved configuration consumed by every component.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub dlp_enabled: bool,
    pub gate_enabled: bool,
    pub block_enabled: bool,
    pub retention_days: u32,
    pub baseline_window_days: u32,
    pub error_rate_threshold: f64,
    pub error_rate_min_calls: u64,
    pub token_cap: u64,
    pub baseline_multiplier: f64,
    pub collector_export_path: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(GLOBAL_CONFIG_DIR);
        Self {
            data_dir,
            dlp_enabled: true,
            gate_enabled: true,
            block_enabled: false,
            retention_days: 30,
            baseline_window_days: 30,
            error_rate_threshold: 0.2,
            error_rate_min_calls: 10,
            token_cap: 500_000,
            baseline_multiplier: 2.0,
            collector_export_path: None,
        }
    }
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load a partial configuration from a JSON file.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(ConfigError::from)
}

/// Load and resolve configuration: defaults, config file, env overrides.
pub fn load_config() -> ResolvedConfig {
    let file = get_global_config_path()
        .filter(|p| p.exists())
        .and_then(|p| match load_config_file(&p) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file: {}", e);
                None
            }
        })
        .unwrap_or_default();

    resolve(file)
}

/// Merge a partial config and environment overrides onto the defaults.
pub fn resolve(file: FileConfig) -> ResolvedConfig {
    let mut resolved = ResolvedConfig::default();

    if let Some(dir) = file.data_dir {
        resolved.data_dir = dir;
    }
    if let Some(v) = file.dlp_enabled {
        resolved.dlp_enabled = v;
    }
    if let Some(v) = file.gate_enabled {
        resolved.gate_enabled = v;
    }
    if let Some(v) = file.block_enabled {
        resolved.block_enabled = v;
    }
    if let Some(v) = file.retention_days {
        resolved.retention_days = v;
    }
    if let Some(v) = file.baseline_window_days {
        resolved.baseline_window_days = v;
    }
    if let Some(v) = file.error_rate_threshold {
        resolved.error_rate_threshold = v;
    }
    if let Some(v) = file.error_rate_min_calls {
        resolved.error_rate_min_calls = v;
    }
    if let Some(v) = file.token_cap {
        resolved.token_cap = v;
    }
    if let Some(v) = file.baseline_multiplier {
        resolved.baseline_multiplier = v;
    }
    if let Some(v) = file.collector_export_path {
        resolved.collector_export_path = Some(v);
    }

    apply_env_overrides(&mut resolved);
    resolved
}

fn apply_env_overrides(resolved: &mut ResolvedConfig) {
    if let Ok(dir) = std::env::var("TRACEWATCH_DATA_DIR") {
        if !dir.is_empty() {
            resolved.data_dir = PathBuf::from(dir);
        }
    }
    if let Some(v) = env_bool("TRACEWATCH_DLP") {
        resolved.dlp_enabled = v;
    }
    if let Some(v) = env_bool("TRACEWATCH_GATE") {
        resolved.gate_enabled = v;
    }
    if let Some(v) = env_bool("TRACEWATCH_BLOCK") {
        resolved.block_enabled = v;
    }
    if let Ok(path) = std::env::var("TRACEWATCH_OTEL_EXPORT") {
        if !path.is_empty() {
            resolved.collector_export_path = Some(PathBuf::from(path));
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracewatch main entry point - CLI and hook dispatch.
//!
//! Stdout is reserved for the host protocol on hook invocations: the only
//! thing ever printed there is the control document for a denial. All
//! diagnostics go through tracing to stderr.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use tracewatch::anomaly;
use tracewatch::config::{load_config, ResolvedConfig};
use tracewatch::hooks::{self, HookInput};
use tracewatch::security::{scan_plugin, Severity};
use tracewatch::session::{Doc, GlobalStore, SessionContext};
use tracewatch::stats::SessionStats;

/// Tracewatch - observability and security sidecar for AI coding agents.
#[derive(Parser)]
#[command(name = "tracewatch")]
#[command(
    author,
    version,
    about = "Observability and security sidecar for AI coding agents",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for tracewatch.
#[derive(Subcommand)]
enum Commands {
    /// Handle a lifecycle hook event (payload expected on stdin)
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },
    /// Manage the anomaly baseline
    Baseline {
        #[command(subcommand)]
        command: BaselineCommand,
    },
    /// Scan a plugin directory offline for risky content
    Scan {
        /// Directory to scan
        path: PathBuf,
        /// Print the report as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show cumulative statistics for a session
    Stats {
        /// Session identifier (defaults to the active session)
        #[arg(short, long)]
        session: Option<String>,
        /// Print statistics as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Lifecycle hook events, one subcommand per host hook.
#[derive(Subcommand, Clone, Copy)]
enum HookEvent {
    /// A new session has started
    SessionStart,
    /// A tool call is about to execute
    PreTool,
    /// A tool call completed successfully
    PostTool,
    /// A tool call failed
    ToolFailure,
    /// A sub-agent finished
    SubagentStop,
    /// The session's main loop stopped (may resume)
    SessionStop,
    /// The session ended for good
    SessionEnd,
}

#[derive(Subcommand)]
enum BaselineCommand {
    /// Rebuild the baseline from the session history
    Rebuild,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Commands::Hook { event } => handle_hook(event, config),
        Commands::Baseline {
            command: BaselineCommand::Rebuild,
        } => handle_baseline_rebuild(&config),
        Commands::Scan { path, json } => handle_scan(&path, json),
        Commands::Stats { session, json } => handle_stats(session.as_deref(), config, json),
    }
}

/// Dispatch one hook event and exit with the outcome's code.
///
/// Everything inside the fail-open wrapper, including payload parsing and
/// context resolution: a broken payload or an unwritable data directory
/// must not fail the observed tool call.
fn handle_hook(event: HookEvent, config: ResolvedConfig) -> anyhow::Result<()> {
    let outcome = hooks::run(|| {
        let input = HookInput::from_reader(std::io::stdin().lock())?;
        let ctx = SessionContext::resolve(input.session_id.as_deref(), config)?;

        match event {
            HookEvent::SessionStart => hooks::on_session_start(&ctx, &input),
            HookEvent::PreTool => hooks::on_pre_tool(&ctx, &input),
            HookEvent::PostTool => hooks::on_post_tool(&ctx, &input),
            HookEvent::ToolFailure => hooks::on_tool_failure(&ctx, &input),
            HookEvent::SubagentStop => hooks::on_subagent_stop(&ctx, &input),
            HookEvent::SessionStop => hooks::on_session_stop(&ctx, &input),
            HookEvent::SessionEnd => hooks::on_session_end(&ctx, &input),
        }
    });

    if let Some(control) = outcome.control_json() {
        println!("{}", control);
    }
    std::process::exit(outcome.exit_code());
}

fn handle_baseline_rebuild(config: &ResolvedConfig) -> anyhow::Result<()> {
    let global = GlobalStore::open(&config.data_dir)?;
    let history = global.read_history()?;
    let baseline = anomaly::build_baseline(&history, config.baseline_window_days);
    global.write_baseline(&baseline)?;

    println!(
        "{} {} session(s) in the {}-day window, {:.1} events/session average",
        "Baseline rebuilt:".green().bold(),
        baseline.sessions,
        baseline.window_days,
        baseline.avg_events_per_session,
    );
    Ok(())
}

fn handle_scan(path: &Path, json: bool) -> anyhow::Result<()> {
    let report = scan_plugin(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Scanned {} file(s) in {}",
            report.files_scanned,
            report.target.display()
        );
        println!("Risk: {}", severity_colored(report.risk));
        for finding in &report.findings {
            println!(
                "  [{}] {} ({}): {}",
                severity_colored(finding.severity),
                finding.label,
                finding.file.display(),
                finding.excerpt,
            );
        }
        if report.findings.is_empty() {
            println!("{}", "No findings.".green());
        }
    }

    // Nonzero exit for HIGH or worse so CI pipelines can gate on it
    if report.risk >= Severity::High {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_stats(
    session: Option<&str>,
    config: ResolvedConfig,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = SessionContext::resolve(session, config)?;
    let stats: SessionStats = ctx
        .store()
        .read_doc(Doc::Stats)?
        .unwrap_or_default();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} {}", "Session:".bold(), ctx.session_id);
    println!(
        "  calls: {}  errors: {}  error rate: {:.1}%",
        stats.calls,
        stats.errors,
        stats.error_rate * 100.0
    );
    println!(
        "  tokens: {}  duration: {}ms",
        stats.total_tokens, stats.total_duration_ms
    );
    for (tool, t) in &stats.by_tool {
        println!(
            "  {} calls: {}  errors: {}  tokens: {}",
            tool.cyan(),
            t.calls,
            t.errors,
            t.tokens
        );
    }
    Ok(())
}

fn severity_colored(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => severity.label().red().bold(),
        Severity::High => severity.label().red(),
        Severity::Medium => severity.label().yellow(),
        Severity::Low => severity.label().green(),
    }
}

fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        // Let env var control logging
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        // Default to WARN level
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::WARN)
            .init();
    }
}

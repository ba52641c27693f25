// checkgraph-cli/src/main.rs
// ============================================================================
// Module: Checkgraph CLI Entry Point
// Description: Command dispatcher for running a check-execution config
//              through the engine and printing the grouped result.
// Purpose: A thin host binary: load config, build collaborators, drive
//          `WaveScheduler::execute_grouped_checks`, render JSON.
// Dependencies: checkgraph-config, checkgraph-core, checkgraph-providers,
//               clap, serde_json, tokio
// ============================================================================

//! ## Overview
//! Grounded in the teacher's `decision-gate-cli`: a `clap`-derived command
//! dispatcher, trimmed to the one command this workspace specifies
//! (`checkgraph run`) — no MCP server, no runpack signing, no SDK
//! generation, none of which has a counterpart in this spec.

mod collaborators;

use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use checkgraph_core::interfaces::NullTelemetry;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::runtime::DenyAllPermissions;
use checkgraph_core::runtime::GroupedResults;
use checkgraph_core::runtime::ResultEntry;
use checkgraph_core::runtime::RunOutcome;
use checkgraph_core::runtime::WaveScheduler;
use checkgraph_core::runtime::scheduler::RunInputs;
use checkgraph_providers::CheckgraphProviderRegistry;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use collaborators::InMemoryStore;
use collaborators::NoOpAnalyzer;
use collaborators::PassthroughTemplater;
use serde_json::Value as JsonValue;

/// `checkgraph`: a DAG-based check-execution engine CLI.
#[derive(Debug, Parser)]
#[command(name = "checkgraph", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Loads a config file and runs the selected checks against an event.
    Run(RunArgs),
}

/// The inbound event a run is evaluating against, mirrored for `clap`'s
/// `ValueEnum` since `EventTrigger` itself stays dependency-free of `clap`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliEvent {
    PrOpened,
    PrUpdated,
    IssueOpened,
    IssueComment,
    Manual,
    Schedule,
}

impl From<CliEvent> for EventTrigger {
    fn from(value: CliEvent) -> Self {
        match value {
            CliEvent::PrOpened => Self::PrOpened,
            CliEvent::PrUpdated => Self::PrUpdated,
            CliEvent::IssueOpened => Self::IssueOpened,
            CliEvent::IssueComment => Self::IssueComment,
            CliEvent::Manual => Self::Manual,
            CliEvent::Schedule => Self::Schedule,
        }
    }
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Path to the config document (YAML or JSON).
    #[arg(long)]
    config: PathBuf,
    /// Event the run is evaluating against.
    #[arg(long, value_enum, default_value = "manual")]
    event: CliEvent,
    /// Comma-separated check ids to select; defaults to every check in the
    /// config that's eligible for `--event`.
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,
    /// Overrides the config's `fail_fast` to `true`.
    #[arg(long)]
    fail_fast: bool,
    /// Causes the engine facade to return an error if any check produced a
    /// qualifying error issue (spec §7 "strict mode").
    #[arg(long)]
    strict: bool,
    /// Retains provider debug metadata on result entries.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> ExitCode {
    let mut config = match checkgraph_config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            write_stderr_line(&format!("config error: {err}"));
            return ExitCode::FAILURE;
        }
    };

    let event: EventTrigger = args.event.into();
    let selected: BTreeSet<CheckId> = if args.select.is_empty() {
        config.checks.iter().filter(|(_, check)| check.eligible_for_event(event)).map(|(id, _)| id.clone()).collect()
    } else {
        args.select.iter().map(|s| CheckId::new(s.trim())).collect()
    };

    if args.fail_fast {
        config.fail_fast = true;
    }

    let scheduler = WaveScheduler::new(
        Arc::new(CheckgraphProviderRegistry::with_builtins()),
        Arc::new(InMemoryStore::new()),
        Arc::new(PassthroughTemplater),
        Arc::new(NoOpAnalyzer),
        Arc::new(NullTelemetry),
        Arc::new(DenyAllPermissions),
    );

    let inputs = RunInputs {
        pr: None,
        files: None,
        env: std::env::vars().collect(),
        webhook_context: None,
        test_mode: false,
        provider_debug: args.debug,
        strict_mode: args.strict,
    };

    match scheduler.execute_grouped_checks(&config, selected, event, inputs).await {
        Ok(outcome) => {
            let rendered = serde_json::to_string_pretty(&render_outcome(&outcome)).unwrap_or_default();
            write_stdout_line(&rendered);
            ExitCode::SUCCESS
        }
        Err(err) => {
            write_stderr_line(&format!("run error: {err}"));
            ExitCode::FAILURE
        }
    }
}

/// Writes a single line to stdout, matching the teacher's boundary of
/// allowing raw stdout writes only in the CLI binary, never `println!`
/// directly (workspace lints deny `clippy::print_stdout`).
fn write_stdout_line(message: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{message}");
}

/// Writes a single line to stderr, for the same reason as [`write_stdout_line`].
fn write_stderr_line(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{message}");
}

/// Converts [`RunOutcome`] to JSON by hand: rendering is a host concern
/// (spec §1), so the result/entry types in `checkgraph-core` intentionally
/// don't carry a `Serialize` impl of their own.
fn render_outcome(outcome: &RunOutcome) -> JsonValue {
    serde_json::json!({
        "results": render_grouped_results(&outcome.results),
        "statistics": serde_json::to_value(&outcome.statistics).unwrap_or(JsonValue::Null),
        "history": &outcome.history,
    })
}

fn render_grouped_results(results: &GroupedResults) -> JsonValue {
    let mut groups = serde_json::Map::new();
    for (group, entries) in &results.0 {
        groups.insert(group.clone(), JsonValue::Array(entries.iter().map(render_entry).collect()));
    }
    JsonValue::Object(groups)
}

fn render_entry(entry: &ResultEntry) -> JsonValue {
    serde_json::json!({
        "check_name": entry.check_name.as_str(),
        "content": entry.content,
        "group": entry.group,
        "output": entry.output,
        "issues": entry.issues,
        "debug": entry.debug,
    })
}

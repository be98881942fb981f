use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use extract_queue_batch::{
    BatchOrchestrator, OutputFormat, QueueConfig, SystemProcessRunner, build_batch_report,
    failure_code_summary, format_report,
};
use extract_queue_core::{
    FailureCode, InputQueue, ProgressEvent, RunOutcome, split_drop_payload,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "extract_queue=info,warn";

#[derive(Debug, Parser)]
#[command(name = "extract-queue")]
#[command(about = "Run an ACARS extraction tool over a queue of input files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process queued input files one at a time.
    Run(RunArgs),
    /// Split a drag-and-drop payload into paths, one per line.
    SplitDrop(SplitDropArgs),
    /// Write a default queue configuration file.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Input files, processed in the given order.
    inputs: Vec<PathBuf>,
    /// Drag-and-drop payload appended after the positional inputs.
    /// Wrap paths containing spaces in braces: `{C:/My Logs/a.log}`.
    #[arg(long)]
    drop: Option<String>,
    /// Extraction tool executable (overrides the config file).
    #[arg(long)]
    exe: Option<PathBuf>,
    /// Queue configuration YAML file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write artifacts here instead of next to each input.
    #[arg(long)]
    output_dir: Option<String>,
    /// Do not pass -pretty.
    #[arg(long)]
    no_pretty: bool,
    /// Do not pass -all.
    #[arg(long)]
    no_all: bool,
    /// Pass -stats (dropped automatically for builds that reject it).
    #[arg(long)]
    stats: bool,
    /// Kill a tool process after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Write a batch report to this file. Without an extension, the
    /// format's own extension is added.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Report format.
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct SplitDropArgs {
    /// Raw payload text.
    payload: String,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Configuration file to create.
    #[arg(long)]
    output: PathBuf,
    /// Executable to record instead of the platform default.
    #[arg(long)]
    exe: Option<PathBuf>,
    /// Replace an existing file.
    #[arg(long)]
    force: bool,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run_batch(args),
        Command::SplitDrop(args) => run_split_drop(args),
        Command::InitConfig(args) => run_init_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run_batch(args: RunArgs) -> Result<(), String> {
    let mut settings = match &args.config {
        Some(path) => QueueConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))?,
        None => QueueConfig::default(),
    };
    apply_overrides(&mut settings, &args);
    check_executable(&settings.executable)?;

    let (queue, missing) = build_queue(&args.inputs, args.drop.as_deref());
    for path in &missing {
        eprintln!("[WARN] Not found: {}", path.display());
    }
    if queue.is_empty() {
        return Err("Queue is empty: add one or more input files".to_string());
    }

    let run_config = settings
        .to_run_configuration()
        .map_err(|err| err.to_string())?;
    let mut runner = SystemProcessRunner::new();
    if let Some(limit) = settings.process_timeout() {
        runner = runner.with_timeout(limit);
    }
    let orchestrator =
        BatchOrchestrator::with_runner(run_config.clone(), runner).map_err(|err| err.to_string())?;

    let items = queue.snapshot();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Queue length: {}\n", items.len())
        .map_err(|err| format!("Failed to write output: {err}"))?;

    let handle = orchestrator
        .spawn(items)
        .map_err(|err| format!("Failed to start batch: {err}"))?;
    for event in handle.events() {
        let written = out
            .write_all(render_event(&event).as_bytes())
            .and_then(|()| out.flush());
        if let Err(err) = written {
            handle.cancel();
            return Err(format!("Failed to write output: {err}"));
        }
    }
    let summary = handle.join().map_err(|err| err.to_string())?;

    let report = build_batch_report(&run_config, &summary);
    if let Some(path) = &args.report {
        let path = report_path(path, args.format);
        let raw = format_report(&report, args.format).map_err(|err| err.to_string())?;
        fs::write(&path, raw)
            .map_err(|err| format!("Failed to write '{}': {err}", path.display()))?;
    }

    if summary.failed() > 0 {
        let breakdown: Vec<String> = failure_code_summary(&report)
            .iter()
            .map(|(code, count)| format!("{count} {code}"))
            .collect();
        return Err(format!(
            "{} of {} item(s) failed ({})",
            summary.failed(),
            summary.total(),
            breakdown.join(", ")
        ));
    }

    Ok(())
}

fn run_split_drop(args: SplitDropArgs) -> Result<(), String> {
    for path in split_drop_payload(&args.payload) {
        println!("{path}");
    }
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<(), String> {
    if args.output.exists() && !args.force {
        return Err(format!(
            "'{}' already exists; pass --force to replace it",
            args.output.display()
        ));
    }
    let mut settings = QueueConfig::default();
    if let Some(exe) = args.exe {
        settings.executable = exe;
    }
    settings
        .save(&args.output)
        .map_err(|err| format!("Failed to write '{}': {err}", args.output.display()))?;
    println!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Layers command-line flags over the file settings.
fn apply_overrides(settings: &mut QueueConfig, args: &RunArgs) {
    if let Some(exe) = &args.exe {
        settings.executable = exe.clone();
    }
    if let Some(dir) = &args.output_dir {
        settings.output_dir = Some(dir.clone());
    }
    if args.no_pretty {
        settings.flags.pretty = false;
    }
    if args.no_all {
        settings.flags.all = false;
    }
    if args.stats {
        settings.flags.stats = true;
    }
    if args.timeout_secs.is_some() {
        settings.process.timeout_secs = args.timeout_secs;
    }
}

fn report_path(path: &Path, format: OutputFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}

/// Rejects an empty executable, or a path-qualified one that does not exist.
/// Bare names are left to the `PATH` lookup at launch time.
fn check_executable(exe: &Path) -> Result<(), String> {
    if exe.as_os_str().is_empty() {
        return Err("Select the extraction tool executable with --exe".to_string());
    }
    let has_directory = exe.parent().is_some_and(|dir| !dir.as_os_str().is_empty());
    if has_directory && !exe.exists() {
        return Err(format!("Executable not found: {}", exe.display()));
    }
    Ok(())
}

/// Builds the queue from positional inputs followed by drop payload tokens.
/// Returns the queue and the paths that did not exist.
fn build_queue(inputs: &[PathBuf], drop: Option<&str>) -> (InputQueue, Vec<PathBuf>) {
    let mut queue = InputQueue::new();
    let mut missing = queue.add(inputs).missing;
    if let Some(payload) = drop {
        missing.extend(queue.add(split_drop_payload(payload)).missing);
    }
    (queue, missing)
}

fn render_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Started {
            index,
            total,
            invocation,
        } => format!("\n[{index}/{total}] Running:\n  {invocation}\n"),
        ProgressEvent::OutputChunk { text } => text.clone(),
        ProgressEvent::FallbackNotice { retry, .. } => format!(
            "\n[INFO] This build does not support -stats. Retrying without -stats...\n  {retry}\n"
        ),
        ProgressEvent::ItemResult { outcome } => render_outcome(outcome),
        ProgressEvent::BatchComplete { .. } => "\nDone.\n".to_string(),
    }
}

fn render_outcome(outcome: &RunOutcome) -> String {
    if outcome.success {
        return format!("[OK] Output: {}\n", outcome.output_path.display());
    }
    let detail = outcome.failure_detail.as_deref().unwrap_or_default();
    match outcome.failure_code {
        Some(code) if code.is_launch_failure() => format!("[ERROR] {detail}\n"),
        Some(FailureCode::Cancelled) => {
            format!("[CANCELLED] {}\n", outcome.input_path.display())
        }
        Some(FailureCode::TimedOut) => format!(
            "[FAIL] Timed out: {detail}\n       Expected output: {}\n",
            outcome.output_path.display()
        ),
        _ => {
            let exit = outcome
                .exit_code
                .map_or_else(|| "none".to_string(), |code| code.to_string());
            format!(
                "[FAIL] Exit code: {exit}\n       Expected output: {}\n",
                outcome.output_path.display()
            )
        }
    }
}

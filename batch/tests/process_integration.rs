//! End-to-end batch runs against small shell scripts standing in for the
//! extraction tool.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use extract_queue_batch::{
    BatchOrchestrator, CancelToken, ProcessRunner, SystemProcessRunner,
};
use extract_queue_core::{
    FailureCode, Invocation, ProgressEvent, RunConfiguration, RunOutcome, STATS_UNSUPPORTED_MARKER,
    ToolFlag,
};

/// Parses the tool's command line the way the real binary does and rejects
/// unknown flags with Go's flag-package message.
const ARG_PARSER: &str = r#"
input=""
output=""
stats=0
if [ "$1" != "extract" ]; then
  echo "unknown command: $1" >&2
  exit 64
fi
shift
while [ $# -gt 0 ]; do
  case "$1" in
    -input) input="$2"; shift 2 ;;
    -output) output="$2"; shift 2 ;;
    -stats) stats=1; shift ;;
    -pretty|-all) shift ;;
    *) echo "flag provided but not defined: $1" >&2; exit 2 ;;
  esac
done
"#;

/// Script body for a tool build that predates `-stats`.
const LEGACY_TOOL: &str = r#"
if [ "$stats" = 1 ]; then
  echo "flag provided but not defined: -stats" >&2
  echo "Usage of extract:" >&2
  exit 2
fi
echo "parsed $input"
printf '[]' > "$output"
"#;

fn write_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake_acars_parser");
    fs::write(&path, format!("#!/bin/sh\n{ARG_PARSER}\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "{\"label\":\"H1\"}\n").unwrap();
    path
}

fn run_batch(config: RunConfiguration, items: &[PathBuf]) -> Vec<ProgressEvent> {
    let orchestrator = BatchOrchestrator::new(config).unwrap();
    let mut events = Vec::new();
    orchestrator.run(items, &mut events);
    events
}

fn outcomes(events: &[ProgressEvent]) -> Vec<RunOutcome> {
    events
        .iter()
        .filter_map(ProgressEvent::outcome)
        .cloned()
        .collect()
}

fn chunks(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::OutputChunk { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_successful_item_streams_stdout_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(
        dir.path(),
        r#"
echo "reading $input"
echo "warning: 2 lines skipped" >&2
printf '[]' > "$output"
"#,
    );
    let input = write_input(dir.path(), "day1.jsonl");

    let events = run_batch(RunConfiguration::new(&tool), &[input.clone()]);

    let lines = chunks(&events);
    assert!(lines.contains(&format!("reading {}\n", input.display())));
    assert!(lines.contains(&"warning: 2 lines skipped\n".to_string()));

    let results = outcomes(&events);
    assert_eq!(results.len(), 1);
    assert!(results[0].success, "{:?}", results[0]);
    assert_eq!(results[0].output_path, dir.path().join("day1.json"));
    assert!(results[0].output_path.exists());
    assert!(!results[0].fallback_used);
}

#[test]
fn test_stdout_lines_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(
        dir.path(),
        r#"
for i in 1 2 3 4 5; do echo "line $i"; done
printf '[]' > "$output"
"#,
    );
    let input = write_input(dir.path(), "a.log");

    let events = run_batch(RunConfiguration::new(&tool), &[input]);

    assert_eq!(
        chunks(&events),
        vec!["line 1\n", "line 2\n", "line 3\n", "line 4\n", "line 5\n"]
    );
}

#[test]
fn test_legacy_tool_falls_back_without_stats() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), LEGACY_TOOL);
    let input = write_input(dir.path(), "a.jsonl");
    let config = RunConfiguration::new(&tool).with_stats(true);

    let events = run_batch(config, &[input.clone()]);

    let notice = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::FallbackNotice { original, retry } => Some((original, retry)),
            _ => None,
        })
        .expect("fallback notice");
    assert!(notice.0.has_flag(ToolFlag::Stats));
    assert!(!notice.1.has_flag(ToolFlag::Stats));
    assert_eq!(notice.1.flags(), &[ToolFlag::Pretty, ToolFlag::All]);

    let results = outcomes(&events);
    let outcome = &results[0];
    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.fallback_used);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.input_path, input);
    assert_eq!(outcome.output_path, dir.path().join("a.json"));
    assert!(outcome.output.contains(STATS_UNSUPPORTED_MARKER));
}

#[test]
fn test_legacy_tool_without_stats_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), LEGACY_TOOL);
    let input = write_input(dir.path(), "a.jsonl");

    let events = run_batch(RunConfiguration::new(&tool), &[input]);

    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Started { .. }))
            .count(),
        1
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ProgressEvent::FallbackNotice { .. }))
    );
    assert!(outcomes(&events)[0].success);
}

#[test]
fn test_non_zero_exit_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), "echo \"open $input: corrupt\" >&2\nexit 3");
    let input = write_input(dir.path(), "a.log");

    let results = outcomes(&run_batch(RunConfiguration::new(&tool), &[input]));

    assert!(!results[0].success);
    assert_eq!(results[0].exit_code, Some(3));
    assert_eq!(results[0].failure_code, Some(FailureCode::NonZeroExit));
}

#[test]
fn test_zero_exit_without_artifact_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), "echo nothing to write\nexit 0");
    let input = write_input(dir.path(), "a.log");

    let results = outcomes(&run_batch(RunConfiguration::new(&tool), &[input]));

    assert!(!results[0].success);
    assert_eq!(results[0].exit_code, Some(0));
    assert_eq!(results[0].failure_code, Some(FailureCode::MissingArtifact));
}

#[test]
fn test_missing_executable_fails_every_item_but_completes() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![write_input(dir.path(), "x.log"), write_input(dir.path(), "y.log")];
    let config = RunConfiguration::new(dir.path().join("not-installed"));

    let events = run_batch(config, &items);

    let results = outcomes(&events);
    assert_eq!(results.len(), 2);
    for outcome in &results {
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.failure_code, Some(FailureCode::NotInstalled));
    }
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::BatchComplete {
            total_items: 2,
            succeeded: 0,
            failed: 2,
            cancelled: false,
        })
    );
}

#[test]
fn test_timeout_kills_tool() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), "echo started\nexec sleep 10");
    let invocation = Invocation::new(&tool, "a.log", dir.path().join("a.json"), Vec::new());
    let runner = SystemProcessRunner::new().with_timeout(Duration::from_millis(200));

    let start = Instant::now();
    let mut seen = Vec::new();
    let exit = runner
        .run(&invocation, &CancelToken::new(), &mut |chunk: &str| {
            seen.push(chunk.to_string())
        })
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(exit.interruption, Some(extract_queue_batch::Interruption::TimedOut));
    assert_eq!(seen, vec!["started\n"]);
    assert!(!exit.exited_cleanly());
}

#[test]
fn test_cancel_stops_running_tool_and_skips_rest() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), "echo busy\nexec sleep 10");
    let items = vec![
        write_input(dir.path(), "a.log"),
        write_input(dir.path(), "b.log"),
        write_input(dir.path(), "c.log"),
    ];
    let orchestrator = BatchOrchestrator::new(RunConfiguration::new(&tool)).unwrap();

    let start = Instant::now();
    let handle = orchestrator.spawn(items).unwrap();
    let mut events = Vec::new();
    for event in handle.events() {
        if matches!(event, ProgressEvent::OutputChunk { .. }) {
            handle.cancel();
        }
        events.push(event);
    }
    let summary = handle.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(summary.cancelled);
    assert_eq!(summary.total(), 3);
    assert!(
        summary
            .outcomes
            .iter()
            .all(|o| o.failure_code == Some(FailureCode::Cancelled))
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Started { .. }))
            .count(),
        1
    );
}

#[test]
fn test_stdout_and_stderr_share_one_stream() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(
        dir.path(),
        r#"
printf 'reading'
sleep 0.1
echo 'warning: bad line' >&2
sleep 0.1
echo ' done'
printf '[]' > "$output"
"#,
    );
    let input = write_input(dir.path(), "a.log");

    let events = run_batch(RunConfiguration::new(&tool), &[input]);

    assert_eq!(
        chunks(&events),
        vec!["readingwarning: bad line\n", " done\n"]
    );
    assert_eq!(outcomes(&events)[0].output, "readingwarning: bad line\n done\n");
}

#[test]
fn test_timeout_returns_while_helper_holds_output_open() {
    let dir = tempfile::tempdir().unwrap();
    // No exec: the shell is killed but its `sleep` keeps the pipe open.
    let tool = write_tool(dir.path(), "echo started\nsleep 4\necho late");
    let invocation = Invocation::new(&tool, "a.log", dir.path().join("a.json"), Vec::new());
    let runner = SystemProcessRunner::new().with_timeout(Duration::from_millis(200));

    let start = Instant::now();
    let mut seen = Vec::new();
    let exit = runner
        .run(&invocation, &CancelToken::new(), &mut |chunk: &str| {
            seen.push(chunk.to_string())
        })
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    assert_eq!(exit.interruption, Some(extract_queue_batch::Interruption::TimedOut));
    assert_eq!(seen, vec!["started\n"]);
}

#[test]
fn test_cancel_returns_while_helper_holds_output_open() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_tool(dir.path(), "echo busy\nsleep 4\necho late");
    let items = vec![write_input(dir.path(), "a.log"), write_input(dir.path(), "b.log")];
    let orchestrator = BatchOrchestrator::new(RunConfiguration::new(&tool)).unwrap();

    let start = Instant::now();
    let handle = orchestrator.spawn(items).unwrap();
    for event in handle.events() {
        if matches!(event, ProgressEvent::OutputChunk { .. }) {
            handle.cancel();
        }
    }
    let summary = handle.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    assert!(summary.cancelled);
    assert_eq!(summary.total(), 2);
    assert!(
        summary
            .outcomes
            .iter()
            .all(|o| o.failure_code == Some(FailureCode::Cancelled))
    );
}

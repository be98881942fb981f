//! Sequential batch orchestration.
//!
//! [`BatchOrchestrator`] walks a frozen queue snapshot one item at a time:
//! derive the artifact path, build the invocation, run the tool while
//! streaming its output, retry once without `-stats` when the tool rejects
//! it, then judge the item by exit code and artifact presence. Failures are
//! contained to their item; the batch always reaches the end of the queue.
//!
//! # Event order
//!
//! For N items the sink receives exactly N
//! [`ItemResult`](ProgressEvent::ItemResult) events, in queue order,
//! followed by one [`BatchComplete`](ProgressEvent::BatchComplete).
//!
//! # Example
//!
//! ```no_run
//! use extract_queue_batch::BatchOrchestrator;
//! use extract_queue_core::{ProgressEvent, RunConfiguration};
//!
//! let config = RunConfiguration::new("./acars_parser").with_stats(true);
//! let handle = BatchOrchestrator::new(config)?.spawn(vec!["day1.jsonl".into()])?;
//! for event in handle.events() {
//!     if let ProgressEvent::OutputChunk { text } = event {
//!         print!("{text}");
//!     }
//! }
//! let summary = handle.join()?;
//! println!("{} of {} succeeded", summary.succeeded(), summary.total());
//! # Ok::<(), extract_queue_batch::BatchError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use extract_queue_core::{
    FailureCode, Invocation, ItemState, ProgressEvent, RunConfiguration, RunOutcome, ToolFlag,
    build_invocation, find_output_collisions, resolve_output_path, should_retry_without_stats,
};

use crate::error::{BatchError, Result};
use crate::process::{Interruption, ProcessError, ProcessExit, ProcessRunner, SystemProcessRunner};
use crate::CancelToken;

const WORKER_THREAD_NAME: &str = "extract-queue-worker";

/// Destination for progress events.
pub trait EventSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl EventSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

impl EventSink for Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        // A dropped receiver means nobody is watching; keep processing.
        let _ = self.send(event);
    }
}

/// Outcomes of a finished batch, in queue order.
///
/// The outcomes keep `output_bytes` but not the output text, which is only
/// delivered with each [`ItemResult`](ProgressEvent::ItemResult).
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<RunOutcome>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Drives one external process per queue item, strictly one at a time.
///
/// The configuration is validated once at construction and owned by the
/// orchestrator for the rest of its life. Cancelling the token returned by
/// [`cancel_token`](Self::cancel_token) stops the current batch and every
/// later one.
#[derive(Debug)]
pub struct BatchOrchestrator<R = SystemProcessRunner> {
    config: RunConfiguration,
    runner: R,
    cancel: CancelToken,
}

impl BatchOrchestrator<SystemProcessRunner> {
    /// Creates an orchestrator that launches real processes.
    pub fn new(config: RunConfiguration) -> Result<Self> {
        Self::with_runner(config, SystemProcessRunner::new())
    }
}

impl<R: ProcessRunner> BatchOrchestrator<R> {
    /// Creates an orchestrator with a custom process runner.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn with_runner(config: RunConfiguration, runner: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Processes `items` on the calling thread, emitting events to `sink`.
    pub fn run<S: EventSink + ?Sized>(&self, items: &[PathBuf], sink: &mut S) -> BatchSummary {
        let total = items.len();
        info!(
            total,
            executable = %self.config.executable.display(),
            flags = ?self.config.enabled_flags(),
            "Starting extraction batch"
        );
        for (output, inputs) in find_output_collisions(items, self.config.output_dir()) {
            warn!(
                output = %output.display(),
                inputs = ?inputs,
                "Several inputs share one output path; later items overwrite earlier artifacts"
            );
        }

        let mut outcomes = Vec::with_capacity(total);
        for (position, input) in items.iter().enumerate() {
            let outcome = if self.cancel.is_cancelled() {
                debug!(input = %input.display(), "Skipping item after cancellation");
                RunOutcome::cancelled(
                    input.clone(),
                    resolve_output_path(input, self.config.output_dir()),
                )
            } else {
                self.process_item(position + 1, total, input, sink)
            };
            // The summary keeps only the byte count; the text travels with the event.
            outcomes.push(outcome.without_output());
            sink.emit(ProgressEvent::ItemResult { outcome });
        }

        let summary = BatchSummary {
            outcomes,
            cancelled: self.cancel.is_cancelled(),
        };
        sink.emit(ProgressEvent::BatchComplete {
            total_items: summary.total(),
            succeeded: summary.succeeded(),
            failed: summary.failed(),
            cancelled: summary.cancelled,
        });
        info!(
            total = summary.total(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "Extraction batch finished"
        );
        summary
    }

    fn process_item<S: EventSink + ?Sized>(
        &self,
        index: usize,
        total: usize,
        input: &Path,
        sink: &mut S,
    ) -> RunOutcome {
        let output_path = resolve_output_path(input, self.config.output_dir());
        let invocation = build_invocation(&self.config.executable, input, &output_path, &self.config);
        let mut item = ItemRun::new(input, output_path);

        sink.emit(ProgressEvent::Started {
            index,
            total,
            invocation: invocation.clone(),
        });
        item.advance(ItemState::Running);

        let first = match self.run_streaming(&invocation, &mut item, sink) {
            Ok(exit) => exit,
            Err(err) => return item.launch_failed(&err),
        };

        let last = if first.interruption.is_none()
            && !self.cancel.is_cancelled()
            && should_retry_without_stats(first.exit_code, self.config.stats, &first.output)
        {
            item.advance(ItemState::RetryPending);
            let retry = invocation.without_flag(ToolFlag::Stats);
            warn!(
                input = %input.display(),
                exit_code = ?first.exit_code,
                "Tool does not support -stats; retrying without it"
            );
            sink.emit(ProgressEvent::FallbackNotice {
                original: invocation.clone(),
                retry: retry.clone(),
            });
            item.fallback_used = true;
            item.advance(ItemState::RetryRunning);
            match self.run_streaming(&retry, &mut item, sink) {
                Ok(exit) => exit,
                Err(err) => return item.launch_failed(&err),
            }
        } else {
            first
        };

        item.finish(&last)
    }

    fn run_streaming<S: EventSink + ?Sized>(
        &self,
        invocation: &Invocation,
        item: &mut ItemRun,
        sink: &mut S,
    ) -> std::result::Result<ProcessExit, ProcessError> {
        let exit = self.runner.run(invocation, &self.cancel, &mut |chunk: &str| {
            sink.emit(ProgressEvent::OutputChunk {
                text: chunk.to_string(),
            });
        })?;
        item.output.push_str(&exit.output);
        Ok(exit)
    }
}

impl<R: ProcessRunner + Send + 'static> BatchOrchestrator<R> {
    /// Runs `items` on a dedicated worker thread.
    ///
    /// The returned handle receives events through a channel, so the
    /// calling thread never blocks on a child process.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::IoError`] if the worker thread cannot be
    /// spawned.
    pub fn spawn(self, items: Vec<PathBuf>) -> Result<BatchHandle> {
        let (tx, rx) = mpsc::channel();
        let cancel = self.cancel.clone();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut sink = tx;
                self.run(&items, &mut sink)
            })?;
        Ok(BatchHandle {
            events: rx,
            cancel,
            worker,
        })
    }
}

/// Caller-side handle to a batch running on its worker thread.
pub struct BatchHandle {
    events: Receiver<ProgressEvent>,
    cancel: CancelToken,
    worker: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    /// Blocking iterator over events; ends after
    /// [`BatchComplete`](ProgressEvent::BatchComplete).
    pub fn events(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.events.iter()
    }

    /// Requests cancellation: the running child is killed and remaining
    /// items are reported as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker and returns its summary.
    pub fn join(self) -> Result<BatchSummary> {
        self.worker.join().map_err(|_| BatchError::WorkerPanicked)
    }
}

/// Mutable bookkeeping for the item currently being processed.
struct ItemRun {
    input: PathBuf,
    output_path: PathBuf,
    output: String,
    fallback_used: bool,
    state: ItemState,
}

impl ItemRun {
    fn new(input: &Path, output_path: PathBuf) -> Self {
        Self {
            input: input.to_path_buf(),
            output_path,
            output: String::new(),
            fallback_used: false,
            state: ItemState::Pending,
        }
    }

    fn advance(&mut self, next: ItemState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid item transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(input = %self.input.display(), from = ?self.state, to = ?next, "Item state");
        self.state = next;
    }

    fn launch_failed(mut self, err: &ProcessError) -> RunOutcome {
        warn!(input = %self.input.display(), error = %err, "Could not run extraction tool");
        self.advance(ItemState::Failed);
        self.into_outcome(None, Some((err.failure_code(), err.to_string())))
    }

    fn finish(mut self, exit: &ProcessExit) -> RunOutcome {
        let failure = match exit.interruption {
            Some(Interruption::TimedOut) => Some((
                FailureCode::TimedOut,
                "process exceeded its time budget and was killed".to_string(),
            )),
            Some(Interruption::Cancelled) => Some((
                FailureCode::Cancelled,
                "batch cancelled while the item was running".to_string(),
            )),
            None if exit.exited_cleanly() && self.output_path.exists() => None,
            None if exit.exited_cleanly() => Some((
                FailureCode::MissingArtifact,
                format!(
                    "exit code 0 but no output at {}",
                    self.output_path.display()
                ),
            )),
            None => Some((
                FailureCode::NonZeroExit,
                match exit.exit_code {
                    Some(code) => format!("exit code {code}"),
                    None => "process terminated by a signal".to_string(),
                },
            )),
        };

        match &failure {
            None => self.advance(ItemState::Success),
            Some((code, detail)) => {
                warn!(input = %self.input.display(), code = %code, detail = %detail, "Item failed");
                self.advance(ItemState::Failed);
            }
        }
        self.into_outcome(exit.exit_code, failure)
    }

    fn into_outcome(
        self,
        exit_code: Option<i32>,
        failure: Option<(FailureCode, String)>,
    ) -> RunOutcome {
        let (failure_code, failure_detail) = match failure {
            Some((code, detail)) => (Some(code), Some(detail)),
            None => (None, None),
        };
        RunOutcome {
            input_path: self.input,
            output_path: self.output_path,
            exit_code,
            output_bytes: self.output.len(),
            output: self.output,
            fallback_used: self.fallback_used,
            success: failure_code.is_none(),
            failure_code,
            failure_detail,
        }
    }
}

//! Batch orchestration of an external extraction tool.
//!
//! This crate runs the extraction tool once per queued input file, strictly
//! one process at a time, and reports progress as a stream of
//! [`ProgressEvent`](extract_queue_core::ProgressEvent)s.
//!
//! # Main entry points
//!
//! - [`BatchOrchestrator::spawn`]: run a queue snapshot on a dedicated
//!   worker thread and consume events through a [`BatchHandle`].
//! - [`BatchOrchestrator::run`]: the same loop on the calling thread, with
//!   events pushed into any [`EventSink`].
//! - [`SystemProcessRunner`]: the [`ProcessRunner`] that launches real
//!   processes, with merged, streamed output and optional timeouts.
//! - [`build_batch_report`] / [`format_report`]: summarize a finished run.
//! - [`QueueConfig`]: YAML settings file that produces the run
//!   configuration.
//!
//! # Example
//!
//! ```no_run
//! use extract_queue_batch::{BatchOrchestrator, QueueConfig, SystemProcessRunner};
//! use extract_queue_core::ProgressEvent;
//!
//! let settings = QueueConfig::load("queue.yaml")?;
//! let mut runner = SystemProcessRunner::new();
//! if let Some(limit) = settings.process_timeout() {
//!     runner = runner.with_timeout(limit);
//! }
//! let orchestrator = BatchOrchestrator::with_runner(settings.to_run_configuration()?, runner)?;
//!
//! let mut events = Vec::new();
//! let summary = orchestrator.run(&["day1.jsonl".into(), "day2.jsonl".into()], &mut events);
//! assert!(matches!(events.last(), Some(ProgressEvent::BatchComplete { .. })));
//! println!("{} failed", summary.failed());
//! # Ok::<(), extract_queue_batch::BatchError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod report;

pub use cancel::CancelToken;
pub use config::QueueConfig;
pub use error::{BatchError, Result};
pub use orchestrator::{BatchHandle, BatchOrchestrator, BatchSummary, EventSink};
pub use output::{OutputFormat, format_report};
pub use process::{Interruption, ProcessError, ProcessExit, ProcessRunner, SystemProcessRunner};
pub use report::{BatchReport, ItemReport, build_batch_report, failure_code_summary};

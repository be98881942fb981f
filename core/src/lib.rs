//! Core types and pure logic for batch extraction runs.
//!
//! This crate holds everything about a batch run that does not touch a
//! process:
//!
//! - [`RunConfiguration`]: the immutable settings frozen when a run starts.
//! - [`resolve_output_path`]: derives `<stem>.json` for each input.
//! - [`build_invocation`]: assembles the tool's argument vector.
//! - [`should_retry_without_stats`]: the one-shot `-stats` fallback rule.
//! - [`ProgressEvent`] and [`RunOutcome`]: what a run reports.
//! - [`InputQueue`] and [`split_drop_payload`]: caller-side queue building.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use extract_queue_core::*;
//!
//! let config = RunConfiguration::new("acars_parser").with_output_dir("out");
//! let input = Path::new("logs/day1.jsonl");
//! let output = resolve_output_path(input, config.output_dir());
//! let invocation = build_invocation(&config.executable, input, &output, &config);
//!
//! assert_eq!(
//!     invocation.to_string(),
//!     "acars_parser extract -input logs/day1.jsonl -output out/day1.json -pretty -all"
//! );
//! ```

mod events;
mod fallback;
mod invocation;
mod paths;
mod queue;
mod types;
mod validate;

pub use events::ProgressEvent;
pub use fallback::{STATS_UNSUPPORTED_MARKER, should_retry_without_stats};
pub use invocation::build_invocation;
pub use paths::{find_output_collisions, resolve_output_path};
pub use queue::{InputQueue, QueueAddReport, split_drop_payload};
pub use types::*;
pub use validate::{ConfigError, validate_configuration};

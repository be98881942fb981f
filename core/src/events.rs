//! Progress events emitted by a batch run.
//!
//! A run over N items emits, per item, one [`ProgressEvent::Started`]
//! (omitted for items skipped by cancellation), any number of
//! [`ProgressEvent::OutputChunk`]s, at most one
//! [`ProgressEvent::FallbackNotice`], and exactly one
//! [`ProgressEvent::ItemResult`]. A single [`ProgressEvent::BatchComplete`]
//! closes the stream.

use serde::Serialize;

use crate::{Invocation, RunOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// An item's first run is about to launch.
    Started {
        /// 1-based queue position.
        index: usize,
        total: usize,
        invocation: Invocation,
    },
    /// Output from the running process, verbatim.
    OutputChunk { text: String },
    /// The tool rejected `-stats`; the item is retried without it.
    FallbackNotice {
        original: Invocation,
        retry: Invocation,
    },
    /// Final outcome for one item.
    ItemResult { outcome: RunOutcome },
    /// Every item has been reported.
    BatchComplete {
        total_items: usize,
        succeeded: usize,
        failed: usize,
        cancelled: bool,
    },
}

impl ProgressEvent {
    /// Returns the outcome carried by an `ItemResult` event.
    pub fn outcome(&self) -> Option<&RunOutcome> {
        match self {
            Self::ItemResult { outcome } => Some(outcome),
            _ => None,
        }
    }

    pub fn is_batch_complete(&self) -> bool {
        matches!(self, Self::BatchComplete { .. })
    }
}

//! Structured batch reporting.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use extract_queue_core::{FailureCode, RunConfiguration, RunOutcome, ToolFlag};

use crate::BatchSummary;

/// Version of the report layout.
pub const REPORT_VERSION: &str = "1.0";

/// Per-item entry of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub input_path: String,
    pub output_path: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<FailureCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    /// Size of the captured tool output in bytes.
    pub output_bytes: usize,
}

impl From<&RunOutcome> for ItemReport {
    fn from(outcome: &RunOutcome) -> Self {
        Self {
            input_path: outcome.input_path.display().to_string(),
            output_path: outcome.output_path.display().to_string(),
            exit_code: outcome.exit_code,
            success: outcome.success,
            fallback_used: outcome.fallback_used,
            failure_code: outcome.failure_code,
            failure_detail: outcome.failure_detail.clone(),
            output_bytes: outcome.output_bytes,
        }
    }
}

/// Report for one finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub report_version: String,
    pub generated_at: String,
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    pub flags: Vec<ToolFlag>,
    pub total_items: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub items: Vec<ItemReport>,
}

/// Builds the report for a finished batch.
pub fn build_batch_report(config: &RunConfiguration, summary: &BatchSummary) -> BatchReport {
    BatchReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        executable: config.executable.display().to_string(),
        output_dir: config.output_dir().map(ToOwned::to_owned),
        flags: config.enabled_flags(),
        total_items: summary.total(),
        succeeded: summary.succeeded(),
        failed: summary.failed(),
        cancelled: summary.cancelled,
        items: summary.outcomes.iter().map(ItemReport::from).collect(),
    }
}

/// Counts failed items per failure code, most frequent first.
pub fn failure_code_summary(report: &BatchReport) -> Vec<(FailureCode, usize)> {
    let mut counts: BTreeMap<FailureCode, usize> = BTreeMap::new();
    for code in report.items.iter().filter_map(|item| item.failure_code) {
        *counts.entry(code).or_default() += 1;
    }
    let mut summary: Vec<(FailureCode, usize)> = counts.into_iter().collect();
    summary.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    summary
}

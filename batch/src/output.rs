//! Output formatting for batch reports.

use crate::error::Result;
use crate::report::BatchReport;

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

impl OutputFormat {
    /// File extension conventionally used for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Table => "txt",
        }
    }
}

/// Formats a batch report in the requested output format.
pub fn format_report(report: &BatchReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        OutputFormat::Table => Ok(report_to_table(report)),
    }
}

fn report_to_table(report: &BatchReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Executable: {}  Items: {}  Succeeded: {}  Failed: {}",
        report.executable, report.total_items, report.succeeded, report.failed
    ));
    if report.cancelled {
        out.push_str("  (cancelled)");
    }
    out.push('\n');

    let input_width = report
        .items
        .iter()
        .map(|item| item.input_path.len())
        .max()
        .unwrap_or(0)
        .max("INPUT".len());

    out.push_str(&format!(
        "  {:<input_width$}  {:<6}  {:>4}  {}\n",
        "INPUT", "STATUS", "EXIT", "OUTPUT / DETAIL"
    ));
    for item in &report.items {
        let status = if item.success { "ok" } else { "fail" };
        let exit = item
            .exit_code
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        let mut detail = item.output_path.clone();
        if item.fallback_used {
            detail.push_str(" [no -stats]");
        }
        if let Some(ref failure) = item.failure_detail {
            detail = format!("{detail} ({failure})");
        }
        out.push_str(&format!(
            "  {:<input_width$}  {status:<6}  {exit:>4}  {detail}\n",
            item.input_path
        ));
    }

    out
}

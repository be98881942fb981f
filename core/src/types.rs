//! Batch run type definitions.
//!
//! This module defines the data model shared by the orchestrator and its
//! callers: the frozen run configuration, the tool invocation, and the
//! per-item outcome. The types are designed for serialization with
//! [`serde`] so they can be written into batch reports and event logs.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, Serializer};

use crate::validate::ConfigError;

/// Subcommand passed to the extraction tool for every item.
pub const EXTRACT_SUBCOMMAND: &str = "extract";

/// Extension of every derived output artifact.
pub const OUTPUT_EXTENSION: &str = "json";

/// Optional boolean flag understood by the extraction tool.
///
/// The declaration order is the order in which flags appear on the command
/// line; [`ToolFlag::ALL`] lists them in that order.
///
/// # Examples
///
/// ```
/// use extract_queue_core::ToolFlag;
///
/// assert_eq!(ToolFlag::Stats.as_arg(), "-stats");
/// assert_eq!(ToolFlag::ALL, [ToolFlag::Pretty, ToolFlag::All, ToolFlag::Stats]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFlag {
    /// Pretty-print the JSON artifact.
    Pretty,
    /// Include records no parser matched.
    All,
    /// Print counters to stderr. Not every build of the tool knows it.
    Stats,
}

impl ToolFlag {
    /// Every flag, in command-line order.
    pub const ALL: [ToolFlag; 3] = [ToolFlag::Pretty, ToolFlag::All, ToolFlag::Stats];

    /// The literal argument passed to the tool.
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Pretty => "-pretty",
            Self::All => "-all",
            Self::Stats => "-stats",
        }
    }
}

impl fmt::Display for ToolFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Immutable settings for one batch run.
///
/// Built once when a run starts and never read from live UI state again.
/// An empty or whitespace-only `output_dir` means "next to each input".
///
/// # Examples
///
/// ```
/// use extract_queue_core::{RunConfiguration, ToolFlag};
///
/// let config = RunConfiguration::new("./acars_parser")
///     .with_output_dir("out")
///     .with_stats(true);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.enabled_flags(), vec![ToolFlag::Pretty, ToolFlag::All, ToolFlag::Stats]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Path to the extraction tool.
    pub executable: PathBuf,
    /// Directory override for every artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Pass `-pretty`.
    pub pretty: bool,
    /// Pass `-all`.
    pub all: bool,
    /// Pass `-stats`, retrying without it when the tool rejects it.
    pub stats: bool,
}

impl RunConfiguration {
    /// Creates a configuration with the front-end defaults: `-pretty` and
    /// `-all` on, `-stats` off, artifacts next to their inputs.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            output_dir: None,
            pretty: true,
            all: true,
            stats: false,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    pub fn with_all(mut self, enabled: bool) -> Self {
        self.all = enabled;
        self
    }

    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats = enabled;
        self
    }

    /// Returns `true` if the given flag is switched on.
    pub fn is_enabled(&self, flag: ToolFlag) -> bool {
        match flag {
            ToolFlag::Pretty => self.pretty,
            ToolFlag::All => self.all,
            ToolFlag::Stats => self.stats,
        }
    }

    /// Switched-on flags in command-line order.
    pub fn enabled_flags(&self) -> Vec<ToolFlag> {
        ToolFlag::ALL
            .into_iter()
            .filter(|flag| self.is_enabled(*flag))
            .collect()
    }

    /// The output directory override, if it is not blank.
    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
    }

    /// Checks the structural requirements of a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingExecutable`] if no executable path is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::validate::validate_configuration(self)
    }
}

/// One external tool invocation.
///
/// The program, subcommand and path pair are fixed; only the flag list
/// varies, which keeps the retry invocation a pure filter of the original.
///
/// # Examples
///
/// ```
/// use extract_queue_core::{Invocation, ToolFlag};
///
/// let inv = Invocation::new("tool", "a.jsonl", "a.json", vec![ToolFlag::Pretty, ToolFlag::Stats]);
/// assert_eq!(inv.to_string(), "tool extract -input a.jsonl -output a.json -pretty -stats");
///
/// let retry = inv.without_flag(ToolFlag::Stats);
/// assert_eq!(retry.to_string(), "tool extract -input a.jsonl -output a.json -pretty");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    input: PathBuf,
    output: PathBuf,
    flags: Vec<ToolFlag>,
}

impl Invocation {
    pub fn new(
        program: impl Into<PathBuf>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        flags: Vec<ToolFlag>,
    ) -> Self {
        Self {
            program: program.into(),
            input: input.into(),
            output: output.into(),
            flags,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn flags(&self) -> &[ToolFlag] {
        &self.flags
    }

    pub fn has_flag(&self, flag: ToolFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Returns a copy with every occurrence of `flag` removed and the rest
    /// of the argument vector untouched.
    pub fn without_flag(&self, flag: ToolFlag) -> Self {
        Self {
            program: self.program.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            flags: self.flags.iter().copied().filter(|f| *f != flag).collect(),
        }
    }

    /// Arguments after the program name.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            EXTRACT_SUBCOMMAND.into(),
            "-input".into(),
            self.input.clone().into_os_string(),
            "-output".into(),
            self.output.clone().into_os_string(),
        ];
        args.extend(self.flags.iter().map(|flag| OsString::from(flag.as_arg())));
        args
    }

    /// Full argument vector including the program.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = vec![self.program.clone().into_os_string()];
        argv.extend(self.args());
        argv
    }

    /// Argument vector with non-UTF-8 sequences replaced, for logs and reports.
    pub fn argv_lossy(&self) -> Vec<String> {
        self.argv()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv_lossy().join(" "))
    }
}

impl Serialize for Invocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.argv_lossy().serialize(serializer)
    }
}

/// Processing state of one queue item.
///
/// ```text
/// Pending → Running → Success
///                   → Failed
///                   → RetryPending → RetryRunning → Success | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Running,
    RetryPending,
    RetryRunning,
    Success,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns `true` if moving from `self` to `next` follows the item
    /// lifecycle.
    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Success)
                | (Running, Failed)
                | (Running, RetryPending)
                | (RetryPending, RetryRunning)
                | (RetryPending, Failed)
                | (RetryRunning, Success)
                | (RetryRunning, Failed)
        )
    }
}

/// Structured failure code for one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The executable does not exist.
    NotInstalled,
    /// The executable exists but may not be run.
    PermissionBlocked,
    /// Any other failure to start the process.
    LaunchFailed,
    /// The process exited with a non-zero status.
    NonZeroExit,
    /// The process exited cleanly but wrote no artifact.
    MissingArtifact,
    /// The process exceeded its time budget and was killed.
    TimedOut,
    /// The batch was cancelled before or while the item ran.
    Cancelled,
}

impl FailureCode {
    /// Returns `true` for failures where the tool never ran.
    pub fn is_launch_failure(self) -> bool {
        matches!(
            self,
            Self::NotInstalled | Self::PermissionBlocked | Self::LaunchFailed
        )
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not_installed"),
            Self::PermissionBlocked => write!(f, "permission_blocked"),
            Self::LaunchFailed => write!(f, "launch_failed"),
            Self::NonZeroExit => write!(f, "non_zero_exit"),
            Self::MissingArtifact => write!(f, "missing_artifact"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final result for one queue item.
///
/// `success` holds exactly when the last run exited with status 0 and the
/// artifact exists at `output_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Exit code of the last run; `None` when the process never produced one.
    pub exit_code: Option<i32>,
    /// Combined output of every run of this item.
    pub output: String,
    /// Byte length of the combined output; kept by [`without_output`](Self::without_output).
    pub output_bytes: usize,
    pub fallback_used: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<FailureCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl RunOutcome {
    /// Outcome for an item that was never started.
    pub fn cancelled(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            exit_code: None,
            output: String::new(),
            output_bytes: 0,
            fallback_used: false,
            success: false,
            failure_code: Some(FailureCode::Cancelled),
            failure_detail: Some("batch cancelled before item started".to_string()),
        }
    }

    /// Copy of the outcome without the captured output text.
    pub fn without_output(&self) -> Self {
        Self {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            exit_code: self.exit_code,
            output: String::new(),
            output_bytes: self.output_bytes,
            fallback_used: self.fallback_used,
            success: self.success,
            failure_code: self.failure_code,
            failure_detail: self.failure_detail.clone(),
        }
    }

    /// Final state implied by the outcome.
    pub fn state(&self) -> ItemState {
        if self.success {
            ItemState::Success
        } else {
            ItemState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_flags_follow_command_line_order() {
        let config = RunConfiguration::new("tool")
            .with_stats(true)
            .with_pretty(false)
            .with_all(true);
        assert_eq!(config.enabled_flags(), vec![ToolFlag::All, ToolFlag::Stats]);
    }

    #[test]
    fn test_blank_output_dir_is_absent() {
        let config = RunConfiguration::new("tool").with_output_dir("   ");
        assert_eq!(config.output_dir(), None);

        let config = RunConfiguration::new("tool").with_output_dir("  out  ");
        assert_eq!(config.output_dir(), Some("out"));
    }

    #[test]
    fn test_without_flag_keeps_input_named_like_flag() {
        let inv = Invocation::new("tool", "-stats", "-stats.json", vec![ToolFlag::Stats]);
        let retry = inv.without_flag(ToolFlag::Stats);
        assert_eq!(
            retry.argv_lossy(),
            vec!["tool", "extract", "-input", "-stats", "-output", "-stats.json"]
        );
    }

    #[test]
    fn test_invocation_serializes_as_argv() {
        let inv = Invocation::new("tool", "a.log", "a.json", vec![ToolFlag::All]);
        let json = serde_json::to_string(&inv).unwrap();
        assert_eq!(
            json,
            r#"["tool","extract","-input","a.log","-output","a.json","-all"]"#
        );
    }

    #[test]
    fn test_item_state_transitions() {
        assert!(ItemState::Pending.can_transition_to(ItemState::Running));
        assert!(ItemState::Running.can_transition_to(ItemState::RetryPending));
        assert!(ItemState::RetryRunning.can_transition_to(ItemState::Success));
        assert!(!ItemState::RetryRunning.can_transition_to(ItemState::RetryPending));
        assert!(!ItemState::Success.can_transition_to(ItemState::Running));
        assert!(ItemState::Failed.is_terminal());
        assert!(!ItemState::RetryPending.is_terminal());
    }

    #[test]
    fn test_without_output_keeps_byte_count() {
        let mut outcome = RunOutcome::cancelled("a.log".into(), "a.json".into());
        outcome.output = "decoded 12 messages\n".to_string();
        outcome.output_bytes = outcome.output.len();

        let slim = outcome.without_output();
        assert!(slim.output.is_empty());
        assert_eq!(slim.output_bytes, 20);
        assert_eq!(slim.failure_code, Some(FailureCode::Cancelled));
        assert_eq!(slim.input_path, outcome.input_path);
    }

    #[test]
    fn test_failure_code_display_matches_serde() {
        for code in [
            FailureCode::NotInstalled,
            FailureCode::MissingArtifact,
            FailureCode::Cancelled,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }
}

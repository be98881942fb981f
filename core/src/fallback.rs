//! Retry policy for tool builds that predate `-stats`.
//!
//! Older builds of the extraction tool reject `-stats` through Go's flag
//! package, which prints [`STATS_UNSUPPORTED_MARKER`] and exits non-zero.
//! The marker text is a compatibility contract with the tool and is matched
//! verbatim. No other output triggers a retry.

/// Output emitted by tool builds that do not know `-stats`.
pub const STATS_UNSUPPORTED_MARKER: &str = "flag provided but not defined: -stats";

/// Decides whether a failed run should be repeated without `-stats`.
///
/// Returns `true` only when stats were requested, the run did not exit with
/// status 0, and the captured output contains the marker.
///
/// # Examples
///
/// ```
/// use extract_queue_core::should_retry_without_stats;
///
/// let output = "flag provided but not defined: -stats\nUsage of extract:\n";
/// assert!(should_retry_without_stats(Some(2), true, output));
/// assert!(!should_retry_without_stats(Some(0), true, output));
/// assert!(!should_retry_without_stats(Some(2), false, output));
/// assert!(!should_retry_without_stats(Some(2), true, "open in.jsonl: no such file"));
/// ```
pub fn should_retry_without_stats(
    exit_code: Option<i32>,
    stats_requested: bool,
    captured_output: &str,
) -> bool {
    stats_requested && exit_code != Some(0) && captured_output.contains(STATS_UNSUPPORTED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_conditions_required() {
        let marker = format!("error\n{STATS_UNSUPPORTED_MARKER}\n");
        for stats in [false, true] {
            for exit in [Some(0), Some(1)] {
                for output in [marker.as_str(), "plain failure"] {
                    let expected = stats && exit == Some(1) && output == marker;
                    assert_eq!(
                        should_retry_without_stats(exit, stats, output),
                        expected,
                        "stats={stats} exit={exit:?} output={output:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_missing_exit_code_counts_as_failure() {
        assert!(should_retry_without_stats(None, true, STATS_UNSUPPORTED_MARKER));
    }

    #[test]
    fn test_marker_match_is_exact() {
        assert!(!should_retry_without_stats(
            Some(2),
            true,
            "flag provided but not defined: -stat"
        ));
        assert!(!should_retry_without_stats(
            Some(2),
            true,
            "FLAG PROVIDED BUT NOT DEFINED: -STATS"
        ));
        assert!(!should_retry_without_stats(
            Some(2),
            true,
            "flag provided but not defined: -pretty"
        ));
    }
}

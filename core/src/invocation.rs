//! Tool invocation assembly.

use std::path::Path;

use crate::{Invocation, RunConfiguration};

/// Builds the invocation for one item.
///
/// The argument vector is always
/// `<exe> extract -input <in> -output <out>` followed by the enabled flags
/// in the fixed order `-pretty`, `-all`, `-stats`. Paths are passed through
/// as given; whether they exist is the runner's concern.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use extract_queue_core::{RunConfiguration, build_invocation};
///
/// let config = RunConfiguration::new("acars_parser").with_pretty(false).with_stats(true);
/// let inv = build_invocation(
///     &config.executable,
///     Path::new("in.jsonl"),
///     Path::new("in.json"),
///     &config,
/// );
/// assert_eq!(
///     inv.to_string(),
///     "acars_parser extract -input in.jsonl -output in.json -all -stats"
/// );
/// ```
pub fn build_invocation(
    executable: &Path,
    input: &Path,
    output: &Path,
    config: &RunConfiguration,
) -> Invocation {
    Invocation::new(executable, input, output, config.enabled_flags())
}

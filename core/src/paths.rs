//! Output path derivation.
//!
//! Every input maps to `<stem>.json`, placed in the output directory
//! override when one is set and next to the input otherwise. Only the final
//! extension is replaced, so `flight.2024.jsonl` becomes `flight.2024.json`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::types::OUTPUT_EXTENSION;

/// Computes the artifact path for `input`.
///
/// A blank `output_dir` (empty or whitespace-only) is treated as absent;
/// a non-blank one is trimmed before use.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use extract_queue_core::resolve_output_path;
///
/// assert_eq!(
///     resolve_output_path(Path::new("logs/a.b.jsonl"), None),
///     PathBuf::from("logs/a.b.json")
/// );
/// assert_eq!(
///     resolve_output_path(Path::new("logs/a.jsonl"), Some(" out ")),
///     PathBuf::from("out/a.json")
/// );
/// ```
pub fn resolve_output_path(input: &Path, output_dir: Option<&str>) -> PathBuf {
    let mut file_name: OsString = input.file_stem().unwrap_or_default().to_os_string();
    file_name.push(".");
    file_name.push(OUTPUT_EXTENSION);

    let dir = match output_dir.map(str::trim).filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(file_name)
}

/// Groups inputs that would write the same artifact.
///
/// Returns one entry per colliding output path, with the inputs in queue
/// order. A sequential run tolerates collisions (the later item wins), so
/// callers only warn about them.
pub fn find_output_collisions(
    inputs: &[PathBuf],
    output_dir: Option<&str>,
) -> Vec<(PathBuf, Vec<PathBuf>)> {
    let mut by_output: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for input in inputs {
        by_output
            .entry(resolve_output_path(input, output_dir))
            .or_default()
            .push(input.clone());
    }
    by_output
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .collect()
}

//! Input queue management and drop payload tokenizing.
//!
//! The queue is the caller-side collection that a batch snapshots when it
//! starts. Insertion skips blank entries, paths that do not exist, and
//! exact duplicates, so the orchestrator can assume a clean, ordered list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Splits a drag-and-drop payload into paths.
///
/// Tokens are separated by whitespace; a `{...}` group is one token and may
/// contain spaces. An opening brace starts a fresh token. Doubled
/// backslashes, which some platforms deliver escaped, are collapsed.
///
/// # Examples
///
/// ```
/// use extract_queue_core::split_drop_payload;
///
/// let paths = split_drop_payload("/data/a.log {/data/with space.jsonl} /data/b.txt");
/// assert_eq!(paths, vec!["/data/a.log", "/data/with space.jsonl", "/data/b.txt"]);
/// ```
pub fn split_drop_payload(data: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brace = false;

    for ch in data.trim().chars() {
        match ch {
            '{' => {
                in_brace = true;
                current.clear();
            }
            '}' => {
                in_brace = false;
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_brace => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .map(|token| token.replace("\\\\", "\\"))
        .collect()
}

/// What happened to the paths passed to [`InputQueue::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueAddReport {
    pub added: Vec<PathBuf>,
    pub duplicates: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Ordered, de-duplicated list of existing input files.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    items: Vec<PathBuf>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends paths in order.
    ///
    /// Surrounding whitespace is trimmed from UTF-8 paths; blank entries
    /// are ignored.
    pub fn add<I, P>(&mut self, paths: I) -> QueueAddReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = QueueAddReport::default();
        let mut existing: HashSet<PathBuf> = self.items.iter().cloned().collect();

        for path in paths {
            let path = normalize_entry(path.as_ref());
            if path.as_os_str().is_empty() {
                continue;
            }
            if !path.exists() {
                report.missing.push(path);
                continue;
            }
            if !existing.insert(path.clone()) {
                report.duplicates.push(path);
                continue;
            }
            self.items.push(path.clone());
            report.added.push(path);
        }

        report
    }

    /// Removes the items at `indices`; out-of-range indices are ignored.
    pub fn remove(&mut self, indices: &[usize]) {
        let drop: HashSet<usize> = indices.iter().copied().collect();
        let mut position = 0;
        self.items.retain(|_| {
            let keep = !drop.contains(&position);
            position += 1;
            keep
        });
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.items.iter().map(PathBuf::as_path)
    }

    /// Frozen copy of the queue for one batch run.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.items.clone()
    }
}

fn normalize_entry(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(s.trim()),
        None => path.to_path_buf(),
    }
}

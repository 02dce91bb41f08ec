//! Merging ledger shards into one logical result set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::entry::LedgerEntry;
use super::store::{read_entries, write_entries_atomic};
use crate::error::LedgerError;

/// Aggregate numbers for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub solved: usize,
    /// Percentage of solved tasks.
    pub pass_rate: f64,
}

impl Summary {
    pub fn of(entries: &[LedgerEntry]) -> Self {
        let total = entries.len();
        let solved = entries.iter().filter(|e| e.is_solved()).count();
        let pass_rate = if total == 0 {
            0.0
        } else {
            solved as f64 / total as f64 * 100.0
        };
        Self {
            total,
            solved,
            pass_rate,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total={} solved={} pass_rate={:.2}%",
            self.total, self.solved, self.pass_rate
        )
    }
}

/// Result of merging shards.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub entries: Vec<LedgerEntry>,
    /// Shard indices (1-based) whose file was not found.
    pub missing_shards: Vec<usize>,
    /// Records dropped because their task was already seen.
    pub duplicates: usize,
    pub summary: Summary,
}

/// Path of shard `index` for a run: `{dir}/{run_name}p{index}.jsonl`.
pub fn shard_path(results_dir: &Path, run_name: &str, index: usize) -> PathBuf {
    results_dir.join(format!("{run_name}p{index}.jsonl"))
}

/// Path of the merged file for a run.
pub fn merged_path(results_dir: &Path, run_name: &str) -> PathBuf {
    results_dir.join(format!("{run_name}-merged.jsonl"))
}

/// Reads shards `1..=parts` in order and dedupes by `task_id`, keeping the
/// first record seen. Missing shards are reported, not fatal.
pub fn merge_shards(
    results_dir: &Path,
    run_name: &str,
    parts: usize,
) -> Result<MergeReport, LedgerError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut missing_shards = Vec::new();
    let mut duplicates = 0;

    for index in 1..=parts {
        let path = shard_path(results_dir, run_name, index);
        if !path.exists() {
            missing_shards.push(index);
            continue;
        }

        let shard = read_entries(&path)?;
        info!(shard = index, rows = shard.len(), "Loaded shard");
        for entry in shard {
            if seen.insert(entry.task_id.clone()) {
                entries.push(entry);
            } else {
                duplicates += 1;
            }
        }
    }

    if !missing_shards.is_empty() {
        warn!(missing = ?missing_shards, "Some shards were not found");
    }

    let summary = Summary::of(&entries);
    Ok(MergeReport {
        entries,
        missing_shards,
        duplicates,
        summary,
    })
}

/// Writes merged entries to `path`.
pub fn write_merged(path: &Path, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| LedgerError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    write_entries_atomic(path, entries, &[])
}

/// Half-open index ranges of dataset tasks that have no entry.
pub fn missing_ranges<'a>(
    task_ids: impl IntoIterator<Item = &'a str>,
    entries: &[LedgerEntry],
) -> Vec<(usize, usize)> {
    let done: HashSet<&str> = entries.iter().map(|e| e.task_id.as_str()).collect();
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for (idx, task_id) in task_ids.into_iter().enumerate() {
        if done.contains(task_id) {
            continue;
        }
        match ranges.last_mut() {
            Some((_, end)) if *end == idx => *end = idx + 1,
            _ => ranges.push((idx, idx + 1)),
        }
    }
    ranges
}

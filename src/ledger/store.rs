//! JSONL-backed result ledger for one shard.
//!
//! The in-memory map from `task_id` to entry is authoritative. The JSONL
//! file mirrors it: a task's first record is appended, later records for
//! the same task rewrite the file atomically so each task appears once.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::entry::LedgerEntry;
use crate::error::LedgerError;

/// Parsed contents of a shard file.
#[derive(Debug, Default)]
pub(crate) struct ShardContents {
    pub entries: Vec<LedgerEntry>,
    /// Raw lines that did not parse as entries, in file order.
    pub unreadable: Vec<String>,
}

/// Reads every parsable entry from a JSONL file. Later duplicates of a
/// `task_id` replace earlier ones in place.
pub(crate) fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
    Ok(read_shard(path)?.entries)
}

/// Like [`read_entries`], but also keeps the lines that failed to parse.
pub(crate) fn read_shard(path: &Path) -> Result<ShardContents, LedgerError> {
    let content = fs::read_to_string(path)?;
    let mut entries: Vec<LedgerEntry> = Vec::new();
    let mut unreadable: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: LedgerEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "Skipping unreadable ledger line"
                );
                unreadable.push(line.to_string());
                continue;
            }
        };
        match index.get(&entry.task_id) {
            Some(&slot) => entries[slot] = entry,
            None => {
                index.insert(entry.task_id.clone(), entries.len());
                entries.push(entry);
            }
        }
    }

    Ok(ShardContents {
        entries,
        unreadable,
    })
}

/// Writes entries as JSONL through a temporary file in the same directory.
/// `raw_lines` are written verbatim after the entries.
pub(crate) fn write_entries_atomic(
    path: &Path,
    entries: &[LedgerEntry],
    raw_lines: &[String],
) -> Result<(), LedgerError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_failed = |source: std::io::Error| LedgerError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let tmp = NamedTempFile::new_in(&dir).map_err(write_failed)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n").map_err(write_failed)?;
        }
        for line in raw_lines {
            writer.write_all(line.as_bytes()).map_err(write_failed)?;
            writer.write_all(b"\n").map_err(write_failed)?;
        }
        writer.flush().map_err(write_failed)?;
    }
    tmp.as_file().sync_all().map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// Single-writer ledger shard.
#[derive(Debug)]
pub struct ResultLedger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
    index: HashMap<String, usize>,
    /// Lines that failed to parse at open. Carried through rewrites.
    unreadable: Vec<String>,
}

impl ResultLedger {
    /// Opens the shard at `path`, creating its directory if needed.
    ///
    /// With `discard_previous_run` an existing shard is deleted first.
    pub fn open(path: impl Into<PathBuf>, discard_previous_run: bool) -> Result<Self, LedgerError> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LedgerError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let ShardContents {
            entries,
            unreadable,
        } = if path.exists() {
            if discard_previous_run {
                info!(path = %path.display(), "Discarding previous run");
                fs::remove_file(&path)?;
                ShardContents::default()
            } else {
                read_shard(&path)?
            }
        } else {
            ShardContents::default()
        };

        let index = entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| (entry.task_id.clone(), slot))
            .collect();

        info!(
            path = %path.display(),
            entries = entries.len(),
            unreadable = unreadable.len(),
            "Opened result ledger"
        );
        Ok(Self {
            path,
            entries,
            index,
            unreadable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, task_id: &str) -> Option<&LedgerEntry> {
        self.index.get(task_id).map(|&slot| &self.entries[slot])
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `entry`, replacing any existing entry for its task.
    ///
    /// Returns only after the change is on disk. A failure here means the
    /// shard can no longer be trusted and must stop the worker.
    pub fn upsert(&mut self, mut entry: LedgerEntry) -> Result<(), LedgerError> {
        entry.touch();

        match self.index.get(&entry.task_id) {
            Some(&slot) => {
                self.entries[slot] = entry;
                if !self.unreadable.is_empty() {
                    warn!(
                        path = %self.path.display(),
                        lines = self.unreadable.len(),
                        "Keeping unreadable lines at the end of the rewritten ledger"
                    );
                }
                write_entries_atomic(&self.path, &self.entries, &self.unreadable)?;
                debug!(task_id = %self.entries[slot].task_id, "Rewrote ledger entry");
            }
            None => {
                self.append_line(&entry)?;
                debug!(task_id = %entry.task_id, "Appended ledger entry");
                self.index.insert(entry.task_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    fn append_line(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let write_failed = |source: std::io::Error| LedgerError::WriteFailed {
            path: self.path.clone(),
            source,
        };

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).map_err(write_failed)?;
        file.sync_data().map_err(write_failed)?;
        Ok(())
    }
}

//! Process-level fan-out.
//!
//! The task range is cut into contiguous, non-overlapping slices and each
//! slice is handed to its own worker process with its own ledger shard.
//! Workers are never retried; rerunning the whole launch resumes them.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{error, info};

use crate::error::RunnerError;

/// A worker's share of the task list: `[start, end)`, 1-based `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
    pub index: usize,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Shard suffix given to the worker.
    pub fn suffix(&self) -> String {
        format!("p{}", self.index)
    }
}

/// Splits `[start, end)` of `total` items into at most `processes` slices of
/// `ceil(len / processes)` items. The last slice may be shorter.
pub fn compute_slices(
    total: usize,
    processes: usize,
    start_index: Option<usize>,
    end_index: Option<usize>,
) -> Result<Vec<Slice>, RunnerError> {
    if processes == 0 {
        return Err(RunnerError::NoProcesses);
    }

    let start = start_index.unwrap_or(0);
    let end = end_index.unwrap_or(total).min(total);
    if start > end {
        return Err(RunnerError::InvalidRange { start, end });
    }

    let chunk = (end - start).div_ceil(processes);
    if chunk == 0 {
        return Ok(Vec::new());
    }

    Ok((start..end)
        .step_by(chunk)
        .enumerate()
        .map(|(i, slice_start)| Slice {
            start: slice_start,
            end: (slice_start + chunk).min(end),
            index: i + 1,
        })
        .collect())
}

/// How one worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerExit {
    pub slice: Slice,
    /// `None` when the worker was killed by a signal or never ran.
    pub code: Option<i32>,
    /// Set when the worker could not be spawned or waited on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerExit {
    fn exited(slice: Slice, code: Option<i32>) -> Self {
        Self {
            slice,
            code,
            error: None,
        }
    }

    fn failed(slice: Slice, error: String) -> Self {
        Self {
            slice,
            code: None,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Exit status of every launched worker, in slice order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LaunchReport {
    pub workers: Vec<WorkerExit>,
}

impl LaunchReport {
    pub fn failures(&self) -> Vec<&WorkerExit> {
        self.workers.iter().filter(|w| !w.success()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.workers.iter().all(WorkerExit::success)
    }
}

/// Launches one worker process per slice and waits for all of them.
#[derive(Debug, Clone)]
pub struct ParallelRunner {
    program: PathBuf,
    args: Vec<String>,
    logs_prefix: Option<PathBuf>,
}

impl ParallelRunner {
    /// `args` are passed to every worker before the slice arguments.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            logs_prefix: None,
        }
    }

    /// Sends worker `i`'s stdout and stderr to `{prefix}{i}.log`.
    pub fn with_logs_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.logs_prefix = Some(prefix.into());
        self
    }

    pub fn log_path(&self, index: usize) -> Option<PathBuf> {
        self.logs_prefix
            .as_ref()
            .map(|prefix| PathBuf::from(format!("{}{index}.log", prefix.display())))
    }

    /// Arguments for the worker that owns `slice`.
    pub fn worker_args(&self, slice: &Slice) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--start-index".to_string(),
            slice.start.to_string(),
            "--end-index".to_string(),
            slice.end.to_string(),
            "--results-suffix".to_string(),
            slice.suffix(),
        ]);
        args
    }

    /// Computes slices and runs one worker per slice.
    pub async fn launch(
        &self,
        total_items: usize,
        processes: usize,
        start_index: Option<usize>,
        end_index: Option<usize>,
    ) -> Result<LaunchReport, RunnerError> {
        let slices = compute_slices(total_items, processes, start_index, end_index)?;
        Ok(self.run_slices(&slices).await)
    }

    /// Spawns every worker first, then waits for them in order.
    ///
    /// A worker that cannot be spawned or waited on is reported with
    /// `code: None` and its error; every worker that did start is still
    /// waited for.
    pub async fn run_slices(&self, slices: &[Slice]) -> LaunchReport {
        self.run_slices_with(slices, |slice| self.spawn(slice)).await
    }

    pub(crate) async fn run_slices_with<F>(&self, slices: &[Slice], mut spawn: F) -> LaunchReport
    where
        F: FnMut(&Slice) -> std::io::Result<Child>,
    {
        let mut launched: Vec<(Slice, Result<Child, String>)> = Vec::with_capacity(slices.len());

        for slice in slices {
            match spawn(slice) {
                Ok(child) => {
                    info!(
                        worker = slice.index,
                        start = slice.start,
                        end = slice.end,
                        pid = child.id(),
                        "Launched worker"
                    );
                    launched.push((*slice, Ok(child)));
                }
                Err(e) => {
                    error!(worker = slice.index, error = %e, "Failed to spawn worker");
                    launched.push((*slice, Err(e.to_string())));
                }
            }
        }

        let mut report = LaunchReport::default();
        for (slice, child) in launched {
            let exit = match child {
                Ok(mut child) => match child.wait().await {
                    Ok(status) => WorkerExit::exited(slice, status.code()),
                    Err(e) => WorkerExit::failed(slice, format!("wait failed: {e}")),
                },
                Err(e) => WorkerExit::failed(slice, format!("spawn failed: {e}")),
            };
            if exit.success() {
                info!(worker = slice.index, "Worker finished");
            } else {
                error!(
                    worker = slice.index,
                    code = ?exit.code,
                    error = exit.error.as_deref().unwrap_or(""),
                    "Worker failed"
                );
            }
            report.workers.push(exit);
        }

        report
    }

    fn spawn(&self, slice: &Slice) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(self.worker_args(slice))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(log_path) = self.log_path(slice.index) {
            ensure_parent(&log_path)?;
            let log = File::create(&log_path)?;
            command.stdout(Stdio::from(log.try_clone()?));
            command.stderr(Stdio::from(log));
        }

        command.spawn()
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

//! Campaign driver.
//!
//! # Architecture
//!
//! - **Orchestrator**: runs the synthesis strategy over one slice of tasks
//!   and persists every pass to that worker's ledger shard
//! - **Runner**: splits the task range and launches one worker process per
//!   slice
//! - **Config**: the YAML settings file and per-run identity (run name,
//!   shard path, slice bounds)
//!
//! # Example
//!
//! ```rust,ignore
//! use code_forge::pipeline::{compute_slices, ParallelRunner};
//!
//! let slices = compute_slices(164, 4, None, None)?;
//! let report = ParallelRunner::new(std::env::current_exe()?, worker_args)
//!     .with_logs_prefix("logs/humaneval-")
//!     .run_slices(&slices)
//!     .await;
//! if !report.all_succeeded() {
//!     eprintln!("failed workers: {:?}", report.failures());
//! }
//! ```

pub mod config;
pub mod orchestrator;
pub mod runner;

pub use config::{
    ExecutorSettings, GeneratorSettings, RunConfig, Settings, DEFAULT_LANGUAGE,
    DEFAULT_RESULTS_DIR,
};
pub use orchestrator::{PipelineOrchestrator, PipelineStats};
pub use runner::{compute_slices, LaunchReport, ParallelRunner, Slice, WorkerExit};

//! Command-line interface for code-forge.
//!
//! Provides the worker, parallel launcher, shard merge and executor
//! runtime commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, MergeArgs, ParallelArgs, RunArgs};

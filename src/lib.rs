//! code-forge: generation, verification and repair of candidate solutions
//! for code benchmarks, with a resumable pass@k result ledger.
//!
//! Tasks come from a [`problems::ProblemSource`]. A
//! [`strategy::SynthesisStrategy`] turns each task into candidates through a
//! generator model, checking them with an [`execution::CodeVerifier`]. The
//! [`pipeline::PipelineOrchestrator`] records every pass in a
//! [`ledger::ResultLedger`] shard, and the [`pipeline::ParallelRunner`] fans
//! a task file out over worker processes.

pub mod cli;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod llm;
pub mod pipeline;
pub mod problems;
pub mod strategy;

// Re-export commonly used error types
pub use error::{
    ConfigError, EmptyInput, ExecutorError, LedgerError, LlmError, PipelineError, ProblemError,
    RunnerError, StrategyError, VerifierError,
};

//! Error types for code-forge operations.
//!
//! Defines error types for all major subsystems:
//! - LLM API interactions (the generator)
//! - Code verification and execution backends
//! - The synthesis strategy
//! - Result ledger persistence
//! - Problem loading
//! - Pipeline orchestration and the parallel runner
//! - Configuration files

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE or OPENAI_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("LLM returned an empty completion for model '{0}'")]
    EmptyCompletion(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl LlmError {
    /// Returns true when the provider rejected the model itself, which makes
    /// retrying against a fallback model worthwhile.
    pub fn is_model_unavailable(&self) -> bool {
        match self {
            LlmError::EmptyCompletion(_) => true,
            LlmError::ApiError { message, .. } => {
                let message = message.to_lowercase();
                message.contains("no available channels for model")
                    || message.contains("model not found")
                    || message.contains("invalid_request_error")
            }
            _ => false,
        }
    }
}

/// Which mandatory verification input was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmptyInput {
    #[error("language must not be empty")]
    Language,

    #[error("source code must not be empty")]
    SourceCode,

    #[error("unit test list must not be empty")]
    Unittest,
}

/// Errors raised by the code verifier.
///
/// Only caller misuse surfaces here. Unreachable executors and failing
/// candidates are reported through outcomes instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("Invalid verification request: {0}")]
    EmptyInput(#[from] EmptyInput),
}

/// Errors from a single execution backend (remote service or local runner).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Execution service unavailable: {0}")]
    Unavailable(String),

    #[error("Execution service protocol error: {0}")]
    Protocol(String),

    #[error("Language '{0}' is not supported by this executor")]
    UnsupportedLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running the synthesis strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Generator failed: {0}")]
    Generator(#[from] LlmError),

    #[error("Verification failed: {0}")]
    Verifier(#[from] VerifierError),
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to create ledger directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write ledger shard {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading problems.
#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("Invalid task on line {line}: {message}")]
    InvalidTask { line: usize, message: String },

    #[error("Duplicate task id '{0}'")]
    DuplicateTaskId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while orchestrating a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Verifier misuse: {0}")]
    Verifier(#[from] VerifierError),
}

/// Errors that can occur in the parallel runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Invalid slice range: start={start} end={end}")]
    InvalidRange { start: usize, end: usize },

    #[error("Process count must be at least 1")]
    NoProcesses,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

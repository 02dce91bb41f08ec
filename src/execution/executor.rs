//! Execution backend contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::outcome::{Limits, TestCase, TestOutcome};
use crate::error::ExecutorError;

/// One request to run a candidate against a list of tests.
///
/// Field names follow the remote execution service's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub source_code: String,
    pub unittests: Vec<TestCase>,
    pub limits: Limits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_flags: Option<String>,
    pub block_network: bool,
    pub stop_on_first_fail: bool,
    pub use_sanitizer: bool,
}

impl ExecutionRequest {
    pub fn new(
        language: impl Into<String>,
        source_code: impl Into<String>,
        unittests: Vec<TestCase>,
    ) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            unittests,
            limits: Limits::default(),
            compile_cmd: None,
            compile_flags: None,
            execute_cmd: None,
            execute_flags: None,
            block_network: true,
            stop_on_first_fail: true,
            use_sanitizer: false,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_stop_on_first_fail(mut self, stop: bool) -> Self {
        self.stop_on_first_fail = stop;
        self
    }

    pub fn with_block_network(mut self, block: bool) -> Self {
        self.block_network = block;
        self
    }
}

/// Something that can run candidate code against tests.
///
/// Implementations report candidate failures through the returned
/// outcomes. `Err` is reserved for the backend itself misbehaving, which
/// lets the verifier fall back to another backend.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<TestOutcome>, ExecutorError>;
}

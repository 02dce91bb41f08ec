//! Verification vocabulary shared by every execution backend.

use serde::{Deserialize, Serialize};

use crate::problems::task::string_or_list;

/// Per-test verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    Passed,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
    CompileError,
    SandboxError,
}

impl ExecutionOutcome {
    pub fn is_passed(self) -> bool {
        self == Self::Passed
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::WrongAnswer => write!(f, "WRONG_ANSWER"),
            Self::RuntimeError => write!(f, "RUNTIME_ERROR"),
            Self::TimeLimitExceeded => write!(f, "TIME_LIMIT_EXCEEDED"),
            Self::CompileError => write!(f, "COMPILE_ERROR"),
            Self::SandboxError => write!(f, "SANDBOX_ERROR"),
        }
    }
}

/// A single test case: stdin text plus accepted outputs.
///
/// An empty `output` list means the program only has to exit cleanly,
/// which is how assertion-style test programs are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub output: Vec<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: vec![output.into()],
        }
    }

    /// A test that passes when the program exits with status zero.
    pub fn exit_only() -> Self {
        Self {
            input: String::new(),
            output: Vec::new(),
        }
    }

    pub fn expected(&self) -> Option<&str> {
        self.output.first().map(String::as_str)
    }
}

/// Result of running one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    #[serde(default)]
    pub input: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub output: Vec<String>,
    /// Captured stdout.
    #[serde(default)]
    pub result: String,
    pub exec_outcome: ExecutionOutcome,
    /// Captured stderr or an executor diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn new(test: &TestCase, result: impl Into<String>, exec_outcome: ExecutionOutcome) -> Self {
        Self {
            input: test.input.clone(),
            output: test.output.clone(),
            result: result.into(),
            exec_outcome,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        if !error.trim().is_empty() {
            self.error = Some(error);
        }
        self
    }

    /// Stand-in outcome when no backend could run the candidate at all.
    pub fn sandbox_error(message: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            output: Vec::new(),
            result: String::new(),
            exec_outcome: ExecutionOutcome::SandboxError,
            error: Some(message.into()),
        }
    }
}

/// Resource limits forwarded to the remote executor. Unset fields fall back
/// to the service's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// CPU time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u64>,
    /// Address space in KiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_space: Option<u64>,
    /// Maximum file size in KiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nofile: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nproc: Option<u64>,
}

impl Limits {
    pub fn with_cpu(mut self, seconds: u64) -> Self {
        self.cpu = Some(seconds);
        self
    }
}

/// Outcomes of one verification call plus the aggregate verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub outcomes: Vec<TestOutcome>,
    pub passed: bool,
}

impl Verification {
    /// The verdict is positive only when every submitted test ran and passed.
    pub fn from_outcomes(outcomes: Vec<TestOutcome>, submitted: usize) -> Self {
        let passed = submitted > 0
            && outcomes.len() == submitted
            && outcomes.iter().all(|o| o.exec_outcome.is_passed());
        Self { outcomes, passed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_names() {
        let json = serde_json::to_string(&ExecutionOutcome::TimeLimitExceeded).expect("serialize");
        assert_eq!(json, "\"TIME_LIMIT_EXCEEDED\"");

        let parsed: ExecutionOutcome = serde_json::from_str("\"WRONG_ANSWER\"").expect("parse");
        assert_eq!(parsed, ExecutionOutcome::WrongAnswer);
        assert_eq!(ExecutionOutcome::SandboxError.to_string(), "SANDBOX_ERROR");
    }

    #[test]
    fn test_limits_skip_unset_fields() {
        let limits = Limits::default().with_cpu(2);
        let json = serde_json::to_value(&limits).expect("serialize");
        assert_eq!(json, serde_json::json!({"cpu": 2}));
    }

    #[test]
    fn test_verdict_requires_every_test() {
        let test = TestCase::new("1", "2");
        let passed = TestOutcome::new(&test, "2", ExecutionOutcome::Passed);
        let failed = TestOutcome::new(&test, "3", ExecutionOutcome::WrongAnswer);

        assert!(Verification::from_outcomes(vec![passed.clone(), passed.clone()], 2).passed);
        assert!(!Verification::from_outcomes(vec![passed.clone()], 2).passed);
        assert!(!Verification::from_outcomes(vec![passed, failed], 2).passed);
        assert!(!Verification::from_outcomes(Vec::new(), 0).passed);
    }
}

//! Task-aware test harness.
//!
//! Turns a task plus candidate code into concrete test programs, runs them
//! through the [`CodeVerifier`] and condenses the outcomes into a pass flag
//! and feedback text for the repair loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::local::truncate;
use super::outcome::{ExecutionOutcome, Limits, TestCase, TestOutcome};
use super::verifier::CodeVerifier;
use crate::error::VerifierError;
use crate::problems::{SampleIo, Task};

const MAX_FEEDBACK: usize = 2000;

/// Which tests a check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestScope {
    /// Sample I/O when present, else the full test program. Used while
    /// generating and repairing.
    Samples,
    /// The full test program when present, else the samples. Used to decide
    /// whether a pass solved the task.
    Hidden,
}

/// Condensed result of checking one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub passed: bool,
    pub feedback: String,
    pub outcomes: Vec<TestOutcome>,
}

impl CheckResult {
    fn failed(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: feedback.into(),
            outcomes: Vec::new(),
        }
    }
}

/// Message used when a candidate lacks the required function.
pub fn missing_entry_point_feedback(entry_point: &str) -> String {
    format!("Missing required entry point function '{entry_point}'")
}

/// A program plus the tests to run it against.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestPlan {
    source: String,
    tests: Vec<TestCase>,
}

fn sample_plan(task: &Task, code: &str) -> Option<TestPlan> {
    let io: Vec<TestCase> = task
        .sample_io
        .iter()
        .filter_map(|sample| match sample {
            SampleIo::Io { input, output } => Some(TestCase {
                input: input.clone(),
                output: output.clone(),
            }),
            SampleIo::Assertion(_) => None,
        })
        .collect();
    if !io.is_empty() {
        return Some(TestPlan {
            source: code.to_string(),
            tests: io,
        });
    }

    let assertions: Vec<&str> = task
        .sample_io
        .iter()
        .filter_map(|sample| match sample {
            SampleIo::Assertion(line) if !line.trim().is_empty() => Some(line.as_str()),
            _ => None,
        })
        .collect();
    if assertions.is_empty() {
        return None;
    }

    Some(TestPlan {
        source: format!("{}\n\n{}\n", code.trim_end(), assertions.join("\n")),
        tests: vec![TestCase::exit_only()],
    })
}

fn full_test_plan(task: &Task, code: &str) -> Option<TestPlan> {
    let test = task.test.as_deref().filter(|t| !t.trim().is_empty())?;
    let mut source = format!("{}\n\n{}\n", code.trim_end(), test.trim_end());
    if let Some(entry_point) = task.entry_point() {
        if test.contains("def check(") {
            source.push_str(&format!("\ncheck({entry_point})\n"));
        }
    }
    Some(TestPlan {
        source,
        tests: vec![TestCase::exit_only()],
    })
}

fn test_plan(task: &Task, code: &str, scope: TestScope) -> Option<TestPlan> {
    match scope {
        TestScope::Samples => sample_plan(task, code).or_else(|| full_test_plan(task, code)),
        TestScope::Hidden => full_test_plan(task, code).or_else(|| sample_plan(task, code)),
    }
}

fn describe(outcome: &TestOutcome) -> String {
    let error = outcome.error.as_deref().unwrap_or_default().trim();
    match outcome.exec_outcome {
        ExecutionOutcome::Passed => String::new(),
        ExecutionOutcome::WrongAnswer => format!(
            "Wrong answer.\nInput:\n{}\nExpected output:\n{}\nYour output:\n{}",
            outcome.input,
            outcome.output.first().map(String::as_str).unwrap_or_default(),
            outcome.result
        ),
        ExecutionOutcome::RuntimeError if outcome.input.is_empty() => {
            format!("Runtime error:\n{error}")
        }
        ExecutionOutcome::RuntimeError => {
            format!("Runtime error on input:\n{}\n{error}", outcome.input)
        }
        ExecutionOutcome::TimeLimitExceeded => {
            format!("Time limit exceeded on input:\n{}", outcome.input)
        }
        ExecutionOutcome::CompileError => format!("Compilation failed:\n{error}"),
        ExecutionOutcome::SandboxError => format!("Execution sandbox error: {error}"),
    }
}

/// Renders failing outcomes as repair feedback.
pub fn format_feedback(outcomes: &[TestOutcome]) -> String {
    let failures: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.exec_outcome.is_passed())
        .map(describe)
        .collect();
    if failures.is_empty() {
        return "Not all tests were executed.".to_string();
    }
    truncate(&failures.join("\n\n"), MAX_FEEDBACK)
}

/// Checks candidates for one target language.
#[derive(Clone)]
pub struct TestHarness {
    verifier: Arc<CodeVerifier>,
    language: String,
    limits: Limits,
    stop_on_first_fail: bool,
}

impl TestHarness {
    pub fn new(verifier: Arc<CodeVerifier>, language: impl Into<String>) -> Self {
        Self {
            verifier,
            language: language.into(),
            limits: Limits::default(),
            stop_on_first_fail: true,
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

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Checks `code` against the tests `scope` selects.
    ///
    /// Empty code and a missing entry point fail without touching the
    /// sandbox. A task with no tests at all cannot be verified; the
    /// candidate is accepted so the repair loop terminates.
    pub async fn check(
        &self,
        task: &Task,
        code: &str,
        scope: TestScope,
    ) -> Result<CheckResult, VerifierError> {
        if code.trim().is_empty() {
            return Ok(CheckResult::failed("No code was produced."));
        }

        if let Some(entry_point) = task.entry_point() {
            if !code.contains(&format!("def {entry_point}(")) {
                debug!(task_id = %task.task_id, entry_point, "Candidate lacks entry point");
                return Ok(CheckResult::failed(missing_entry_point_feedback(entry_point)));
            }
        }

        let Some(plan) = test_plan(task, code, scope) else {
            warn!(task_id = %task.task_id, "Task has no tests, accepting candidate unverified");
            return Ok(CheckResult {
                passed: true,
                feedback: "passed".to_string(),
                outcomes: Vec::new(),
            });
        };

        let verification = self
            .verifier
            .verify(
                &self.language,
                &plan.source,
                &plan.tests,
                &self.limits,
                self.stop_on_first_fail,
            )
            .await?;

        let feedback = if verification.passed {
            "passed".to_string()
        } else {
            format_feedback(&verification.outcomes)
        };

        Ok(CheckResult {
            passed: verification.passed,
            feedback,
            outcomes: verification.outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::execution::executor::{CodeExecutor, ExecutionRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and passes them all.
    #[derive(Default)]
    struct RecordingExecutor {
        requests: Mutex<Vec<ExecutionRequest>>,
    }

    #[async_trait]
    impl CodeExecutor for RecordingExecutor {
        fn name(&self) -> &str {
            "recording"
        }

        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<Vec<TestOutcome>, ExecutorError> {
            self.requests
                .lock()
                .expect("lock not poisoned")
                .push(request.clone());
            Ok(request
                .unittests
                .iter()
                .map(|t| TestOutcome::new(t, t.expected().unwrap_or_default(), ExecutionOutcome::Passed))
                .collect())
        }
    }

    fn harness() -> (TestHarness, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        let verifier = Arc::new(CodeVerifier::new(executor.clone()));
        (TestHarness::new(verifier, "Python 3"), executor)
    }

    #[tokio::test]
    async fn test_missing_entry_point_skips_sandbox() {
        let (harness, executor) = harness();
        let task = Task::new("t", "p")
            .with_entry_point("add_one")
            .with_test("def check(f):\n    assert f(1) == 2");

        let result = harness
            .check(&task, "def add(x):\n    return x + 1", TestScope::Samples)
            .await
            .expect("check");

        assert!(!result.passed);
        assert_eq!(result.feedback, "Missing required entry point function 'add_one'");
        assert!(executor.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_full_test_program_calls_check() {
        let (harness, executor) = harness();
        let task = Task::new("t", "p")
            .with_entry_point("add_one")
            .with_test("def check(f):\n    assert f(1) == 2");

        let result = harness
            .check(&task, "def add_one(x):\n    return x + 1", TestScope::Hidden)
            .await
            .expect("check");
        assert!(result.passed);

        let requests = executor.requests.lock().expect("lock");
        assert_eq!(
            requests[0].source_code,
            "def add_one(x):\n    return x + 1\n\ndef check(f):\n    assert f(1) == 2\n\ncheck(add_one)\n"
        );
        assert_eq!(requests[0].unittests, vec![TestCase::exit_only()]);
    }

    #[tokio::test]
    async fn test_scope_selects_samples_or_full_test() {
        let (harness, executor) = harness();
        let task = Task::new("t", "p")
            .with_entry_point("f")
            .with_sample(SampleIo::Assertion("assert f(1) == 2".to_string()))
            .with_test("def check(c):\n    assert c(2) == 3");
        let code = "def f(x):\n    return x + 1";

        harness.check(&task, code, TestScope::Samples).await.expect("check");
        harness.check(&task, code, TestScope::Hidden).await.expect("check");

        let requests = executor.requests.lock().expect("lock");
        assert!(requests[0].source_code.ends_with("assert f(1) == 2\n"));
        assert!(requests[1].source_code.ends_with("check(f)\n"));
    }

    #[tokio::test]
    async fn test_io_samples_become_test_cases() {
        let (harness, executor) = harness();
        let task = Task::new("t", "p").with_sample(SampleIo::Io {
            input: "2".to_string(),
            output: vec!["4".to_string()],
        });

        harness
            .check(&task, "print(int(input()) * 2)", TestScope::Samples)
            .await
            .expect("check");

        let requests = executor.requests.lock().expect("lock");
        assert_eq!(requests[0].source_code, "print(int(input()) * 2)");
        assert_eq!(requests[0].unittests, vec![TestCase::new("2", "4")]);
    }

    #[tokio::test]
    async fn test_no_tests_accepts_candidate() {
        let (harness, executor) = harness();
        let task = Task::new("t", "p");

        let result = harness.check(&task, "print(1)", TestScope::Hidden).await.expect("check");
        assert!(result.passed);
        assert!(executor.requests.lock().expect("lock").is_empty());

        let result = harness.check(&task, "", TestScope::Hidden).await.expect("check");
        assert!(!result.passed);
    }

    #[test]
    fn test_feedback_formatting() {
        let wrong = TestOutcome::new(&TestCase::new("3", "6"), "7", ExecutionOutcome::WrongAnswer);
        let crash = TestOutcome::new(&TestCase::exit_only(), "", ExecutionOutcome::RuntimeError)
            .with_error("AssertionError");

        let feedback = format_feedback(&[wrong, crash]);
        assert!(feedback.contains("Input:\n3\nExpected output:\n6\nYour output:\n7"));
        assert!(feedback.contains("Runtime error:\nAssertionError"));
    }
}

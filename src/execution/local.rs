//! Local single-language fallback runner.
//!
//! Writes the candidate to a temporary `.py` file and runs it once per test
//! case with the test input on stdin. Only Python 3 is supported.

use std::io::Write;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::executor::{CodeExecutor, ExecutionRequest};
use super::outcome::{ExecutionOutcome, TestCase, TestOutcome};
use crate::error::ExecutorError;

/// Per-test wall-clock bound.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CAPTURE: usize = 4000;

/// Runs Python candidates as child processes.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    interpreter: String,
    timeout: Duration,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: DEFAULT_TEST_TIMEOUT,
        }
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Whether `language` names Python 3 ("Python 3", "python3", "Python").
    pub fn supports(language: &str) -> bool {
        let normalized: String = language
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        normalized == "python3" || normalized == "python"
    }

    async fn spawn_and_wait(&self, script: &Path, input: &str) -> std::io::Result<Output> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = script.parent() {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // Programs that never read stdin may close the pipe first.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
        }
        child.wait_with_output().await
    }

    async fn run_test(&self, script: &Path, test: &TestCase) -> TestOutcome {
        match tokio::time::timeout(self.timeout, self.spawn_and_wait(script, &test.input)).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if !output.status.success() {
                    return TestOutcome::new(test, stdout, ExecutionOutcome::RuntimeError)
                        .with_error(truncate(&stderr, MAX_CAPTURE));
                }

                let outcome = match test.expected() {
                    None => ExecutionOutcome::Passed,
                    Some(expected) if stdout == expected.trim() => ExecutionOutcome::Passed,
                    Some(_) => ExecutionOutcome::WrongAnswer,
                };
                TestOutcome::new(test, stdout, outcome)
            }
            Ok(Err(e)) => TestOutcome::new(test, "", ExecutionOutcome::RuntimeError)
                .with_error(format!("failed to run {}: {e}", self.interpreter)),
            Err(_) => TestOutcome::new(test, "", ExecutionOutcome::TimeLimitExceeded)
                .with_error(format!("timed out after {}s", self.timeout.as_secs_f64())),
        }
    }
}

#[async_trait]
impl CodeExecutor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<TestOutcome>, ExecutorError> {
        if !Self::supports(&request.language) {
            return Err(ExecutorError::UnsupportedLanguage(request.language.clone()));
        }

        let mut script = tempfile::Builder::new()
            .prefix("candidate_")
            .suffix(".py")
            .tempfile()?;
        script.write_all(dedent(&request.source_code).as_bytes())?;
        script.flush()?;

        let mut outcomes = Vec::with_capacity(request.unittests.len());
        for test in &request.unittests {
            let outcome = self.run_test(script.path(), test).await;
            let failed = !outcome.exec_outcome.is_passed();
            debug!(outcome = %outcome.exec_outcome, "Local test finished");
            outcomes.push(outcome);
            if failed && request.stop_on_first_fail {
                break;
            }
        }

        if let Err(e) = script.close() {
            warn!(error = %e, "Failed to remove candidate script");
        }

        Ok(outcomes)
    }
}

/// Removes the indentation common to every non-blank line.
fn dedent(source: &str) -> String {
    let indent = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return source.to_string();
    }

    source
        .lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_supports_python_spellings() {
        assert!(LocalExecutor::supports("Python 3"));
        assert!(LocalExecutor::supports("python3"));
        assert!(LocalExecutor::supports("Python"));
        assert!(!LocalExecutor::supports("C++"));
        assert!(!LocalExecutor::supports(""));
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    def f():\n        return 1"), "def f():\n    return 1");
        assert_eq!(dedent("x = 1\n  y = 2"), "x = 1\n  y = 2");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...[truncated]");
    }

    #[tokio::test]
    async fn test_rejects_other_languages() {
        let request = ExecutionRequest::new("C++", "int main(){}", vec![TestCase::exit_only()]);
        let err = LocalExecutor::new().execute(&request).await.unwrap_err();
        assert!(matches!(err, ExecutorError::UnsupportedLanguage(_)));
    }

    #[tokio::test]
    async fn test_stop_on_first_fail_returns_two_of_four() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }

        let tests = vec![
            TestCase::new("1", "2"),
            TestCase::new("2", "5"),
            TestCase::new("3", "6"),
            TestCase::new("4", "8"),
        ];
        let request = ExecutionRequest::new("Python 3", "print(int(input()) * 2)", tests)
            .with_stop_on_first_fail(true);

        let outcomes = LocalExecutor::new().execute(&request).await.expect("execute");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].exec_outcome, ExecutionOutcome::Passed);
        assert_eq!(outcomes[1].exec_outcome, ExecutionOutcome::WrongAnswer);
        assert_eq!(outcomes[1].result, "4");

        let request = request.with_stop_on_first_fail(false);
        let outcomes = LocalExecutor::new().execute(&request).await.expect("execute");
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_runtime_error_and_timeout() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }

        let request = ExecutionRequest::new(
            "python3",
            "raise ValueError('boom')",
            vec![TestCase::exit_only()],
        );
        let outcomes = LocalExecutor::new().execute(&request).await.expect("execute");
        assert_eq!(outcomes[0].exec_outcome, ExecutionOutcome::RuntimeError);
        assert!(outcomes[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("ValueError")));

        let request = ExecutionRequest::new(
            "python3",
            "import time\ntime.sleep(10)",
            vec![TestCase::exit_only()],
        );
        let executor = LocalExecutor::new().with_timeout(Duration::from_millis(300));
        let outcomes = executor.execute(&request).await.expect("execute");
        assert_eq!(outcomes[0].exec_outcome, ExecutionOutcome::TimeLimitExceeded);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_runtime_error() {
        let request = ExecutionRequest::new("python3", "print(1)", vec![TestCase::new("", "1")]);
        let executor = LocalExecutor::new().with_interpreter("definitely-not-a-python-binary");
        let outcomes = executor.execute(&request).await.expect("execute");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].exec_outcome, ExecutionOutcome::RuntimeError);
    }
}

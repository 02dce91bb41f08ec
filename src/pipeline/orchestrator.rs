//! Per-worker driver: tasks in, ledger entries out.
//!
//! Each task is looked up in the ledger by `task_id`, so a restarted worker
//! picks up where it stopped no matter how the task list was sliced. Every
//! pass is persisted before the next one starts.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{PipelineError, StrategyError};
use crate::execution::TestScope;
use crate::ledger::{Attempt, LedgerEntry, ResultLedger};
use crate::problems::Task;
use crate::strategy::{PassTally, SynthesisStrategy};

/// Counters for one [`PipelineOrchestrator::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Tasks handed to the run.
    pub total: usize,
    /// Tasks that were already solved or out of passes when the run began.
    pub skipped: usize,
    /// Passes executed during this run.
    pub passes: usize,
    /// Passes cut short by a generator error.
    pub generator_failures: usize,
    /// Tasks solved at the end of the run, including skipped ones.
    pub solved: usize,
    pub elapsed: Duration,
}

impl PipelineStats {
    /// Fraction of handed tasks that are solved.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.solved as f64 / self.total as f64
        }
    }
}

/// Runs the synthesis strategy over tasks and records results in a ledger.
pub struct PipelineOrchestrator {
    strategy: SynthesisStrategy,
    ledger: ResultLedger,
}

impl PipelineOrchestrator {
    pub fn new(strategy: SynthesisStrategy, ledger: ResultLedger) -> Self {
        Self { strategy, ledger }
    }

    pub fn ledger(&self) -> &ResultLedger {
        &self.ledger
    }

    /// Processes `tasks` in order, allowing up to `pass_at_k` passes each.
    ///
    /// Returns an error only when the ledger cannot be written or the
    /// verifier was called with an invalid request.
    pub async fn run(
        &mut self,
        tasks: &[Task],
        pass_at_k: usize,
    ) -> Result<PipelineStats, PipelineError> {
        let started = Instant::now();
        let mut stats = PipelineStats {
            total: tasks.len(),
            ..Default::default()
        };

        info!(
            tasks = tasks.len(),
            pass_at_k,
            mode = %self.strategy.mode(),
            ledger = %self.ledger.path().display(),
            "Starting run"
        );

        for (i, task) in tasks.iter().enumerate() {
            let solved = self.run_task(task, pass_at_k, &mut stats).await?;
            if solved {
                stats.solved += 1;
            }
            info!(
                task_id = %task.task_id,
                "Completed {}/{}, solved={}, success={}, acc={:.2}",
                i + 1,
                tasks.len(),
                solved,
                stats.solved,
                stats.solved as f64 / (i + 1) as f64
            );
        }

        stats.elapsed = started.elapsed();
        info!(
            total = stats.total,
            solved = stats.solved,
            skipped = stats.skipped,
            passes = stats.passes,
            generator_failures = stats.generator_failures,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "Run finished"
        );
        Ok(stats)
    }

    /// Runs the remaining passes of one task. Returns whether it is solved.
    async fn run_task(
        &mut self,
        task: &Task,
        pass_at_k: usize,
        stats: &mut PipelineStats,
    ) -> Result<bool, PipelineError> {
        let mut entry = match self.ledger.get(&task.task_id) {
            Some(existing) => existing.clone(),
            None => LedgerEntry::new(
                task.task_id.clone(),
                Attempt::new(self.strategy.language()),
            ),
        };

        if entry.attempt.is_finished(pass_at_k) {
            info!(
                task_id = %task.task_id,
                solved = entry.is_solved(),
                tries = entry.attempt.no_of_try,
                "Skipping finished task"
            );
            stats.skipped += 1;
            return Ok(entry.is_solved());
        }

        while !entry.attempt.is_finished(pass_at_k) {
            let mut tally = PassTally::default();
            stats.passes += 1;

            match self.strategy.run_pass(task, &mut tally).await {
                Ok(output) => {
                    let check = self
                        .strategy
                        .harness()
                        .check(task, &output.code, TestScope::Hidden)
                        .await?;

                    entry.attempt.record_pass(
                        output.code,
                        output.response,
                        tally.prompt_tokens,
                        tally.completion_tokens,
                    );
                    entry.attempt.is_solved = check.passed;
                    entry.attempt.language = self.strategy.language().to_string();
                    entry.attempt.api_calls += u64::from(tally.api_calls);
                    self.ledger.upsert(entry.clone())?;

                    info!(
                        task_id = %task.task_id,
                        pass = entry.attempt.no_of_try,
                        solved = check.passed,
                        "Pass recorded"
                    );
                }
                Err(StrategyError::Generator(e)) => {
                    error!(task_id = %task.task_id, error = %e, "Generator failed, recording failed pass");
                    stats.generator_failures += 1;

                    // Partial usage is kept in `api_calls` only.
                    entry.attempt.record_pass("", e.to_string(), 0, 0);
                    entry.attempt.is_solved = false;
                    entry.attempt.api_calls += u64::from(tally.api_calls);
                    self.ledger.upsert(entry.clone())?;
                    break;
                }
                Err(StrategyError::Verifier(e)) => {
                    warn!(task_id = %task.task_id, error = %e, "Invalid verification request");
                    return Err(e.into());
                }
            }
        }

        Ok(entry.is_solved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutorError, LlmError};
    use crate::execution::{
        CodeExecutor, CodeVerifier, ExecutionOutcome, ExecutionRequest, TestHarness, TestOutcome,
    };
    use crate::llm::{
        Choice, GenerationRequest, GenerationResponse, Generator, GeneratorProfile, LlmProvider,
        Message, Usage,
    };
    use crate::problems::{JsonlProblemSource, SampleIo};
    use crate::strategy::StrategyConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Replays scripted replies; an exhausted script is a request failure.
    struct MockLlmProvider {
        responses: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let content = self
                .responses
                .lock()
                .expect("lock not poisoned")
                .get(idx)
                .cloned()
                .ok_or_else(|| LlmError::RequestFailed("connection refused".to_string()))?;

            Ok(GenerationResponse {
                id: format!("mock-{idx}"),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                },
            })
        }
    }

    /// Passes candidates that contain `x + 1`.
    struct MarkerExecutor;

    #[async_trait]
    impl CodeExecutor for MarkerExecutor {
        fn name(&self) -> &str {
            "marker"
        }

        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<Vec<TestOutcome>, ExecutorError> {
            let outcome = if request.source_code.contains("x + 1") {
                ExecutionOutcome::Passed
            } else {
                ExecutionOutcome::WrongAnswer
            };
            Ok(request
                .unittests
                .iter()
                .map(|t| TestOutcome::new(t, "", outcome))
                .collect())
        }
    }

    fn task() -> Task {
        Task::new("t/0", "Return x + 1.")
            .with_entry_point("add_one")
            .with_sample(SampleIo::Assertion("assert add_one(1) == 2".to_string()))
            .with_test("def check(candidate):\n    assert candidate(1) == 2\n")
    }

    fn orchestrator(dir: &TempDir, responses: Vec<&str>) -> (PipelineOrchestrator, Arc<MockLlmProvider>) {
        let provider = Arc::new(MockLlmProvider {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            call_count: AtomicUsize::new(0),
        });
        let verifier = Arc::new(CodeVerifier::new(Arc::new(MarkerExecutor)));
        let harness = TestHarness::new(verifier, "Python3");
        let source = Arc::new(JsonlProblemSource::from_tasks("unit", vec![task()]));
        let strategy = SynthesisStrategy::new(
            Generator::new(
                provider.clone(),
                GeneratorProfile::new("m").without_structured_output(),
            ),
            harness,
            source,
            StrategyConfig::default().with_max_retries(1),
        );
        let ledger = ResultLedger::open(dir.path().join("shard.jsonl"), false).expect("ledger");
        (PipelineOrchestrator::new(strategy, ledger), provider)
    }

    const GOOD: &str = "```python\ndef add_one(x):\n    return x + 1\n```";
    const BAD: &str = "```python\ndef add_one(x):\n    return x\n```";

    #[tokio::test]
    async fn test_generator_failure_is_recorded_and_ends_task() {
        let dir = TempDir::new().expect("tempdir");
        let (mut orchestrator, _) = orchestrator(&dir, vec![]);

        let stats = orchestrator.run(&[task()], 3).await.expect("run");
        assert_eq!(stats.generator_failures, 1);
        assert_eq!(stats.solved, 0);

        let entry = orchestrator.ledger().get("t/0").expect("entry");
        assert_eq!(entry.attempt.no_of_try, 1);
        assert_eq!(entry.attempt.source_codes, vec![String::new()]);
        assert!(entry.attempt.responses[0].contains("connection refused"));
        assert_eq!(entry.attempt.prompt_tokens, vec![0]);
        assert!(entry.attempt.is_consistent());
    }

    #[tokio::test]
    async fn test_generator_failure_mid_pass_records_zero_tokens() {
        let dir = TempDir::new().expect("tempdir");
        // The first code request succeeds, the repair request fails.
        let (mut orchestrator, provider) = orchestrator(&dir, vec![BAD]);

        let stats = orchestrator.run(&[task()], 1).await.expect("run");
        assert_eq!(stats.generator_failures, 1);
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 2);

        let entry = orchestrator.ledger().get("t/0").expect("entry");
        assert_eq!(entry.attempt.source_codes, vec![String::new()]);
        assert_eq!(entry.attempt.prompt_tokens, vec![0]);
        assert_eq!(entry.attempt.completion_tokens, vec![0]);
        assert_eq!(entry.attempt.api_calls, 1);
        assert!(!entry.is_solved());
        assert!(entry.attempt.is_consistent());
    }

    #[tokio::test]
    async fn test_passes_stop_at_pass_at_k() {
        let dir = TempDir::new().expect("tempdir");
        // Each pass is one code request plus one repair.
        let (mut orchestrator, provider) = orchestrator(&dir, vec![BAD, BAD, BAD, BAD]);

        let stats = orchestrator.run(&[task()], 2).await.expect("run");
        assert_eq!(stats.passes, 2);
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 4);

        let entry = orchestrator.ledger().get("t/0").expect("entry");
        assert_eq!(entry.attempt.no_of_try, 2);
        assert_eq!(entry.attempt.api_calls, 4);
        assert_eq!(entry.attempt.prompt_tokens, vec![200, 200]);
        assert!(!entry.is_solved());
        assert!(entry.attempt.is_consistent());
    }

    #[tokio::test]
    async fn test_solved_task_is_not_rerun() {
        let dir = TempDir::new().expect("tempdir");
        let (mut orchestrator, provider) = orchestrator(&dir, vec![GOOD]);

        let first = orchestrator.run(&[task()], 3).await.expect("run");
        assert_eq!(first.solved, 1);
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);

        let second = orchestrator.run(&[task()], 3).await.expect("rerun");
        assert_eq!(second.skipped, 1);
        assert_eq!(second.solved, 1);
        assert_eq!(second.accuracy(), 1.0);
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.ledger().len(), 1);
    }
}

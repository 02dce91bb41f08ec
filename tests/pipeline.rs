//! End-to-end tests for the orchestrator, strategy, verifier and ledger.
//!
//! The generator is scripted and the sandbox is an in-process executor, so
//! these run offline. The stdin/stdout test uses the local Python fallback
//! and skips itself when no interpreter is installed.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use code_forge::error::{ExecutorError, LlmError};
use code_forge::execution::{
    CodeExecutor, CodeVerifier, ExecutionOutcome, ExecutionRequest, LocalExecutor,
    RemoteExecutor, TestHarness, TestOutcome,
};
use code_forge::ledger::{merge_shards, shard_path, ResultLedger};
use code_forge::llm::{
    Choice, GenerationRequest, GenerationResponse, Generator, GeneratorProfile, LlmProvider,
    Message, Usage,
};
use code_forge::pipeline::PipelineOrchestrator;
use code_forge::problems::{JsonlProblemSource, SampleIo, Task};
use code_forge::strategy::{StrategyConfig, SynthesisStrategy};

/// Replays scripted replies in order. Running past the end of the script
/// fails the request like an unreachable endpoint would.
struct MockLlmProvider {
    responses: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockLlmProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            call_count: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
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

/// Evaluates `add_one` candidates by inspecting their body.
#[derive(Default)]
struct AddOneSandbox {
    requests: AtomicUsize,
}

impl AddOneSandbox {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExecutor for AddOneSandbox {
    fn name(&self) -> &str {
        "add-one"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<TestOutcome>, ExecutorError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let outcome = if request.source_code.contains("return x + 1") {
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

const GOOD: &str = "Here you go:\n```python\ndef add_one(x):\n    return x + 1\n```";
const WRONG: &str = "```python\ndef add_one(x):\n    return x + 2\n```";
const MISNAMED: &str = "```python\ndef increment(x):\n    return x + 1\n```";

fn add_one_task(id: &str) -> Task {
    Task::new(id, "Write a function add_one(x) that returns x + 1.")
        .with_entry_point("add_one")
        .with_sample(SampleIo::Assertion("assert add_one(1) == 2".to_string()))
        .with_test("def check(candidate):\n    assert candidate(1) == 2\n    assert candidate(-1) == 0\n")
}

fn fast_profile() -> GeneratorProfile {
    GeneratorProfile::new("mock-model").without_structured_output()
}

fn orchestrator(
    provider: Arc<MockLlmProvider>,
    executor: Arc<dyn CodeExecutor>,
    tasks: Vec<Task>,
    ledger_path: &Path,
    config: StrategyConfig,
) -> PipelineOrchestrator {
    let verifier = Arc::new(CodeVerifier::new(executor));
    let harness = TestHarness::new(verifier, "Python3");
    let source = Arc::new(JsonlProblemSource::from_tasks("unit", tasks));
    let strategy = SynthesisStrategy::new(
        Generator::new(provider, fast_profile()),
        harness,
        source,
        config,
    );
    let ledger = ResultLedger::open(ledger_path, false).expect("open ledger");
    PipelineOrchestrator::new(strategy, ledger)
}

fn ledger_lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .expect("read ledger")
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("ledger line is JSON"))
        .collect()
}

#[tokio::test]
async fn test_add_one_repaired_within_one_pass() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    let provider = MockLlmProvider::new(&[WRONG, GOOD]);
    let sandbox = Arc::new(AddOneSandbox::default());

    let mut orchestrator = orchestrator(
        provider.clone(),
        sandbox.clone(),
        vec![add_one_task("HumanEval/0")],
        &path,
        StrategyConfig::default(),
    );
    let stats = orchestrator
        .run(&[add_one_task("HumanEval/0")], 1)
        .await
        .expect("run");

    assert_eq!(stats.solved, 1);
    assert_eq!(provider.calls(), 2);
    // Sample check, sample check after repair, hidden check.
    assert_eq!(sandbox.requests(), 3);

    let lines = ledger_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["task_id"], "HumanEval/0");
    assert_eq!(lines[0]["is_solved"], true);
    assert_eq!(lines[0]["no_of_try"], 1);
    assert_eq!(lines[0]["source_codes"][0], "def add_one(x):\n    return x + 1");
    assert_eq!(lines[0]["prompt_tokens"][0], 200);
    assert_eq!(lines[0]["api_calls"], 2);
}

#[tokio::test]
async fn test_missing_entry_point_never_reaches_sandbox() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    let provider = MockLlmProvider::new(&[MISNAMED, MISNAMED]);
    let sandbox = Arc::new(AddOneSandbox::default());

    let mut orchestrator = orchestrator(
        provider.clone(),
        sandbox.clone(),
        vec![add_one_task("t")],
        &path,
        StrategyConfig::default().with_max_retries(1),
    );
    let stats = orchestrator.run(&[add_one_task("t")], 1).await.expect("run");

    assert_eq!(stats.solved, 0);
    assert_eq!(sandbox.requests(), 0);
    let entry = orchestrator.ledger().get("t").expect("entry");
    assert!(!entry.is_solved());
    assert!(entry.attempt.source_codes[0].contains("def increment("));
}

#[tokio::test]
async fn test_rerun_on_solved_ledger_makes_no_calls() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    let tasks = vec![add_one_task("a"), add_one_task("b")];

    let provider = MockLlmProvider::new(&[GOOD, GOOD]);
    let sandbox = Arc::new(AddOneSandbox::default());
    let mut first = orchestrator(
        provider.clone(),
        sandbox.clone(),
        tasks.clone(),
        &path,
        StrategyConfig::default(),
    );
    first.run(&tasks, 3).await.expect("first run");
    let before = fs::read_to_string(&path).expect("ledger");

    let provider = MockLlmProvider::new(&[]);
    let sandbox = Arc::new(AddOneSandbox::default());
    let mut second = orchestrator(
        provider.clone(),
        sandbox.clone(),
        tasks.clone(),
        &path,
        StrategyConfig::default(),
    );
    let stats = second.run(&tasks, 3).await.expect("second run");

    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.solved, 2);
    assert_eq!(provider.calls(), 0);
    assert_eq!(sandbox.requests(), 0);
    assert_eq!(fs::read_to_string(&path).expect("ledger"), before);
}

#[tokio::test]
async fn test_resume_continues_without_duplicating_entries() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    let tasks = vec![add_one_task("a"), add_one_task("b"), add_one_task("c")];
    let config = StrategyConfig::default().with_max_retries(1);

    // First worker dies after task "a": only it is in the ledger.
    let provider = MockLlmProvider::new(&[WRONG, WRONG]);
    let mut first = orchestrator(
        provider,
        Arc::new(AddOneSandbox::default()),
        tasks.clone(),
        &path,
        config.clone(),
    );
    first.run(&tasks[..1], 2).await.expect("interrupted run");
    {
        let entry = first.ledger().get("a").expect("a recorded");
        assert_eq!(entry.attempt.no_of_try, 2);
        assert!(!entry.is_solved());
    }

    // The restarted worker resumes "a" at its budget and picks up the rest,
    // even though its task list is ordered differently.
    let provider = MockLlmProvider::new(&[GOOD, WRONG, GOOD]);
    let reordered = vec![tasks[2].clone(), tasks[1].clone(), tasks[0].clone()];
    let mut second = orchestrator(
        provider.clone(),
        Arc::new(AddOneSandbox::default()),
        tasks.clone(),
        &path,
        config,
    );
    let stats = second.run(&reordered, 2).await.expect("resumed run");

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.solved, 2);
    assert_eq!(provider.calls(), 3);

    let lines = ledger_lines(&path);
    let mut ids: Vec<&str> = lines.iter().filter_map(|l| l["task_id"].as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b", "c"]);

    for entry in second.ledger().entries() {
        assert!(entry.attempt.is_consistent(), "{} lists out of step", entry.task_id);
    }
    assert_eq!(second.ledger().get("a").expect("a").attempt.no_of_try, 2);
}

#[tokio::test]
async fn test_pass_at_k_keeps_lists_aligned_across_failures() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    // Pass one fails twice over, pass two loses the generator midway.
    let provider = MockLlmProvider::new(&[WRONG, WRONG]);
    let mut orchestrator = orchestrator(
        provider,
        Arc::new(AddOneSandbox::default()),
        vec![add_one_task("t")],
        &path,
        StrategyConfig::default().with_max_retries(1),
    );

    let stats = orchestrator.run(&[add_one_task("t")], 3).await.expect("run");
    assert_eq!(stats.generator_failures, 1);

    let reopened = ResultLedger::open(&path, false).expect("reopen");
    let attempt = &reopened.get("t").expect("entry").attempt;
    assert_eq!(attempt.no_of_try, 2);
    assert!(attempt.is_consistent());
    assert_eq!(attempt.source_codes[1], "");
    assert_eq!(attempt.prompt_tokens, vec![200, 0]);
    assert!(attempt.responses[1].contains("connection refused"));
}

#[tokio::test]
async fn test_worker_shards_merge_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    let run = "mock-model-fast-unit-Python3-0.0-1";
    let tasks = vec![add_one_task("a"), add_one_task("b"), add_one_task("c")];

    for (index, slice) in [(1, &tasks[..2]), (2, &tasks[2..])] {
        let provider = MockLlmProvider::new(&[GOOD, GOOD]);
        let mut worker = orchestrator(
            provider,
            Arc::new(AddOneSandbox::default()),
            tasks.clone(),
            &shard_path(dir.path(), run, index),
            StrategyConfig::default(),
        );
        worker.run(slice, 1).await.expect("worker run");
    }

    let report = merge_shards(dir.path(), run, 2).expect("merge");
    assert!(report.missing_shards.is_empty());
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.solved, 3);
    assert_eq!(report.summary.pass_rate, 100.0);
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_stdio_task_through_local_fallback() {
    if !python_available() {
        eprintln!("python3 not found, skipping");
        return;
    }

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.jsonl");
    let task = Task::new("stdio/0", "Read n and print n + 1.").with_sample(SampleIo::Io {
        input: "3\n".to_string(),
        output: vec!["4".to_string()],
    });
    let provider = MockLlmProvider::new(&[
        "```python\nn = int(input())\nprint(n)\n```",
        "```python\nn = int(input())\nprint(n + 1)\n```",
    ]);

    // Nothing listens on this port, so every check lands on the fallback.
    let remote = Arc::new(RemoteExecutor::new("http://127.0.0.1:65535"));
    let verifier = Arc::new(CodeVerifier::new(remote).with_fallback(LocalExecutor::new()));
    let harness = TestHarness::new(verifier, "Python3");
    let source = Arc::new(JsonlProblemSource::from_tasks("stdio", vec![task.clone()]));
    let strategy = SynthesisStrategy::new(
        Generator::new(provider.clone(), fast_profile()),
        harness,
        source,
        StrategyConfig::default(),
    );
    let ledger = ResultLedger::open(&path, false).expect("ledger");
    let mut orchestrator = PipelineOrchestrator::new(strategy, ledger);

    let stats = orchestrator.run(&[task], 1).await.expect("run");
    assert_eq!(stats.solved, 1);
    assert_eq!(provider.calls(), 2);
}

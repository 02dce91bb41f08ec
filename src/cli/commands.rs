//! CLI command definitions for code-forge.
//!
//! `run` is one worker over one slice of a task file. `parallel` fans a task
//! file out over several `run` workers. `merge` combines their shards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::execution::{CodeVerifier, RemoteExecutor, TestHarness};
use crate::ledger::{merge_shards, merged_path, missing_ranges, write_merged, ResultLedger};
use crate::llm::{Generator, LiteLlmClient, DEFAULT_MODEL};
use crate::pipeline::{
    ParallelRunner, PipelineOrchestrator, RunConfig, Settings, DEFAULT_LANGUAGE,
    DEFAULT_RESULTS_DIR,
};
use crate::problems::{ExemplarLibrary, JsonlProblemSource, ProblemSource};
use crate::strategy::{StrategyMode, SynthesisStrategy};

/// Generate, verify and repair candidate solutions for code benchmarks.
#[derive(Parser)]
#[command(name = "code-forge")]
#[command(about = "Generate, verify and repair candidate solutions with a resumable pass@k ledger")]
#[command(version)]
#[command(
    long_about = "code-forge drives a generator model through knowledge, planning, coding and repair \
stages for every task of a benchmark, verifies candidates in an execution sandbox and records \
every pass in a resumable JSONL ledger.\n\nExample usage:\n  code-forge run --tasks HumanEval.jsonl --pass-at-k 5\n  \
code-forge parallel --tasks HumanEval.jsonl --processes 4 --logs-prefix logs/he-\n  \
code-forge merge --run-name qwen-coder-turbo-full-HumanEval-Python3-0.0-5 --parts 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Only log warnings and errors. Ignored when RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter: `--quiet` wins over `--log-level`.
    pub fn log_filter(&self) -> String {
        if self.quiet {
            "warn".to_string()
        } else {
            self.log_level.clone()
        }
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one worker over a slice of a task file.
    Run(RunArgs),

    /// Split a task file across worker processes and wait for them.
    #[command(alias = "par")]
    Parallel(ParallelArgs),

    /// Merge worker shards and print a summary.
    Merge(MergeArgs),

    /// List the runtimes the execution service supports.
    Runtimes(RuntimesArgs),
}

/// Arguments for `code-forge run`.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// JSONL task file.
    #[arg(short = 't', long)]
    pub tasks: PathBuf,

    /// Generator model id.
    #[arg(short = 'm', long, env = "LITELLM_DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Language passed to the execution service.
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    #[arg(long, default_value = "0.0")]
    pub temperature: f64,

    /// Passes allowed per task.
    #[arg(short = 'k', long, default_value = "1")]
    pub pass_at_k: usize,

    /// First task index (inclusive).
    #[arg(long)]
    pub start_index: Option<usize>,

    /// Last task index (exclusive).
    #[arg(long)]
    pub end_index: Option<usize>,

    /// Appended to the run name to form the shard file name.
    #[arg(long, default_value = "")]
    pub results_suffix: String,

    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Delete this run's shard before starting instead of resuming it.
    #[arg(long)]
    pub discard_previous_run: bool,

    /// Skip knowledge, planning and style alternatives.
    #[arg(long)]
    pub fast: bool,

    /// Remote execution service URL.
    #[arg(long, env = "EXECUTOR_URL")]
    pub executor_url: Option<String>,

    /// YAML settings file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// JSONL of known exemplars keyed by task id.
    #[arg(long)]
    pub exemplar_file: Option<PathBuf>,

    /// Model retried when the primary one is unavailable.
    #[arg(long)]
    pub fallback_model: Option<String>,

    /// Do not send temperature/top_p.
    #[arg(long)]
    pub no_sampling_params: bool,

    /// Exemplars requested with the knowledge base.
    #[arg(long)]
    pub exemplars: Option<usize>,

    /// Approximate plan length.
    #[arg(long)]
    pub plan_steps: Option<usize>,

    /// Bound for the planning and repair loops.
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Style alternatives tried after a failing first candidate.
    #[arg(long)]
    pub alternatives: Option<usize>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    /// Settings file (or defaults) with command-line overrides applied.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(url) = &self.executor_url {
            settings.executor.url = url.clone();
        }
        if self.fast {
            settings.generator.fast_mode = true;
        }
        if self.no_sampling_params {
            settings.generator.sampling_params = false;
        }
        if let Some(model) = &self.fallback_model {
            settings.generator.fallback_model = Some(model.clone());
        }
        if let Some(n) = self.exemplars {
            settings.strategy.exemplars = n;
        }
        if let Some(n) = self.plan_steps {
            settings.strategy.plan_steps = n;
        }
        if let Some(n) = self.max_retries {
            settings.strategy.max_retries = n;
        }
        if let Some(n) = self.alternatives {
            settings.strategy.alternatives = n;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn run_config(&self, dataset: &str) -> RunConfig {
        let mut config = RunConfig::new(self.model.clone(), dataset)
            .with_language(self.language.clone())
            .with_temperature(self.temperature)
            .with_pass_at_k(self.pass_at_k)
            .with_results_dir(self.results_dir.clone())
            .with_results_suffix(self.results_suffix.clone())
            .with_range(self.start_index, self.end_index);
        config.discard_previous_run = self.discard_previous_run;
        config
    }

    /// Arguments that make a worker reproduce this run. Slice bounds and
    /// the shard suffix are left to the parallel runner.
    pub fn worker_args(&self, log_level: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--log-level".to_string(),
            log_level.to_string(),
            "--tasks".to_string(),
            self.tasks.display().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--language".to_string(),
            self.language.clone(),
            "--temperature".to_string(),
            self.temperature.to_string(),
            "--pass-at-k".to_string(),
            self.pass_at_k.to_string(),
            "--results-dir".to_string(),
            self.results_dir.display().to_string(),
        ];

        let flags = [
            (self.discard_previous_run, "--discard-previous-run"),
            (self.fast, "--fast"),
            (self.no_sampling_params, "--no-sampling-params"),
        ];
        args.extend(
            flags
                .iter()
                .filter(|(set, _)| *set)
                .map(|(_, flag)| flag.to_string()),
        );

        let paths = [
            ("--config", self.config.as_ref()),
            ("--exemplar-file", self.exemplar_file.as_ref()),
        ];
        for (flag, value) in paths {
            if let Some(path) = value {
                args.push(flag.to_string());
                args.push(path.display().to_string());
            }
        }

        let options = [
            ("--executor-url", self.executor_url.clone()),
            ("--fallback-model", self.fallback_model.clone()),
            ("--exemplars", self.exemplars.map(|n| n.to_string())),
            ("--plan-steps", self.plan_steps.map(|n| n.to_string())),
            ("--max-retries", self.max_retries.map(|n| n.to_string())),
            ("--alternatives", self.alternatives.map(|n| n.to_string())),
        ];
        for (flag, value) in options {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value);
            }
        }

        args
    }
}

/// Arguments for `code-forge parallel`.
#[derive(Parser, Debug)]
pub struct ParallelArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Number of worker processes.
    #[arg(short = 'p', long, default_value = "4")]
    pub processes: usize,

    /// Worker `i` logs to `{prefix}{i}.log`. Workers inherit the terminal otherwise.
    #[arg(long)]
    pub logs_prefix: Option<PathBuf>,

    /// Merge the shards once every worker succeeded.
    #[arg(long)]
    pub merge: bool,
}

/// Arguments for `code-forge merge`.
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Run name shared by the shards (file names without `p{i}.jsonl`).
    #[arg(long)]
    pub run_name: String,

    /// Number of shards, read as `p1..=p{parts}`.
    #[arg(long)]
    pub parts: usize,

    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Task file to report task index ranges with no result.
    #[arg(long)]
    pub tasks: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `code-forge runtimes`.
#[derive(Parser, Debug)]
pub struct RuntimesArgs {
    /// Remote execution service URL.
    #[arg(long, env = "EXECUTOR_URL", default_value = crate::execution::DEFAULT_EXECUTOR_URL)]
    pub executor_url: String,
}

/// Parse CLI arguments without running the command.
///
/// Lets `main` read the log level before logging is initialized.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let log_level = cli.log_filter();
    match cli.command {
        Commands::Run(args) => run_worker_command(args).await,
        Commands::Parallel(args) => run_parallel_command(args, &log_level).await,
        Commands::Merge(args) => run_merge_command(args),
        Commands::Runtimes(args) => run_runtimes_command(args).await,
    }
}

// ============================================================================
// Run
// ============================================================================

#[derive(Debug, Serialize)]
struct RunSummary {
    run_name: String,
    ledger: String,
    start_index: usize,
    end_index: usize,
    total: usize,
    solved: usize,
    skipped: usize,
    passes: usize,
    generator_failures: usize,
    accuracy: f64,
}

fn load_source(tasks: &Path, exemplar_file: Option<&Path>) -> anyhow::Result<JsonlProblemSource> {
    let source = JsonlProblemSource::load(tasks)?;
    Ok(match exemplar_file {
        Some(path) => {
            let library = ExemplarLibrary::load(path)?;
            info!(exemplars = library.len(), path = %path.display(), "Loaded exemplar library");
            source.with_exemplars(library)
        }
        None => source,
    })
}

async fn run_worker_command(args: RunArgs) -> anyhow::Result<()> {
    let settings = args.settings()?;
    let source = Arc::new(load_source(&args.tasks, args.exemplar_file.as_deref())?);

    let run_config = args.run_config(source.name());
    run_config.validate()?;
    let (start, end) = run_config.slice_bounds(source.len())?;

    let profile = run_config.generator_profile(&settings.generator);
    let mode = StrategyMode::for_profile(&profile);
    let run_name = run_config.run_name(mode);
    let shard = run_config.shard_path(mode);

    info!(
        run_name = %run_name,
        shard = %shard.display(),
        start,
        end,
        executor = %settings.executor.url,
        "Preparing worker"
    );

    let client = LiteLlmClient::from_env()?;
    let generator = Generator::new(Arc::new(client), profile);

    let remote = RemoteExecutor::with_timeout(
        settings.executor.url.clone(),
        settings.executor.request_timeout(),
    );
    let verifier = CodeVerifier::new(Arc::new(remote))
        .with_fallback(settings.executor.local_executor())
        .with_block_network(settings.executor.block_network);
    let harness = TestHarness::new(Arc::new(verifier), run_config.language.clone())
        .with_limits(settings.executor.limits.clone())
        .with_stop_on_first_fail(settings.executor.stop_on_first_fail);

    let tasks = source.tasks()[start..end].to_vec();
    let strategy = SynthesisStrategy::new(generator, harness, source, settings.strategy);
    let ledger = ResultLedger::open(&shard, run_config.discard_previous_run)?;

    let mut orchestrator = PipelineOrchestrator::new(strategy, ledger);
    let stats = orchestrator.run(&tasks, run_config.pass_at_k).await?;

    let summary = RunSummary {
        run_name,
        ledger: shard.display().to_string(),
        start_index: start,
        end_index: end,
        total: stats.total,
        solved: stats.solved,
        skipped: stats.skipped,
        passes: stats.passes,
        generator_failures: stats.generator_failures,
        accuracy: stats.accuracy(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Run Results ===");
        println!("Run:            {}", summary.run_name);
        println!("Ledger:         {}", summary.ledger);
        println!("Tasks:          {} [{}..{})", summary.total, start, end);
        println!("Solved:         {}", summary.solved);
        println!("Skipped:        {}", summary.skipped);
        println!("Passes:         {}", summary.passes);
        println!("Gen failures:   {}", summary.generator_failures);
        println!("Accuracy:       {:.2}%", summary.accuracy * 100.0);
    }
    Ok(())
}

// ============================================================================
// Parallel
// ============================================================================

async fn run_parallel_command(args: ParallelArgs, log_level: &str) -> anyhow::Result<()> {
    let settings = args.run.settings()?;
    let source = JsonlProblemSource::load(&args.run.tasks)?;
    let run_config = args.run.run_config(source.name());
    run_config.validate()?;

    let program = std::env::current_exe()?;
    let mut runner = ParallelRunner::new(program, args.run.worker_args(log_level));
    if let Some(prefix) = &args.logs_prefix {
        runner = runner.with_logs_prefix(prefix.clone());
    }

    let report = runner
        .launch(
            source.len(),
            args.processes,
            args.run.start_index,
            args.run.end_index,
        )
        .await?;

    let failures = report.failures();
    if !failures.is_empty() {
        for failure in &failures {
            warn!(
                worker = failure.slice.index,
                start = failure.slice.start,
                end = failure.slice.end,
                code = ?failure.code,
                error = failure.error.as_deref().unwrap_or(""),
                "Worker exited unsuccessfully"
            );
        }
        let codes: Vec<String> = failures
            .iter()
            .map(|f| match (&f.error, f.code) {
                (Some(error), _) => format!("worker {}: {}", f.slice.index, error),
                (None, Some(code)) => format!("worker {}: exit {}", f.slice.index, code),
                (None, None) => format!("worker {}: killed", f.slice.index),
            })
            .collect();
        anyhow::bail!(
            "{} of {} workers failed ({})",
            failures.len(),
            report.workers.len(),
            codes.join(", ")
        );
    }

    info!(workers = report.workers.len(), "All workers finished");

    if args.merge {
        let profile = run_config.generator_profile(&settings.generator);
        let run_name = run_config.run_name(StrategyMode::for_profile(&profile));
        run_merge_command(MergeArgs {
            run_name,
            parts: report.workers.len(),
            results_dir: args.run.results_dir.clone(),
            tasks: Some(args.run.tasks.clone()),
            json: args.run.json,
        })?;
    }
    Ok(())
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Serialize)]
struct MergeSummary {
    merged: String,
    total: usize,
    solved: usize,
    pass_rate: f64,
    duplicates: usize,
    missing_shards: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_ranges: Option<Vec<(usize, usize)>>,
}

fn run_merge_command(args: MergeArgs) -> anyhow::Result<()> {
    let report = merge_shards(&args.results_dir, &args.run_name, args.parts)?;
    let out = merged_path(&args.results_dir, &args.run_name);
    write_merged(&out, &report.entries)?;
    info!(path = %out.display(), rows = report.entries.len(), "Wrote merged results");

    let missing = match &args.tasks {
        Some(path) => {
            let source = JsonlProblemSource::load(path)?;
            let ids = source.tasks().iter().map(|t| t.task_id.as_str());
            Some(missing_ranges(ids, &report.entries))
        }
        None => None,
    };

    let summary = MergeSummary {
        merged: out.display().to_string(),
        total: report.summary.total,
        solved: report.summary.solved,
        pass_rate: report.summary.pass_rate,
        duplicates: report.duplicates,
        missing_shards: report.missing_shards,
        missing_ranges: missing,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n=== Merge Results ===");
    println!("Merged file:    {}", summary.merged);
    println!("Total:          {}", summary.total);
    println!("Solved:         {}", summary.solved);
    println!("Pass rate:      {:.2}%", summary.pass_rate);
    if summary.duplicates > 0 {
        println!("Duplicates:     {}", summary.duplicates);
    }
    if !summary.missing_shards.is_empty() {
        println!("Missing shards: {:?}", summary.missing_shards);
    }
    if let Some(ranges) = &summary.missing_ranges {
        if ranges.is_empty() {
            println!("Missing tasks:  none");
        } else {
            println!("Missing tasks:");
            for (start, end) in ranges {
                println!("  --start-index {start} --end-index {end}");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Runtimes
// ============================================================================

async fn run_runtimes_command(args: RuntimesArgs) -> anyhow::Result<()> {
    let executor = RemoteExecutor::new(args.executor_url);
    let runtimes = executor.runtimes().await?;
    println!("{}", serde_json::to_string_pretty(&runtimes)?);
    Ok(())
}

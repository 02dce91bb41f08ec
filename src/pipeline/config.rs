//! Run configuration.
//!
//! [`Settings`] is the optional YAML file with the knobs that rarely change
//! between runs. [`RunConfig`] identifies one worker's run: which model,
//! dataset slice and result shard.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::execution::{Limits, LocalExecutor, DEFAULT_EXECUTOR_URL};
use crate::ledger::shard_path;
use crate::llm::GeneratorProfile;
use crate::strategy::{StrategyConfig, StrategyMode};

/// Default directory for ledger shards.
pub const DEFAULT_RESULTS_DIR: &str = "./results";

/// Default language passed to the verifier.
pub const DEFAULT_LANGUAGE: &str = "Python3";

/// Verification backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Remote execution service.
    pub url: String,
    /// HTTP timeout for one remote verification call.
    pub request_timeout_secs: u64,
    /// Per-test wall-clock bound of the local fallback.
    pub timeout_secs: u64,
    /// Interpreter used by the local fallback.
    pub interpreter: String,
    pub stop_on_first_fail: bool,
    pub block_network: bool,
    pub limits: Limits,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_EXECUTOR_URL.to_string(),
            request_timeout_secs: 120,
            timeout_secs: 5,
            interpreter: "python3".to_string(),
            stop_on_first_fail: true,
            block_network: true,
            limits: Limits::default(),
        }
    }
}

impl ExecutorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The local fallback these settings describe.
    pub fn local_executor(&self) -> LocalExecutor {
        LocalExecutor::new()
            .with_interpreter(self.interpreter.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Generator capabilities that are not tied to a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Skip knowledge, planning and style alternatives.
    pub fast_mode: bool,
    pub sampling_params: bool,
    pub fallback_model: Option<String>,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            fast_mode: false,
            sampling_params: true,
            fallback_model: None,
            top_p: 1.0,
            max_tokens: None,
        }
    }
}

/// Contents of the optional YAML settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub strategy: StrategyConfig,
    pub executor: ExecutorSettings,
    pub generator: GeneratorSettings,
}

impl Settings {
    /// Loads settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;

        if self.executor.url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "executor.url must not be empty".to_string(),
            ));
        }
        if self.executor.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "executor.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.generator.top_p) {
            return Err(ConfigError::ValidationFailed(
                "generator.top_p must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity and bounds of one worker's run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub model: String,
    /// Dataset name used in the run name, usually the task file stem.
    pub dataset: String,
    pub language: String,
    pub temperature: f64,
    pub pass_at_k: usize,
    pub results_dir: PathBuf,
    /// Appended to the run name to form the shard file name.
    pub results_suffix: String,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub discard_previous_run: bool,
}

impl RunConfig {
    pub fn new(model: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dataset: dataset.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            temperature: 0.0,
            pass_at_k: 1,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            results_suffix: String::new(),
            start_index: None,
            end_index: None,
            discard_previous_run: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_pass_at_k(mut self, pass_at_k: usize) -> Self {
        self.pass_at_k = pass_at_k;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_results_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.results_suffix = suffix.into();
        self
    }

    pub fn with_range(mut self, start: Option<usize>, end: Option<usize>) -> Self {
        self.start_index = start;
        self.end_index = end;
        self
    }

    /// `{model}-{mode}-{dataset}-{language}-{temperature}-{k}`.
    ///
    /// Path separators in the model id are replaced so the name stays a
    /// single file name.
    pub fn run_name(&self, mode: StrategyMode) -> String {
        let model = self.model.replace(['/', '\\', ':'], "_");
        format!(
            "{}-{}-{}-{}-{:.1}-{}",
            model, mode, self.dataset, self.language, self.temperature, self.pass_at_k
        )
    }

    /// Ledger shard this worker owns.
    pub fn shard_path(&self, mode: StrategyMode) -> PathBuf {
        self.results_dir
            .join(format!("{}{}.jsonl", self.run_name(mode), self.results_suffix))
    }

    /// Shard written by parallel worker `index`.
    pub fn worker_shard_path(&self, mode: StrategyMode, index: usize) -> PathBuf {
        shard_path(&self.results_dir, &self.run_name(mode), index)
    }

    /// Generator profile for this run.
    pub fn generator_profile(&self, settings: &GeneratorSettings) -> GeneratorProfile {
        GeneratorProfile {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            sampling_params: settings.sampling_params,
            structured_output: !settings.fast_mode,
            fallback_model: settings.fallback_model.clone(),
        }
    }

    /// Selects this run's slice of `total` tasks.
    pub fn slice_bounds(&self, total: usize) -> Result<(usize, usize), ConfigError> {
        let end = self.end_index.unwrap_or(total).min(total);
        let start = self.start_index.unwrap_or(0);
        if start > end {
            return Err(ConfigError::ValidationFailed(format!(
                "start index {start} is past end index {end}"
            )));
        }
        Ok((start, end))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model must not be empty".to_string(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "language must not be empty".to_string(),
            ));
        }
        if self.pass_at_k == 0 {
            return Err(ConfigError::ValidationFailed(
                "pass_at_k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

//! Problem sources.
//!
//! The pipeline treats dataset loading and prompt templating as an opaque
//! capability. [`JsonlProblemSource`] is the stock implementation: one JSON
//! task per line.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::exemplars::ExemplarLibrary;
use super::task::{SampleIo, Task};
use crate::error::ProblemError;

/// Read-only access to a benchmark dataset.
pub trait ProblemSource: Send + Sync {
    /// All tasks, in dataset order.
    fn tasks(&self) -> &[Task];

    /// Problem statement shown to the generator.
    fn get_prompt(&self, task: &Task) -> String;

    /// Known worked examples for the task, if the source has any.
    fn exemplar_hint(&self, _task: &Task) -> Option<String> {
        None
    }

    fn len(&self) -> usize {
        self.tasks().len()
    }

    fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Dataset label used in run names.
    fn name(&self) -> &str;
}

/// Line shape accepted by the loader. Datasets disagree on key names.
#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    task_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    sample_io: Option<Vec<SampleIo>>,
    #[serde(default)]
    test: Option<String>,
}

fn id_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RawTask {
    fn into_task(self, line: usize) -> Result<Task, ProblemError> {
        let task_id = [self.task_id, self.id, self.name]
            .into_iter()
            .flatten()
            .find_map(id_text)
            .ok_or_else(|| ProblemError::InvalidTask {
                line,
                message: "missing task_id, id or name".to_string(),
            })?;

        let prompt = self
            .prompt
            .or(self.description)
            .or(self.text)
            .unwrap_or_default();

        Ok(Task {
            task_id,
            prompt,
            entry_point: self.entry_point,
            sample_io: self.sample_io.unwrap_or_default(),
            test: self.test,
        })
    }
}

/// Tasks loaded from a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlProblemSource {
    name: String,
    tasks: Vec<Task>,
    exemplars: Option<ExemplarLibrary>,
}

impl JsonlProblemSource {
    /// Builds a source from tasks already in memory.
    pub fn from_tasks(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
            exemplars: None,
        }
    }

    /// Loads tasks from a JSONL file. The dataset name is the file stem.
    ///
    /// Blank lines are skipped. Any malformed line or repeated identifier
    /// fails the load, since slicing by index would otherwise be ambiguous.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());

        let source = Self::parse(name, &content)?;
        info!(
            path = %path.display(),
            tasks = source.tasks.len(),
            "Loaded problem set"
        );
        Ok(source)
    }

    /// Parses JSONL content.
    pub fn parse(name: impl Into<String>, content: &str) -> Result<Self, ProblemError> {
        let mut tasks = Vec::new();
        let mut seen = HashSet::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawTask =
                serde_json::from_str(line).map_err(|e| ProblemError::InvalidTask {
                    line: line_no,
                    message: e.to_string(),
                })?;
            let task = raw.into_task(line_no)?;
            if !seen.insert(task.task_id.clone()) {
                return Err(ProblemError::DuplicateTaskId(task.task_id));
            }
            tasks.push(task);
        }

        Ok(Self::from_tasks(name, tasks))
    }

    /// Attaches a library of known exemplars.
    pub fn with_exemplars(mut self, library: ExemplarLibrary) -> Self {
        self.exemplars = Some(library);
        self
    }
}

impl ProblemSource for JsonlProblemSource {
    fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn get_prompt(&self, task: &Task) -> String {
        let mut prompt = task.prompt.trim_end().to_string();
        if !task.sample_io.is_empty() {
            prompt.push_str("\n\nSample tests:\n");
            prompt.push_str(&task.sample_io_text());
        }
        prompt
    }

    fn exemplar_hint(&self, task: &Task) -> Option<String> {
        self.exemplars.as_ref()?.lookup(&task.task_id)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

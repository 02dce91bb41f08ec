//! Benchmark task model.

use serde::{Deserialize, Deserializer, Serialize};

/// One sample check attached to a task.
///
/// Datasets ship samples in two shapes: executable assertion lines
/// (`assert f(1) == 2`) or stdin/stdout pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleIo {
    Assertion(String),
    Io {
        #[serde(default)]
        input: String,
        #[serde(default, deserialize_with = "string_or_list")]
        output: Vec<String>,
    },
}

/// Accepts `"x"` as well as `["x", ...]` for expected outputs.
pub(crate) fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// How a candidate solution for a task is expected to be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind<'a> {
    /// A named function is called by the tests.
    Function(&'a str),
    /// A complete program reading stdin and writing stdout.
    StdIo,
    /// Nothing in the task pins the shape down.
    Unspecified,
}

/// An immutable benchmark problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique within a dataset.
    pub task_id: String,
    /// Natural-language problem statement.
    pub prompt: String,
    /// Required callable symbol for function-style tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Cheap sample checks run before the full test program.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_io: Vec<SampleIo>,
    /// Full test program, usually defining `check(candidate)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            prompt: prompt.into(),
            entry_point: None,
            sample_io: Vec::new(),
            test: None,
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_sample(mut self, sample: SampleIo) -> Self {
        self.sample_io.push(sample);
        self
    }

    pub fn with_test(mut self, test: impl Into<String>) -> Self {
        self.test = Some(test.into());
        self
    }

    /// The entry point, ignoring blank values some datasets carry.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point
            .as_deref()
            .map(str::trim)
            .filter(|ep| !ep.is_empty())
    }

    pub fn kind(&self) -> TaskKind<'_> {
        if let Some(entry_point) = self.entry_point() {
            return TaskKind::Function(entry_point);
        }
        let has_io = self
            .sample_io
            .iter()
            .any(|sample| matches!(sample, SampleIo::Io { .. }));
        if has_io {
            TaskKind::StdIo
        } else {
            TaskKind::Unspecified
        }
    }

    /// Instruction appended to code generation prompts so the candidate has
    /// the shape the tests expect.
    pub fn constraint(&self) -> String {
        match self.kind() {
            TaskKind::Function(entry_point) => format!(
                "You must implement a function named '{entry_point}'. Do not write any \
                 input/output handling or top-level tests; return only the function definition."
            ),
            TaskKind::StdIo => "Strictly follow the input/output format: read from standard \
                                input and print to standard output. Produce a complete program \
                                that runs as-is."
                .to_string(),
            TaskKind::Unspecified => "Implement the required function. Do not write input/output \
                                      handling or top-level tests; provide only the definition."
                .to_string(),
        }
    }

    /// Human-readable rendering of the sample checks for prompts.
    pub fn sample_io_text(&self) -> String {
        self.sample_io
            .iter()
            .map(|sample| match sample {
                SampleIo::Assertion(line) => line.clone(),
                SampleIo::Io { input, output } => format!(
                    "Input:\n{}\nExpected output:\n{}",
                    input,
                    output.first().map(String::as_str).unwrap_or_default()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

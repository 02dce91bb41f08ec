//! Library of known worked examples, keyed by task identifier.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ProblemError;

#[derive(Debug, Deserialize)]
struct RawExemplar {
    #[serde(default)]
    task_id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    knowledge: Option<String>,
    #[serde(default)]
    solution: Option<String>,
}

/// Exemplars reused when generating the knowledge base for a task.
#[derive(Debug, Clone, Default)]
pub struct ExemplarLibrary {
    entries: HashMap<String, String>,
}

impl ExemplarLibrary {
    /// Loads `{task_id|name, knowledge, solution}` lines.
    ///
    /// Unparsable lines are skipped with a warning; the first entry for an
    /// identifier wins.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let library = Self::parse(&content);
        info!(
            path = %path.display(),
            exemplars = library.len(),
            "Loaded exemplar library"
        );
        Ok(library)
    }

    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawExemplar = match serde_json::from_str(line) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "Skipping malformed exemplar line");
                    continue;
                }
            };

            let keys: Vec<String> = [raw.task_id, raw.name]
                .into_iter()
                .flatten()
                .filter_map(|value| match value {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();

            let parts: Vec<String> = [raw.knowledge, raw.solution]
                .into_iter()
                .flatten()
                .filter(|part| !part.trim().is_empty())
                .collect();
            if parts.is_empty() {
                continue;
            }
            let text = parts.join("\n");

            for key in keys {
                entries.entry(key).or_insert_with(|| text.clone());
            }
        }

        Self { entries }
    }

    pub fn lookup(&self, task_id: &str) -> Option<String> {
        self.entries.get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Attempt record and its on-disk projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything produced for one task across its passes.
///
/// `source_codes`, `responses`, `prompt_tokens` and `completion_tokens`
/// always have `no_of_try` elements; [`Attempt::record_pass`] is the only
/// way they grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attempt {
    pub source_codes: Vec<String>,
    pub responses: Vec<String>,
    pub prompt_tokens: Vec<u64>,
    pub completion_tokens: Vec<u64>,
    pub no_of_try: usize,
    pub is_solved: bool,
    pub language: String,
    pub api_calls: u64,
}

impl Attempt {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    /// Appends one pass's artifacts.
    pub fn record_pass(
        &mut self,
        code: impl Into<String>,
        response: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) {
        self.source_codes.push(code.into());
        self.responses.push(response.into());
        self.prompt_tokens.push(prompt_tokens);
        self.completion_tokens.push(completion_tokens);
        self.no_of_try += 1;
    }

    /// Solved attempts and attempts that used their whole budget are frozen.
    pub fn is_finished(&self, pass_at_k: usize) -> bool {
        self.is_solved || self.no_of_try >= pass_at_k
    }

    /// Whether the parallel lists agree with the try counter.
    pub fn is_consistent(&self) -> bool {
        let n = self.no_of_try;
        self.source_codes.len() == n
            && self.responses.len() == n
            && self.prompt_tokens.len() == n
            && self.completion_tokens.len() == n
    }
}

/// One JSONL line of a ledger shard.
///
/// Keys this crate does not know about are kept and written back, so
/// records produced by other tools survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_id: String,
    #[serde(flatten)]
    pub attempt: Attempt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerEntry {
    pub fn new(task_id: impl Into<String>, attempt: Attempt) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn is_solved(&self) -> bool {
        self.attempt.is_solved
    }
}

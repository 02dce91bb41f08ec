//! Synthesis strategy knobs and mode selection.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::GeneratorProfile;

/// How much of the protocol a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Knowledge, planning, code, alternatives, repair.
    Full,
    /// Straight to code generation, then repair. For generators that do not
    /// follow multi-field reply formats reliably.
    Fast,
}

impl StrategyMode {
    /// Resolves the mode from the generator's declared capabilities.
    pub fn for_profile(profile: &GeneratorProfile) -> Self {
        if profile.structured_output {
            Self::Full
        } else {
            Self::Fast
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fast => "fast",
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds for the synthesis state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Exemplars requested with the knowledge base.
    pub exemplars: usize,
    /// Approximate plan length.
    pub plan_steps: usize,
    /// Rounds for both the planning loop and the repair loop.
    pub max_retries: usize,
    /// Style alternatives tried after a failed first candidate.
    pub alternatives: usize,
    pub style_variations: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            exemplars: 3,
            plan_steps: 5,
            max_retries: 4,
            alternatives: 2,
            style_variations: vec![
                "concise".to_string(),
                "robust".to_string(),
                "edge-case-focused".to_string(),
            ],
        }
    }
}

impl StrategyConfig {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_alternatives(mut self, alternatives: usize) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Styles actually used: the first `alternatives` variations.
    pub fn styles(&self) -> impl Iterator<Item = &str> {
        self.style_variations
            .iter()
            .take(self.alternatives)
            .map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_retries must be greater than 0".to_string(),
            ));
        }
        if self.plan_steps == 0 {
            return Err(ConfigError::ValidationFailed(
                "plan_steps must be greater than 0".to_string(),
            ));
        }
        if self.alternatives > self.style_variations.len() {
            return Err(ConfigError::ValidationFailed(format!(
                "alternatives ({}) exceeds the number of style variations ({})",
                self.alternatives,
                self.style_variations.len()
            )));
        }
        Ok(())
    }
}

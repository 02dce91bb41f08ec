//! Candidate verification with a primary backend and a local fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use super::executor::{CodeExecutor, ExecutionRequest};
use super::local::LocalExecutor;
use super::outcome::{Limits, TestCase, TestOutcome, Verification};
use crate::error::{EmptyInput, VerifierError};

/// Runs candidates against tests.
///
/// The primary executor (normally the remote service) is tried first. When
/// it is unreachable or answers with something other than results, the
/// local runner takes over for the languages it supports. Neither case is
/// an error for the caller: an unrunnable candidate comes back as a single
/// `SANDBOX_ERROR` outcome with a negative verdict.
#[derive(Clone)]
pub struct CodeVerifier {
    primary: Arc<dyn CodeExecutor>,
    fallback: Option<LocalExecutor>,
    block_network: bool,
}

impl CodeVerifier {
    pub fn new(primary: Arc<dyn CodeExecutor>) -> Self {
        Self {
            primary,
            fallback: None,
            block_network: true,
        }
    }

    pub fn with_fallback(mut self, fallback: LocalExecutor) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_block_network(mut self, block: bool) -> Self {
        self.block_network = block;
        self
    }

    /// Executes `source_code` against `test_cases`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifierError::EmptyInput`] when the language, the source
    /// or the test list is empty. Execution problems never surface here.
    pub async fn verify(
        &self,
        language: &str,
        source_code: &str,
        test_cases: &[TestCase],
        limits: &Limits,
        stop_on_first_fail: bool,
    ) -> Result<Verification, VerifierError> {
        if language.trim().is_empty() {
            return Err(EmptyInput::Language.into());
        }
        if source_code.trim().is_empty() {
            return Err(EmptyInput::SourceCode.into());
        }
        if test_cases.is_empty() {
            return Err(EmptyInput::Unittest.into());
        }

        let request = ExecutionRequest::new(language, source_code, test_cases.to_vec())
            .with_limits(limits.clone())
            .with_block_network(self.block_network)
            .with_stop_on_first_fail(stop_on_first_fail);

        let outcomes = self.execute(&request).await;
        let verification = Verification::from_outcomes(outcomes, test_cases.len());
        debug!(
            language = %language,
            tests = test_cases.len(),
            outcomes = verification.outcomes.len(),
            passed = verification.passed,
            "Verification finished"
        );
        Ok(verification)
    }

    async fn execute(&self, request: &ExecutionRequest) -> Vec<TestOutcome> {
        let primary_error = match self.primary.execute(request).await {
            Ok(outcomes) => return outcomes,
            Err(e) => e,
        };

        let fallback = match &self.fallback {
            Some(fallback) if LocalExecutor::supports(&request.language) => fallback,
            _ => {
                warn!(
                    executor = self.primary.name(),
                    language = %request.language,
                    error = %primary_error,
                    "Executor failed and no fallback covers this language"
                );
                return vec![TestOutcome::sandbox_error(primary_error.to_string())];
            }
        };

        warn!(
            executor = self.primary.name(),
            error = %primary_error,
            "Executor failed, falling back to local runner"
        );
        match fallback.execute(request).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(error = %e, "Local fallback failed");
                vec![TestOutcome::sandbox_error(format!(
                    "{primary_error}; local fallback: {e}"
                ))]
            }
        }
    }
}

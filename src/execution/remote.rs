//! Client for the remote execution service.
//!
//! The service exposes `POST /api/execute_code`, answering with
//! `{"data": [...per-test results...]}` or an error object without `data`,
//! and `GET /api/all_runtimes` listing the languages it can run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::executor::{CodeExecutor, ExecutionRequest};
use super::outcome::{ExecutionOutcome, TestOutcome};
use crate::error::ExecutorError;
use crate::problems::task::string_or_list;

/// Default service address.
pub const DEFAULT_EXECUTOR_URL: &str = "http://localhost:5000";

#[derive(Debug, Deserialize)]
struct RemoteResult {
    #[serde(default)]
    input: String,
    #[serde(default, deserialize_with = "string_or_list")]
    output: Vec<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    exec_outcome: Option<ExecutionOutcome>,
    #[serde(default)]
    error: Option<String>,
}

impl From<RemoteResult> for TestOutcome {
    fn from(remote: RemoteResult) -> Self {
        TestOutcome {
            input: remote.input,
            output: remote.output,
            result: remote.result.unwrap_or_default(),
            // A result without a verdict means the sandbox gave up on it.
            exec_outcome: remote.exec_outcome.unwrap_or(ExecutionOutcome::SandboxError),
            error: remote.error,
        }
    }
}

/// HTTP client for the execution service.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    base_url: String,
    client: Client,
}

impl RemoteExecutor {
    /// Creates a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(120))
    }

    /// Creates a client with an explicit per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists the runtimes the service supports.
    pub async fn runtimes(&self) -> Result<Value, ExecutorError> {
        let url = format!("{}/api/all_runtimes", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExecutorError::Protocol(format!(
                "runtimes query returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutorError::Protocol(e.to_string()))
    }
}

fn parse_execution_response(body: Value) -> Result<Vec<TestOutcome>, ExecutorError> {
    let data = match body {
        Value::Object(mut map) => map.remove("data").ok_or_else(|| {
            ExecutorError::Protocol(format!(
                "response has no data field: {}",
                Value::Object(map)
            ))
        })?,
        other => {
            return Err(ExecutorError::Protocol(format!(
                "unexpected response body: {other}"
            )))
        }
    };

    let results: Vec<RemoteResult> =
        serde_json::from_value(data).map_err(|e| ExecutorError::Protocol(e.to_string()))?;
    Ok(results.into_iter().map(TestOutcome::from).collect())
}

#[async_trait]
impl CodeExecutor for RemoteExecutor {
    fn name(&self) -> &str {
        "remote"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<TestOutcome>, ExecutorError> {
        let url = format!("{}/api/execute_code", self.base_url);
        debug!(
            url = %url,
            language = %request.language,
            tests = request.unittests.len(),
            "Submitting candidate to execution service"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ExecutorError::Protocol(format!("HTTP {status}: {e}")))?;

        parse_execution_response(body)
    }
}

//! Candidate execution and verification.
//!
//! # Architecture
//!
//! ```text
//! TestHarness ──► CodeVerifier ──► RemoteExecutor  (POST /api/execute_code)
//!                      │
//!                      └─(unreachable / bad reply)─► LocalExecutor (python3, per-test timeout)
//! ```
//!
//! The harness knows about tasks (entry points, sample I/O, full test
//! programs); the verifier only sees a language, source text and test
//! cases.

pub mod executor;
pub mod harness;
pub mod local;
pub mod outcome;
pub mod remote;
pub mod verifier;

pub use executor::{CodeExecutor, ExecutionRequest};
pub use harness::{CheckResult, TestHarness, TestScope};
pub use local::LocalExecutor;
pub use outcome::{ExecutionOutcome, Limits, TestCase, TestOutcome, Verification};
pub use remote::{RemoteExecutor, DEFAULT_EXECUTOR_URL};
pub use verifier::CodeVerifier;

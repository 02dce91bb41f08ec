//! The generation / verification / repair state machine.
//!
//! One call to [`SynthesisStrategy::run_pass`] is one pass:
//!
//! ```text
//! Full:  Knowledge ─► Planning loop ─► CodeGeneration ─► Evaluate ─► StyleAlternatives ─► ImprovementLoop
//! Fast:                                CodeGeneration ─► Evaluate ──────────────────────► ImprovementLoop
//! ```
//!
//! Malformed structured replies degrade to empty fields. A failing
//! candidate drives repair. Only a generator error ends the pass early.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::{StrategyConfig, StrategyMode};
use super::extract::extract_code;
use super::prompts::{self, CodeContext};
use super::protocol::{parse_reply, parse_verdict, PlanVerdict, ProtocolReply};
use crate::error::{LlmError, StrategyError};
use crate::execution::{CheckResult, TestHarness, TestScope};
use crate::llm::{Generator, Message};
use crate::problems::{ProblemSource, Task};

/// Token and call accounting for one pass.
///
/// Kept outside the result so calls made before a generator failure are
/// still counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTally {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub api_calls: u32,
}

/// What a pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    /// Final candidate program.
    pub code: String,
    /// Raw generator reply the final candidate was extracted from.
    pub response: String,
    /// Whether the final candidate passed the checks run during the pass.
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
struct Plan {
    plan: String,
    test_cases: String,
}

struct Candidate {
    code: String,
    response: String,
    check: CheckResult,
}

/// Runs passes for one generator, harness and problem source.
pub struct SynthesisStrategy {
    generator: Generator,
    harness: TestHarness,
    source: Arc<dyn ProblemSource>,
    config: StrategyConfig,
    mode: StrategyMode,
}

impl SynthesisStrategy {
    /// Creates a strategy. The mode is fixed here from the generator profile.
    pub fn new(
        generator: Generator,
        harness: TestHarness,
        source: Arc<dyn ProblemSource>,
        config: StrategyConfig,
    ) -> Self {
        let mode = StrategyMode::for_profile(generator.profile());
        Self {
            generator,
            harness,
            source,
            config,
            mode,
        }
    }

    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    pub fn harness(&self) -> &TestHarness {
        &self.harness
    }

    pub fn language(&self) -> &str {
        self.harness.language()
    }

    /// Runs one pass for `task`, accumulating usage into `tally`.
    pub async fn run_pass(
        &self,
        task: &Task,
        tally: &mut PassTally,
    ) -> Result<PassOutput, StrategyError> {
        info!(task_id = %task.task_id, mode = %self.mode, "Starting pass");

        let problem = self.source.get_prompt(task);
        let constraint = task.constraint();

        let plan = match self.mode {
            StrategyMode::Full => {
                let (knowledge_base, exemplars) = self.knowledge(task, &problem, tally).await?;
                self.planning(task, &problem, &knowledge_base, &exemplars, tally)
                    .await?
            }
            StrategyMode::Fast => Plan::default(),
        };

        let ctx = CodeContext {
            problem: &problem,
            plan: &plan.plan,
            test_cases: &plan.test_cases,
            constraint: &constraint,
            language: self.language(),
        };

        let first_prompt = match self.mode {
            StrategyMode::Full => prompts::code_generation(&ctx, None),
            StrategyMode::Fast => prompts::direct_code_generation(&ctx),
        };
        let mut current = self.candidate(task, "code_generation", first_prompt, tally).await?;

        if !current.check.passed && self.mode == StrategyMode::Full {
            current = self.style_alternatives(task, &ctx, current, tally).await?;
        }

        for round in 1..=self.config.max_retries {
            if current.check.passed {
                break;
            }
            info!(
                task_id = %task.task_id,
                round,
                max_retries = self.config.max_retries,
                "Candidate failed, requesting repair"
            );
            debug!(task_id = %task.task_id, feedback = %current.check.feedback, "Repair feedback");
            let repair = prompts::improvement(&ctx, &current.code, &current.check.feedback);
            current = self.candidate(task, "improvement", repair, tally).await?;
        }

        info!(
            task_id = %task.task_id,
            passed = current.check.passed,
            prompt_tokens = tally.prompt_tokens,
            completion_tokens = tally.completion_tokens,
            api_calls = tally.api_calls,
            "Pass finished"
        );

        Ok(PassOutput {
            code: current.code,
            response: current.response,
            passed: current.check.passed,
        })
    }

    async fn ask(
        &self,
        task: &Task,
        stage: &str,
        messages: Vec<Message>,
        tally: &mut PassTally,
    ) -> Result<String, LlmError> {
        debug!(task_id = %task.task_id, stage, messages = ?messages, "Generator request");
        let completion = self.generator.prompt(messages).await?;
        tally.api_calls += 1;
        tally.prompt_tokens += u64::from(completion.prompt_tokens);
        tally.completion_tokens += u64::from(completion.completion_tokens);
        debug!(task_id = %task.task_id, stage, response = %completion.text, "Generator reply");
        Ok(completion.text)
    }

    async fn knowledge(
        &self,
        task: &Task,
        problem: &str,
        tally: &mut PassTally,
    ) -> Result<(String, String), StrategyError> {
        let known = self.source.exemplar_hint(task);
        let messages = prompts::knowledge(problem, self.config.exemplars, known.as_deref());
        let response = self.ask(task, "knowledge", messages, tally).await?;

        let reply = parse_reply(&response, &["knowledge_base", "exemplars"]);
        if let ProtocolReply::Degraded { reason } = &reply {
            warn!(task_id = %task.task_id, reason = %reason, "Knowledge reply unusable, continuing without it");
        }

        let knowledge_base = reply.field("knowledge_base").to_string();
        let mut exemplars = reply.field("exemplars").to_string();
        if let Some(known) = known {
            exemplars = format!("{}\n{}", exemplars.trim(), known).trim().to_string();
        }
        Ok((knowledge_base, exemplars))
    }

    async fn planning(
        &self,
        task: &Task,
        problem: &str,
        knowledge_base: &str,
        exemplars: &str,
        tally: &mut PassTally,
    ) -> Result<Plan, StrategyError> {
        let mut plan = Plan::default();
        let mut reviewer_feedback: Option<String> = None;

        for round in 1..=self.config.max_retries {
            let messages = prompts::planning(
                problem,
                knowledge_base,
                exemplars,
                self.config.plan_steps,
                reviewer_feedback.as_deref(),
            );
            let response = self.ask(task, "planning", messages, tally).await?;
            let reply = parse_reply(&response, &["plan", "test_cases"]);
            if reply.is_degraded() {
                warn!(task_id = %task.task_id, round, "Plan reply unusable, using empty plan");
            }
            plan = Plan {
                plan: reply.field("plan").to_string(),
                test_cases: reply.field("test_cases").to_string(),
            };

            let review = prompts::plan_review(problem, &plan.plan, &plan.test_cases);
            let verdict = parse_verdict(&self.ask(task, "plan_review", review, tally).await?);
            match verdict {
                PlanVerdict::Sufficient => {
                    info!(task_id = %task.task_id, round, "Plan accepted");
                    break;
                }
                PlanVerdict::Insufficient { reasons } => {
                    info!(task_id = %task.task_id, round, "Plan rejected");
                    reviewer_feedback = Some(reasons);
                }
            }
        }

        Ok(plan)
    }

    async fn candidate(
        &self,
        task: &Task,
        stage: &str,
        messages: Vec<Message>,
        tally: &mut PassTally,
    ) -> Result<Candidate, StrategyError> {
        let response = self.ask(task, stage, messages, tally).await?;
        let code = extract_code(&response);
        let check = self.harness.check(task, &code, TestScope::Samples).await?;
        debug!(task_id = %task.task_id, stage, passed = check.passed, "Candidate checked");
        Ok(Candidate {
            code,
            response,
            check,
        })
    }

    /// Tries style variations in order. The first passing one wins;
    /// otherwise the first alternative replaces the original candidate.
    async fn style_alternatives(
        &self,
        task: &Task,
        ctx: &CodeContext<'_>,
        original: Candidate,
        tally: &mut PassTally,
    ) -> Result<Candidate, StrategyError> {
        let mut first: Option<Candidate> = None;

        for style in self.config.styles() {
            let messages = prompts::code_generation(ctx, Some(style));
            let alternative = self.candidate(task, "style_alternative", messages, tally).await?;
            if alternative.check.passed {
                info!(task_id = %task.task_id, style, "Style alternative passed");
                return Ok(alternative);
            }
            if first.is_none() {
                first = Some(alternative);
            }
        }

        Ok(first.unwrap_or(original))
    }
}

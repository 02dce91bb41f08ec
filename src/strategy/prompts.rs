//! Prompt builders for each synthesis stage.

use crate::llm::Message;

const CODER_SYSTEM: &str = "You are a coding agent. \
Generate a complete, correct solution for the task. \
Return only code fenced in triple backticks with an explicit language tag (e.g., ```python or ```Python3). \
Do not include any commentary outside the code fence. \
Do not include sample assertions, testing code, or print statements unless required by I/O constraints.";

/// Everything the code-writing prompts share.
#[derive(Debug, Clone, Copy)]
pub struct CodeContext<'a> {
    pub problem: &'a str,
    pub plan: &'a str,
    pub test_cases: &'a str,
    pub constraint: &'a str,
    pub language: &'a str,
}

impl CodeContext<'_> {
    fn constraint_block(&self) -> String {
        if self.constraint.trim().is_empty() {
            String::new()
        } else {
            format!("Constraints:\n{}\n\n", self.constraint)
        }
    }
}

/// Knowledge base and exemplars request.
pub fn knowledge(problem: &str, exemplars: usize, known_exemplars: Option<&str>) -> Vec<Message> {
    let system = "You are an expert code synthesis assistant. \
Given a programming problem description, produce a concise knowledge base of relevant concepts, \
algorithms, data structures, and edge cases. \
Also produce up to k exemplars (worked examples or similar problems) that will help solve the task. \
Respond strictly as XML with the following structure: \n\
<response>\n  <knowledge_base>...</knowledge_base>\n  <exemplars><![CDATA[...]]></exemplars>\n</response>\n\
Do not include any text outside the XML.";

    let reuse = known_exemplars
        .filter(|text| !text.trim().is_empty())
        .map(|text| format!("You may reuse the following exemplars if relevant:\n{text}\n\n"))
        .unwrap_or_default();

    vec![
        Message::system(system),
        Message::user(format!(
            "Problem description:\n{problem}\n\n\
             Please provide a knowledge base and up to {exemplars} exemplars. \
             {reuse}Use the exact XML structure specified above."
        )),
    ]
}

/// Step plan and test case draft.
pub fn planning(
    problem: &str,
    knowledge_base: &str,
    exemplars: &str,
    plan_steps: usize,
    reviewer_feedback: Option<&str>,
) -> Vec<Message> {
    let system = "You are a planning agent for programming tasks. \
Given a problem description, a knowledge base, and exemplars, draft a step-by-step plan and derive \
representative test cases. \
Respond strictly as XML with the following structure: \n\
<response>\n  <plan>...</plan>\n  <test_cases><![CDATA[...]]></test_cases>\n</response>\n\
Do not include any text outside the XML.";

    let feedback = reviewer_feedback
        .filter(|text| !text.trim().is_empty())
        .map(|text| format!("A reviewer rejected the previous plan:\n{text}\n\n"))
        .unwrap_or_default();

    vec![
        Message::system(system),
        Message::user(format!(
            "Problem description:\n{problem}\n\n\
             Knowledge base:\n{knowledge_base}\n\n\
             Exemplars:\n{exemplars}\n\n\
             {feedback}\
             Create a plan with about {plan_steps} steps and derive representative test cases. \
             Return only the XML specified above."
        )),
    ]
}

/// Independent review of a plan draft.
pub fn plan_review(problem: &str, plan: &str, test_cases: &str) -> Vec<Message> {
    let system = "You are a strict planning verifier. \
Given a plan and test cases, check their correctness and adequacy for the problem. \
Ensure test cases cover boundary conditions (empty inputs, single elements, duplicates, type \
conversions, and large sizes) when applicable. \
Respond strictly as XML: <response><verdict>CORRECT or INCORRECT</verdict><reasons>...</reasons></response>. \
Give reasons only when the verdict is INCORRECT.";

    vec![
        Message::system(system),
        Message::user(format!(
            "Problem description:\n{problem}\n\n\
             Plan:\n{plan}\n\n\
             Test cases:\n{test_cases}\n\n\
             Check correctness and adequacy. Respond with 'CORRECT' or 'INCORRECT'."
        )),
    ]
}

/// Code generation from a plan, optionally in a given style.
pub fn code_generation(ctx: &CodeContext<'_>, style: Option<&str>) -> Vec<Message> {
    let style = style
        .map(|style| format!("Style: {style}. "))
        .unwrap_or_default();

    vec![
        Message::system(CODER_SYSTEM),
        Message::user(format!(
            "Problem description:\n{}\n\n\
             Plan:\n{}\n\n\
             Test cases:\n{}\n\n\
             {}Target language: {}. {}\
             Return only the solution code inside a fenced code block.",
            ctx.problem,
            ctx.plan,
            ctx.test_cases,
            ctx.constraint_block(),
            ctx.language,
            style
        )),
    ]
}

/// Direct code generation used in fast mode.
pub fn direct_code_generation(ctx: &CodeContext<'_>) -> Vec<Message> {
    vec![
        Message::system(
            "You are a coding agent. Return only executable solution code for the task. \
             Do not include any commentary or explanations.",
        ),
        Message::user(format!(
            "Problem description:\n{}\n\n{}Target language: {}. Output only executable code.",
            ctx.problem,
            ctx.constraint_block(),
            ctx.language
        )),
    ]
}

/// Repair request carrying execution feedback.
pub fn improvement(ctx: &CodeContext<'_>, code: &str, feedback: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You are a debugging agent. Improve the given solution based on execution feedback. \
             Return only the corrected code fenced in triple backticks with an explicit language tag.",
        ),
        Message::user(format!(
            "Problem description:\n{}\n\n\
             Current code:\n{}\n\n\
             Plan:\n{}\n\n\
             Test cases:\n{}\n\n\
             {}Feedback:\n{}\n\n\
             Target language: {}. Return only the improved solution inside a fenced code block.",
            ctx.problem,
            code,
            ctx.plan,
            ctx.test_cases,
            ctx.constraint_block(),
            feedback,
            ctx.language
        )),
    ]
}

//! Candidate synthesis: prompts, reply parsing and the pass state machine.

pub mod config;
pub mod extract;
pub mod prompts;
pub mod protocol;
pub mod synthesis;

pub use config::{StrategyConfig, StrategyMode};
pub use extract::extract_code;
pub use protocol::{parse_reply, parse_verdict, PlanVerdict, ProtocolReply};
pub use synthesis::{PassOutput, PassTally, SynthesisStrategy};

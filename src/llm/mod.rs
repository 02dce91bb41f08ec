//! LLM integration for code-forge.
//!
//! The synthesis strategy only ever sees a [`Generator`]: role-tagged
//! messages in, completion text plus prompt/completion token counts out.
//! [`LiteLlmClient`] is the production [`LlmProvider`] speaking the
//! OpenAI-compatible chat completion protocol.
//!
//! ```ignore
//! use code_forge::llm::{Generator, GeneratorProfile, LiteLlmClient, Message};
//! use std::sync::Arc;
//!
//! let client = LiteLlmClient::from_env()?;
//! let generator = Generator::new(Arc::new(client), GeneratorProfile::new("qwen-coder-turbo"));
//! let completion = generator.prompt(vec![Message::user("Hello")]).await?;
//! println!("{} ({} prompt tokens)", completion.text, completion.prompt_tokens);
//! ```

pub mod generator;
pub mod litellm;

pub use generator::{Completion, Generator, GeneratorProfile};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL,
};

//! The generator capability consumed by the synthesis strategy.
//!
//! A [`Generator`] wraps any [`LlmProvider`] together with a
//! [`GeneratorProfile`] that is resolved once at startup: which model to
//! call, whether the provider accepts sampling parameters, whether it can be
//! trusted with structured multi-field replies, and which model to fall back
//! to when the primary one is unavailable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::litellm::{GenerationRequest, LlmProvider, Message};
use crate::error::LlmError;

/// Text produced by one generator call plus its token accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Static description of how to talk to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorProfile {
    /// Model identifier sent with every request. Empty means provider default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling parameter.
    pub top_p: f64,
    /// Optional completion budget per call.
    pub max_tokens: Option<u32>,
    /// Some providers reject `temperature`/`top_p` outright.
    pub sampling_params: bool,
    /// Whether the model reliably follows the multi-field reply protocol.
    /// Models without it run the strategy in fast mode.
    pub structured_output: bool,
    /// Model retried once when the primary returns empty content or is
    /// reported missing by the provider.
    pub fallback_model: Option<String>,
}

impl Default for GeneratorProfile {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: None,
            sampling_params: true,
            structured_output: true,
            fallback_model: None,
        }
    }
}

impl GeneratorProfile {
    /// Creates a profile for the given model with default settings.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Stops sending `temperature`/`top_p`.
    pub fn without_sampling_params(mut self) -> Self {
        self.sampling_params = false;
        self
    }

    /// Marks the model as unreliable with structured replies.
    pub fn without_structured_output(mut self) -> Self {
        self.structured_output = false;
        self
    }

    /// Sets the fallback model.
    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    fn request(&self, model: &str, messages: Vec<Message>) -> GenerationRequest {
        let mut request = GenerationRequest::new(model, messages);
        if self.sampling_params {
            request = request
                .with_temperature(self.temperature)
                .with_top_p(self.top_p);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

/// Chat generator used by the synthesis strategy.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    profile: GeneratorProfile,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, profile: GeneratorProfile) -> Self {
        Self { provider, profile }
    }

    pub fn profile(&self) -> &GeneratorProfile {
        &self.profile
    }

    /// Sends the messages and returns the completion text with token counts.
    ///
    /// Transport and provider failures are returned to the caller untouched,
    /// except that a model-unavailable failure or an empty completion is
    /// retried once against the fallback model when one is configured.
    pub async fn prompt(&self, messages: Vec<Message>) -> Result<Completion, LlmError> {
        let primary = self.call(&self.profile.model, messages.clone()).await;

        let fallback = match &self.profile.fallback_model {
            Some(fallback) if fallback != &self.profile.model => fallback,
            _ => return primary,
        };

        match primary {
            Err(e) if e.is_model_unavailable() => {
                warn!(
                    model = %self.profile.model,
                    fallback = %fallback,
                    error = %e,
                    "Primary model unavailable, retrying with fallback"
                );
                self.call(fallback, messages).await
            }
            other => other,
        }
    }

    async fn call(&self, model: &str, messages: Vec<Message>) -> Result<Completion, LlmError> {
        let request = self.profile.request(model, messages);
        let response = self.provider.generate(request).await?;

        let text = response.first_content().unwrap_or_default().to_string();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion(model.to_string()));
        }

        debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Generator call completed"
        );

        Ok(Completion {
            text,
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
        })
    }
}

//! Inference backends
//!
//! The pipeline treats inference as an opaque capability:
//! `generate(prompt, config) -> completion | error`. Backends report token
//! usage when the provider returns it; otherwise the pipeline estimates it.

mod openrouter;

pub use openrouter::OpenRouterBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::{Error, Result};

/// Number of prompt characters echoed back by [`EchoBackend`]
const ECHO_PREVIEW_CHARS: usize = 100;

/// Per-call generation settings taken from a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            temperature,
        }
    }
}

/// Provider-reported token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Text returned by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Opaque text-generation capability
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion>;
}

/// Backend that echoes the start of the prompt, for dry runs
#[derive(Debug, Clone, Default)]
pub struct EchoBackend;

#[async_trait]
impl InferenceBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<Completion> {
        let preview: String = prompt.chars().take(ECHO_PREVIEW_CHARS).collect();
        Ok(Completion::new(format!("Echo response to: {}", preview)))
    }
}

/// Build the backend named in configuration
pub fn backend_from_config(config: &InferenceConfig) -> Result<Box<dyn InferenceBackend>> {
    match config.backend.as_str() {
        "echo" => Ok(Box::new(EchoBackend)),
        "openrouter" => {
            let api_key = config
                .resolved_api_key()
                .map_err(|e| Error::ConfigError(e.to_string()))?
                .ok_or_else(|| {
                    Error::LLMError("No API key found in MINER_API_KEY or OPENROUTER_API_KEY".to_string())
                })?;
            Ok(Box::new(OpenRouterBackend::new(
                &config.base_url,
                api_key,
                config.timeout_secs,
            )?))
        }
        other => Err(Error::ConfigError(format!(
            "Unknown inference backend: {}",
            other
        ))),
    }
}

/// Estimate tokens from character counts (about four characters per token)
pub fn estimate_tokens(prompt: &str, response: &str) -> u64 {
    let chars = prompt.chars().count() + response.chars().count();
    chars.div_ceil(4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_backend_previews_prompt() {
        let backend = EchoBackend;
        let config = GenerationConfig::new("gemini-pro", 100, 0.7);
        let long_prompt = "p".repeat(500);

        let completion = backend.generate(&long_prompt, &config).await.unwrap();
        assert_eq!(
            completion.text,
            format!("Echo response to: {}", "p".repeat(100))
        );
        assert!(completion.usage.is_none());
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("", ""), 0);
        assert_eq!(estimate_tokens("abcd", ""), 1);
        assert_eq!(estimate_tokens("abcd", "e"), 2);
        assert_eq!(estimate_tokens("ééé", "é"), 1);
    }

    #[test]
    fn test_usage_total_saturates() {
        assert_eq!(TokenUsage::new(10, 5).total(), 15);
        assert_eq!(TokenUsage::new(u64::MAX, 5).total(), u64::MAX);
    }

    #[test]
    fn test_backend_from_config() {
        let echo = backend_from_config(&InferenceConfig::default()).unwrap();
        assert_eq!(echo.name(), "echo");

        let unknown = InferenceConfig {
            backend: "local".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            backend_from_config(&unknown),
            Err(Error::ConfigError(_))
        ));
    }
}

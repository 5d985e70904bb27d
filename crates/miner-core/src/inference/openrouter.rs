//! OpenRouter inference backend
//!
//! Non-streaming chat completions against the OpenAI-compatible OpenRouter
//! API. Failures are returned once; the pipeline does not retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completion, GenerationConfig, InferenceBackend, TokenUsage};
use crate::error::{Error, Result};
use crate::routing::Provider;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: String,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

/// OpenRouter chat completion backend
#[derive(Clone)]
pub struct OpenRouterBackend {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenRouterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenRouterBackend {
    /// Create a backend with a request timeout
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// OpenRouter model id for a routed model name
    ///
    /// Names that already carry a vendor prefix pass through; otherwise the
    /// provider family becomes the prefix.
    pub fn model_id(model: &str) -> String {
        if model.contains('/') {
            return model.to_string();
        }
        match Provider::for_model(model) {
            Some(provider) => format!("{}/{}", provider.as_str(), model),
            None => model.to_string(),
        }
    }

    async fn error_for_status(status: reqwest::StatusCode, response: reqwest::Response) -> Error {
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Error::LLMError(
                "Unauthorized: Invalid API key. Set MINER_API_KEY or OPENROUTER_API_KEY environment variable.".to_string(),
            ),
            402 => Error::LLMError(
                "Payment required: Insufficient credits on OpenRouter account".to_string(),
            ),
            429 => Error::LLMError(format!("Rate limited: {}", body)),
            404 => Error::LLMError(format!(
                "Model not found or endpoint unavailable: {}",
                body
            )),
            500..=599 => Error::InferenceFailed(format!("Server error ({}): {}", status, body)),
            _ => Error::LLMError(format!("HTTP error {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: Self::model_id(&config.model),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        debug!(model = %request.model, max_tokens = request.max_tokens, "Sending chat completion request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "subnet-miner")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::InferenceFailed(format!("Request timed out: {}", e))
                } else {
                    Error::NetworkError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_for_status(status, response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }

        let mut completion = Completion::new(text);
        if let Some(usage) = chat.usage {
            completion = completion.with_usage(TokenUsage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            ));
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> GenerationConfig {
        GenerationConfig::new("claude-sonnet", 256, 0.7)
    }

    #[test]
    fn test_model_id_prefixes_family() {
        assert_eq!(OpenRouterBackend::model_id("claude-sonnet"), "anthropic/claude-sonnet");
        assert_eq!(OpenRouterBackend::model_id("openai/gpt-4o"), "openai/gpt-4o");
        assert_eq!(OpenRouterBackend::model_id("llama-3"), "llama-3");
    }

    #[tokio::test]
    async fn test_generate_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "42" } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend =
            OpenRouterBackend::new(&format!("{}/api/v1", server.uri()), "sk-test", 5).unwrap();
        let completion = backend.generate("What is 6*7?", &config()).await.unwrap();

        assert_eq!(completion.text, "42");
        assert_eq!(completion.usage, Some(TokenUsage::new(12, 3)));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["model"], "anthropic/claude-sonnet");
        assert_eq!(body["max_tokens"], 256);
    }

    #[tokio::test]
    async fn test_blank_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "   " } }]
            })))
            .mount(&server)
            .await;

        let backend = OpenRouterBackend::new(&server.uri(), "sk-test", 5).unwrap();
        let err = backend.generate("hi", &config()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let backend = OpenRouterBackend::new(&server.uri(), "sk-wrong", 5).unwrap();
        let err = backend.generate("hi", &config()).await.unwrap_err();
        assert!(matches!(err, Error::LLMError(ref msg) if msg.contains("Unauthorized")));
        assert!(err.is_inference_failure());
    }
}

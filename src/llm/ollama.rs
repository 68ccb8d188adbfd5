use std::time::Duration;

use super::{
    LlmClient, LlmError, LlmRequest, RetryPolicy, http_client, parse_url, post_json,
    retry_with_backoff,
};
use crate::config::DEFAULT_OLLAMA_URL;

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use tasklens::llm::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .model("llama3.2")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.model(), "llama3.2");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl OllamaClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL (e.g. "http://localhost:11434").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name (e.g. "llama3.2" or "qwen2.5:7b").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Builds the client.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, `OLLAMA_HOST` is used, defaulting to
    /// `http://localhost:11434`. If `model()` was not called, `OLLAMA_MODEL`
    /// is used, defaulting to an empty string.
    pub fn build(self) -> Result<OllamaClient, LlmError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let model = self
            .model
            .or_else(|| std::env::var("OLLAMA_MODEL").ok())
            .unwrap_or_default();

        parse_url(&base_url)?;
        let client = http_client(self.timeout.unwrap_or(Duration::from_secs(60)))?;

        Ok(OllamaClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            retry: self.retry,
        })
    }
}

/// Synchronous client for Ollama's `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::Value::String(system.clone());
        }
        if request.json {
            body["format"] = serde_json::Value::String("json".to_string());
        }
        body
    }
}

/// Extracts the generated text from an `/api/generate` response.
fn response_text(json: &serde_json::Value) -> Result<String, LlmError> {
    json.get("response")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::Api {
            message: "Missing 'response' field in API response".to_string(),
        })
}

impl LlmClient for OllamaClient {
    fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.request_body(request);

        retry_with_backoff(self.retry, || {
            let json = post_json(&self.client, &url, &body, None)?;
            response_text(&json)
        })
    }
}

use std::time::Duration;

use super::{
    LlmClient, LlmError, LlmRequest, RetryPolicy, http_client, parse_url, post_json,
    retry_with_backoff,
};
use crate::config::DEFAULT_OPENAI_URL;

/// Builder for [`OpenAiClient`].
#[derive(Debug, Default)]
pub struct OpenAiClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl OpenAiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API root, e.g. `https://api.openai.com/v1` or a local
    /// OpenAI-compatible server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

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

    pub fn build(self) -> Result<OpenAiClient, LlmError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        parse_url(&base_url)?;

        Ok(OpenAiClient {
            client: http_client(self.timeout.unwrap_or(Duration::from_secs(60)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.filter(|k| !k.is_empty()),
            model: self.model.unwrap_or_default(),
            retry: self.retry,
        })
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if request.json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

/// Extracts the first choice's message content.
fn completion_text(json: &serde_json::Value) -> Result<String, LlmError> {
    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::Api {
            message: "Missing 'choices[0].message.content' in API response".to_string(),
        })
}

impl LlmClient for OpenAiClient {
    fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        retry_with_backoff(self.retry, || {
            let json = post_json(&self.client, &url, &body, self.api_key.as_deref())?;
            completion_text(&json)
        })
    }
}

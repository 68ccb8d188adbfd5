//! Model backends.
//!
//! Everything above this module talks to a model through [`LlmClient`], so
//! tests substitute a mock struct and the pipeline never knows which
//! provider answered.

mod error;
mod ollama;
mod openai;
mod retry;

use std::sync::Arc;
use std::time::Duration;

pub use error::{ErrorKind, LlmError};
pub use ollama::{OllamaClient, OllamaClientBuilder};
pub use openai::{OpenAiClient, OpenAiClientBuilder};
pub use retry::{CancellationToken, RetryPolicy, generate_cancellable, retry_with_backoff};

use crate::config::{ConfigError, ProviderKind, ProviderSettings};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One prompt to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the backend to constrain output to a JSON object.
    pub json: bool,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            json: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn expect_json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Text generation backend.
///
/// This trait enables mocking in unit tests and keeps provider details out
/// of the query pipeline.
pub trait LlmClient: Send + Sync {
    /// Sends one request and returns the raw model output.
    fn generate(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Builds the client described by `provider`.
pub fn build_client(provider: &ProviderSettings) -> Result<Arc<dyn LlmClient>, ConfigError> {
    provider.validate()?;

    let model = provider.model.clone().unwrap_or_default();
    let timeout = Duration::from_secs(provider.timeout_secs);
    let retry = RetryPolicy::with_retries(provider.max_retries);
    let to_config = |e: LlmError| ConfigError::InvalidUrl(e.to_string());

    let client: Arc<dyn LlmClient> = match provider.kind {
        ProviderKind::Ollama => Arc::new(
            OllamaClientBuilder::new()
                .base_url(provider.effective_base_url())
                .model(model)
                .timeout(timeout)
                .retry_policy(retry)
                .build()
                .map_err(to_config)?,
        ),
        ProviderKind::OpenAi => Arc::new(
            OpenAiClientBuilder::new()
                .base_url(provider.effective_base_url())
                .api_key(provider.api_key.clone().unwrap_or_default())
                .model(model)
                .timeout(timeout)
                .retry_policy(retry)
                .build()
                .map_err(to_config)?,
        ),
    };
    tracing::debug!(provider = %provider.kind, "model client ready");
    Ok(client)
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, LlmError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(LlmError::Network)
}

fn parse_url(url: &str) -> Result<(), LlmError> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| LlmError::InvalidUrl(format!("{url}: {e}")))
}

/// Posts a JSON body and returns the JSON response, turning non-success
/// statuses into classified [`LlmError::Http`] errors.
fn post_json(
    client: &reqwest::blocking::Client,
    url: &str,
    body: &serde_json::Value,
    bearer: Option<&str>,
) -> Result<serde_json::Value, LlmError> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request.send().map_err(LlmError::from_reqwest)?;

    let status = response.status();
    let text = response.text().map_err(LlmError::from_reqwest)?;
    if !status.is_success() {
        return Err(LlmError::from_body(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(LlmError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let request = LlmRequest::new("prompt").with_system("system").expect_json();
        assert_eq!(request.prompt, "prompt");
        assert_eq!(request.system.as_deref(), Some("system"));
        assert!(request.json);
    }

    #[test]
    fn trait_can_be_implemented_by_mock_struct() {
        struct MockClient {
            response: String,
        }

        impl LlmClient for MockClient {
            fn generate(&self, _request: &LlmRequest) -> Result<String, LlmError> {
                Ok(self.response.clone())
            }
        }

        let mock: Arc<dyn LlmClient> = Arc::new(MockClient {
            response: "test response".to_string(),
        });
        assert_eq!(
            mock.generate(&LlmRequest::new("test prompt")).unwrap(),
            "test response"
        );
    }

    #[test]
    fn build_client_rejects_incomplete_settings() {
        let provider = ProviderSettings::default();
        assert!(matches!(
            build_client(&provider),
            Err(ConfigError::MissingModel { .. })
        ));
    }

    #[test]
    fn build_client_accepts_complete_settings() {
        let provider = ProviderSettings {
            model: Some("llama3.2".to_string()),
            ..Default::default()
        };
        assert!(build_client(&provider).is_ok());

        let provider = ProviderSettings {
            kind: ProviderKind::OpenAi,
            model: Some("gpt-4o-mini".to_string()),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(build_client(&provider).is_ok());
    }
}

use thiserror::Error;

/// Errors that can occur when calling a model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection failures, DNS resolution and similar transport errors.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Non-success HTTP status, with the provider's own error type when it
    /// sent one.
    #[error("HTTP error: status {status}: {message}")]
    Http {
        status: u16,
        error_type: Option<String>,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Well-formed response that does not carry what was asked for.
    #[error("API error: {message}")]
    Api { message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// User-facing classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredentials,
    RateLimit,
    ContextLengthExceeded,
    ModelNotFound,
    Connectivity,
    Cancelled,
    Generic,
}

impl ErrorKind {
    /// Classifies an HTTP failure from its status code and the provider's
    /// error type or message.
    pub fn from_response(status: u16, detail: &str) -> Self {
        let detail = detail.to_lowercase();
        match status {
            401 | 403 => Self::InvalidCredentials,
            429 => Self::RateLimit,
            404 => Self::ModelNotFound,
            _ if detail.contains("model_not_found") || detail.contains("model not found") => {
                Self::ModelNotFound
            }
            400 | 413 if detail.contains("context_length") || detail.contains("context length") => {
                Self::ContextLengthExceeded
            }
            500..=599 => Self::Connectivity,
            _ => Self::Generic,
        }
    }

    /// Short label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid credentials",
            Self::RateLimit => "rate limited",
            Self::ContextLengthExceeded => "context length exceeded",
            Self::ModelNotFound => "model not found",
            Self::Connectivity => "connectivity",
            Self::Cancelled => "cancelled",
            Self::Generic => "error",
        }
    }

    /// What the user can do about it.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => {
                "Check the API key for the configured provider (OPENAI_API_KEY)."
            }
            Self::RateLimit => {
                "The provider is rate limiting requests. Wait a moment, or set provider.max_retries."
            }
            Self::ContextLengthExceeded => {
                "The prompt is too long for this model. Lower max_tasks_for_ai or pick a model with a larger context window."
            }
            Self::ModelNotFound => {
                "The model is not available. Pull it (ollama pull <model>) or set TASKLENS_MODEL."
            }
            Self::Connectivity => {
                "Could not reach the provider. Check that it is running and that base_url is correct."
            }
            Self::Cancelled => "The request was cancelled.",
            Self::Generic => "See the error message for details.",
        }
    }
}

impl LlmError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Network(error)
        }
    }

    /// Builds an HTTP error from a failed response body, pulling out the
    /// provider's message and error type when the body is JSON.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));

        let message = error
            .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().chars().take(200).collect());
        let error_type = error
            .and_then(|e| e.get("type").or_else(|| e.get("code")))
            .and_then(|t| t.as_str())
            .map(str::to_string);

        Self::Http {
            status,
            error_type,
            message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::InvalidUrl(_) => ErrorKind::Connectivity,
            Self::Http {
                status,
                error_type,
                message,
            } => {
                let detail = format!("{} {message}", error_type.as_deref().unwrap_or_default());
                ErrorKind::from_response(*status, &detail)
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Api { .. } => ErrorKind::Generic,
        }
    }

    pub fn remediation(&self) -> &'static str {
        self.kind().remediation()
    }

    /// Transient failures worth another attempt: transport errors, rate
    /// limits and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

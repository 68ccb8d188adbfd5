use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::{LlmClient, LlmError, LlmRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag shared between a caller and a pending call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. Zero means no retry.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::none()
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1 << retry.min(16))
    }
}

/// Retries an operation with exponential backoff.
///
/// Only errors for which [`LlmError::is_retryable`] holds are retried; the
/// first non-retryable error is returned immediately. With the default
/// policy the operation runs exactly once.
pub fn retry_with_backoff<F, T>(policy: RetryPolicy, mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Result<T, LlmError>,
{
    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) if !e.is_retryable() => return Err(e),
        Err(e) => e,
    };

    for retry in 0..policy.max_retries {
        let delay = policy.delay(retry);
        tracing::warn!(
            attempt = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %last_error,
            "retrying model request"
        );
        thread::sleep(delay);

        match f() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Runs a model call on a helper thread and waits for it unless `cancel`
/// fires first.
///
/// Cancellation abandons the pending call: its eventual result is dropped
/// and `LlmError::Cancelled` is returned straight away.
pub fn generate_cancellable(
    client: Arc<dyn LlmClient>,
    request: LlmRequest,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    if cancel.is_cancelled() {
        return Err(LlmError::Cancelled);
    }

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("tasklens-llm".to_string())
        .spawn(move || {
            // The receiver is gone if the caller cancelled.
            let _ = tx.send(client.generate(&request));
        })
        .map_err(|e| LlmError::Api {
            message: format!("failed to start request thread: {e}"),
        })?;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => return result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    tracing::info!("model request cancelled");
                    return Err(LlmError::Cancelled);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(LlmError::Api {
                    message: "request thread ended without a result".to_string(),
                });
            }
        }
    }
}

/// Retry-with-backoff for calls to the remote completion service.
///
/// Retryability is decided by status class only: transport failures and statuses >= 500 are
/// retried, anything below 500 that is not a success is returned immediately. Delays follow
/// `initial_backoff * 2^(attempt-1)` (1s, 2s, 4s, ... with the default policy).
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::SuggestError;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Status and body of one completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Delay to wait after the failed `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

/// Run `send` until it yields a success, a non-retryable status, or attempts run out.
///
/// `send` receives the 1-based attempt number. It must return `Ok` for every HTTP exchange
/// that produced a status (whatever the status) and `Err(SuggestError::TransientNetwork)`
/// for transport failures. Any other error from `send` is returned as-is.
pub async fn send_with_retry<F, Fut>(policy: &RetryPolicy, mut send: F) -> Result<HttpReply, SuggestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<HttpReply, SuggestError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let last = match send(attempt).await {
            Ok(reply) if reply.is_success() => return Ok(reply),
            Ok(reply) if !reply.is_server_error() => {
                return Err(SuggestError::NonRetryableService {
                    status: reply.status,
                    message: reported_message(&reply),
                });
            }
            Ok(reply) => {
                warn!(attempt, status = reply.status, "AI service returned server error");
                format!("status {}: {}", reply.status, reported_message(&reply))
            }
            Err(e) if e.is_retryable() => {
                warn!(attempt, error = %e, "AI request failed with transport error");
                e.to_string()
            }
            Err(e) => return Err(e),
        };

        if attempt >= max_attempts {
            return Err(SuggestError::RetriesExhausted {
                attempts: attempt,
                last,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, delay_ms = delay.as_millis(), "retrying AI request");
        tokio::time::sleep(delay).await;
    }
}

/// The service's own error message if the body carries `{"error": {"message": ...}}`,
/// otherwise the raw body (or a placeholder when empty).
pub fn reported_message(reply: &HttpReply) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&reply.body) {
        if let Some(message) = envelope.error.message.filter(|m| !m.trim().is_empty()) {
            return message;
        }
    }
    let body = reply.body.trim();
    if body.is_empty() {
        format!("HTTP {}", reply.status)
    } else {
        body.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}

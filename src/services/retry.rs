//! Bounded retry with exponential backoff for calls to external services.
//!
//! Only transient failures (connection problems, timeouts, HTTP 429 and 5xx)
//! are retried. Whatever is left after the last attempt is returned to the
//! caller, which decides how the failed unit degrades.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::errors::AppError;

/// Delay before the first retry; doubled for each following attempt.
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Upper bound for a single backoff delay.
const RETRY_MAX_DELAY_MS: u64 = 4_000;

/// Failure of one call to an external service.
#[derive(Debug)]
pub enum CallError {
    /// Worth another attempt.
    Transient(String),
    /// Retrying will not help (bad request, unparseable body, ...).
    Fatal(String),
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transient(msg) | CallError::Fatal(msg) => AppError::ExternalServiceError(msg),
        }
    }
}

impl CallError {
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            CallError::Transient(format!("{} request failed: {}", service, err))
        } else {
            CallError::Fatal(format!("{} request failed: {}", service, err))
        }
    }

    pub fn from_status(service: &str, status: StatusCode) -> Self {
        let msg = format!("{} returned HTTP {}", service, status);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            CallError::Transient(msg)
        } else {
            CallError::Fatal(msg)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(Duration::from_millis(RETRY_MAX_DELAY_MS))
    }

    /// Run `op` until it succeeds, fails fatally, or retries are exhausted.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(CallError::Transient(msg)) if retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::debug!(
                        what,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        msg
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//! Model-call resilience: error classification and retry with backoff.
//!
//! Provider errors are classified as recoverable or non-recoverable from
//! their message text; recoverable ones are retried with exponential backoff
//! and jitter before the failure is surfaced to the loop.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, error, warn};

use termpilot_providers::{CompletionRequest, CompletionResponse, LLMProvider};

/// Base delay for exponential backoff (in milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Maximum delay between retries (in milliseconds)
const MAX_RETRY_DELAY_MS: u64 = 10000;

/// Jitter factor applied to every delay
const JITTER_FACTOR: f64 = 0.3;

/// Classification of provider error types
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    /// Rate limit exceeded
    RateLimit,
    /// Temporary network error
    Network,
    /// Server error (5xx)
    Server,
    /// Model is busy/overloaded
    Busy,
    /// Timeout
    Timeout,
    /// Anything else; not retried
    Fatal,
}

impl ProviderErrorKind {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProviderErrorKind::Fatal)
    }
}

/// Classify a provider error from its message text
pub fn classify_provider_error(error: &anyhow::Error) -> ProviderErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("rate limit")
        || error_str.contains("rate_limit")
        || error_str.contains("429")
    {
        return ProviderErrorKind::RateLimit;
    }

    if error_str.contains("network")
        || error_str.contains("connection")
        || error_str.contains("dns")
        || error_str.contains("refused")
    {
        return ProviderErrorKind::Network;
    }

    if error_str.contains("500")
        || error_str.contains("502")
        || error_str.contains("503")
        || error_str.contains("504")
        || error_str.contains("server error")
        || error_str.contains("internal error")
    {
        return ProviderErrorKind::Server;
    }

    if error_str.contains("busy")
        || error_str.contains("overloaded")
        || error_str.contains("capacity")
        || error_str.contains("unavailable")
    {
        return ProviderErrorKind::Busy;
    }

    if error_str.contains("timeout") || error_str.contains("timed out") {
        return ProviderErrorKind::Timeout;
    }

    ProviderErrorKind::Fatal
}

/// Calculate retry delay with exponential backoff and jitter
pub fn calculate_retry_delay(attempt: u32) -> Duration {
    use rand::Rng;

    let base_delay = BASE_RETRY_DELAY_MS * (2_u64.pow(attempt.saturating_sub(1)));
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_MS);

    // Jitter prevents synchronized retries across sessions
    let mut rng = rand::thread_rng();
    let jitter = (capped_delay as f64 * JITTER_FACTOR * rng.gen::<f64>()) as u64;
    let final_delay = if rng.gen_bool(0.5) {
        capped_delay + jitter
    } else {
        capped_delay.saturating_sub(jitter)
    };

    Duration::from_millis(final_delay)
}

/// Run a completion, retrying recoverable failures up to `max_attempts`.
pub async fn complete_with_retry(
    provider: &dyn LLMProvider,
    request: CompletionRequest,
    max_attempts: u32,
) -> Result<CompletionResponse> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match provider.complete(request.clone()).await {
            Ok(response) => {
                if attempt > 1 {
                    debug!("Model call succeeded after {} attempts", attempt);
                }
                return Ok(response);
            }
            Err(err) => {
                let kind = classify_provider_error(&err);
                if !kind.is_recoverable() || attempt >= max_attempts {
                    error!(
                        "Model call failed after {} attempt(s) ({:?}): {}",
                        attempt, kind, err
                    );
                    return Err(err);
                }

                let delay = calculate_retry_delay(attempt);
                warn!(
                    "Recoverable model error ({:?}) on attempt {}/{}. Retrying in {:?}: {}",
                    kind, attempt, max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

//! Shared HTTP retry helper used by feed fetchers, market data, the LLM
//! client, and the webhook poster.
//!
//! Directly generalizes the teacher's `DomeScraper::execute_with_retry`
//! (`scrapers/dome.rs`): exponential backoff capped at 30s, a hard timeout
//! per attempt, and explicit handling of HTTP 429 with a longer backoff
//! before the next attempt.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

const DEFAULT_MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Runs `request_fn` up to `max_retries` times with exponential backoff,
/// bounded per-attempt by `attempt_timeout`. `request_fn` must be retryable
/// from scratch on every call (no partial side effects across attempts).
pub async fn execute_with_retry<F, Fut>(
    label: &str,
    attempt_timeout: Duration,
    max_retries: u32,
    request_fn: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut backoff = INITIAL_BACKOFF_MS;

    for attempt in 0..max_retries.max(1) {
        match timeout(attempt_timeout, request_fn()).await {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    return Ok(response);
                } else if response.status().as_u16() == 429 {
                    warn!(label, attempt, "rate limited, backing off");
                    sleep(Duration::from_millis(backoff * 10)).await;
                } else if response.status().is_server_error() {
                    warn!(label, attempt, status = %response.status(), "server error, retrying");
                } else {
                    error!(label, status = %response.status(), "permanent error, not retrying");
                    return Err(anyhow!("{label}: http {}", response.status()));
                }
            }
            Ok(Err(err)) => {
                warn!(label, attempt, error = %err, "request failed");
            }
            Err(_) => {
                warn!(label, attempt, "request timed out");
            }
        }

        if attempt + 1 < max_retries.max(1) {
            info!(label, backoff_ms = backoff, "retrying");
            sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
        }
    }

    Err(anyhow!("{label}: max retries exceeded"))
}

pub fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gives_up_after_max_retries_against_unreachable_host() {
        let client = reqwest::Client::new();
        let result = execute_with_retry(
            "test",
            Duration::from_millis(200),
            2,
            || client.get("http://127.0.0.1:1").send(),
        )
        .await;
        assert!(result.is_err());
    }
}

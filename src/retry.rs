//! Bounded retry with exponential backoff (500ms, 1s, 2s, ...).

use std::future::Future;
use std::time::Duration;

use crate::error::{SourceError, SummarizeError};

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        SourceError::is_retryable(self)
    }
}

impl Retryable for SummarizeError {
    fn is_retryable(&self) -> bool {
        SummarizeError::is_retryable(self)
    }
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500u64 << attempt.saturating_sub(1).min(6))
}

/// Run `op` up to `max_attempts` times (at least once). Non-retryable errors return
/// immediately.
pub async fn with_retries<T, E, F, Fut>(what: &str, max_attempts: u32, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(attempt);
                tracing::debug!(what, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

use std::{future::Future, time::Duration};
use tracing::warn;

use super::error::PlayerResult;

/// Bounded retry for starting a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` with 1-based attempt numbers until it succeeds, fails with a
    /// non-retryable error, or runs out of attempts. The last error wins.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> PlayerResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PlayerResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("⚠️ Attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

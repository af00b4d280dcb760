use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use super::StoreError;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Per-call timeout for every store round-trip, plus a bounded retry budget
/// that only idempotent reads may spend. Writes get exactly one attempt.
#[derive(Debug, Clone, Copy)]
pub struct StorePolicy {
    pub timeout: Duration,
    pub read_retries: usize,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            read_retries: 2,
        }
    }
}

impl StorePolicy {
    pub async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(op)),
        }
    }

    pub async fn read<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.read_retries + 1;
        let mut attempt = 1;
        loop {
            match self.bounded(op, call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(op, attempt, error = %e, "Retrying store read");
                    sleep(RETRY_BACKOFF * attempt as u32).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

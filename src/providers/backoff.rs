//! Exponential backoff for completion retries (spec §4.C: factor 60s, cap
//! 60s, deadline 600s).

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Error, Result};

const FACTOR_SECS: u64 = 60;
const CAP_SECS: u64 = 60;
const DEADLINE_SECS: u64 = 600;

fn is_retriable(err: &Error) -> bool {
    matches!(err, Error::Transient(_) | Error::RateLimited { .. })
}

/// Retries `op` while it returns a retriable error, backing off by
/// `FACTOR_SECS` each attempt (capped at `CAP_SECS`), until `DEADLINE_SECS`
/// total elapsed time is exceeded.
pub async fn with_completion_backoff<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + Duration::from_secs(DEADLINE_SECS);
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retriable(&err) => {
                if Instant::now() >= deadline {
                    return Err(err);
                }
                let wait = if let Error::RateLimited { retry_after_secs } = &err {
                    Duration::from_secs((*retry_after_secs).min(CAP_SECS))
                } else {
                    Duration::from_secs(FACTOR_SECS.saturating_mul(u64::from(attempt) + 1).min(CAP_SECS))
                };
                warn!(op_name, attempt, wait_secs = wait.as_secs(), "retrying completion call");
                sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

//! Endpoint Failover Pool (spec §4.D): round-robins an embedding-capable
//! provider across N named endpoints, cooling down on rate limits and
//! repeated failures.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::domain::Endpoint;
use crate::error::{Error, Result};

const FAILURE_COOLDOWN_SECS: i64 = 90;
const FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: i64 = 60;

struct PoolState {
    endpoints: Vec<Endpoint>,
    current_index: usize,
}

/// Round-robin endpoint selector with cooldown bookkeeping. Does not itself
/// hold an HTTP client: callers re-resolve the client for the selected
/// endpoint's `base_url`/`credential` each call, mirroring the
/// "reinitialize the underlying client" behavior of spec §4.D.
pub struct EndpointPool {
    state: Mutex<PoolState>,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                endpoints,
                current_index: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks the first available endpoint starting at the current index and
    /// scanning forward circularly.
    fn select(&self, now: DateTime<Utc>) -> Option<(usize, Endpoint)> {
        let state = self.state.lock();
        let n = state.endpoints.len();
        if n == 0 {
            return None;
        }
        (0..n)
            .map(|offset| (state.current_index + offset) % n)
            .find(|&idx| state.endpoints[idx].is_available(now))
            .map(|idx| (idx, state.endpoints[idx].clone()))
    }

    fn advance_from(&self, idx: usize) {
        let mut state = self.state.lock();
        let n = state.endpoints.len();
        if n > 0 {
            state.current_index = (idx + 1) % n;
        }
    }

    fn record_rate_limit(&self, idx: usize, retry_after_secs: Option<u64>) {
        let mut state = self.state.lock();
        let cooldown = retry_after_secs.unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN_SECS as u64) as i64;
        if let Some(endpoint) = state.endpoints.get_mut(idx) {
            endpoint.rate_limited_until = Some(Utc::now() + ChronoDuration::seconds(cooldown));
            endpoint.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, idx: usize) {
        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(idx) {
            endpoint.consecutive_failures += 1;
            if endpoint.consecutive_failures >= FAILURE_THRESHOLD {
                endpoint.rate_limited_until = Some(Utc::now() + ChronoDuration::seconds(FAILURE_COOLDOWN_SECS));
                endpoint.consecutive_failures = 0;
            }
        }
    }

    fn record_success(&self, idx: usize) {
        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(idx) {
            endpoint.consecutive_failures = 0;
        }
    }

    /// Runs `call` against successively selected endpoints until it
    /// succeeds, the retry budget (`2 * N`) is exhausted, or every endpoint
    /// is rate-limited.
    pub async fn call_with_failover<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let n = self.len();
        if n == 0 {
            return Err(Error::AllEndpointsUnavailable);
        }
        let retry_budget = 2 * n;

        for _ in 0..retry_budget {
            let Some((idx, endpoint)) = self.select(Utc::now()) else {
                return Err(Error::AllEndpointsUnavailable);
            };

            match call(endpoint).await {
                Ok(value) => {
                    self.record_success(idx);
                    return Ok(value);
                }
                Err(Error::RateLimited { retry_after_secs }) => {
                    self.record_rate_limit(idx, Some(retry_after_secs));
                    self.advance_from(idx);
                }
                Err(err) => {
                    self.record_failure(idx);
                    self.advance_from(idx);
                    if !matches!(err, Error::Transient(_)) {
                        return Err(err);
                    }
                }
            }
        }

        Err(Error::AllEndpointsUnavailable)
    }
}

//! Endpoint type for the failover pool (spec §3, §4.D).

use chrono::{DateTime, Utc};

/// A single named (url, key) pair backing a provider. Multiple endpoints for
/// the same provider enable round-robin failover in `endpoint_pool`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
    pub credential: String,
    pub api_version: Option<String>,
    pub use_v1: bool,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            credential: credential.into(),
            api_version: None,
            use_v1: true,
            rate_limited_until: None,
            consecutive_failures: 0,
        }
    }

    /// An endpoint with `rate_limited_until > now` is not selectable (spec
    /// §3 invariant, property 4 of §8).
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.rate_limited_until {
            Some(until) => until <= now,
            None => true,
        }
    }
}

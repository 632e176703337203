//! Progress Bus (spec §4.J): a thread-safe `job_id -> callback` map. The
//! dispatcher emits events on phase transitions and page status changes;
//! the bus forwards them to whatever client is currently listening.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const CALLBACK_TTL_SECS: u64 = 3600;

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenSummary {
    pub chunking_total_tokens: u64,
    pub provider_prompt_tokens: u64,
    pub provider_completion_tokens: u64,
}

/// A single progress event (spec §4.J event shape). Serialized as one line
/// of the NDJSON progress stream (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: String,
    pub phase: u8,
    pub progress_percent: u8,
    pub message: String,
    pub page_id: Option<String>,
    pub page_title: Option<String>,
    pub page_status: Option<String>,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub failed_pages: u32,
    pub error: Option<String>,
    pub token_summary: Option<TokenSummary>,
}

impl ProgressEvent {
    /// A synthetic heartbeat carrying the latest known state, sent every 30s
    /// of client-facing stream inactivity (spec §4.J).
    pub fn heartbeat(job_id: impl Into<String>, status: impl Into<String>, current_page_title: Option<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: status.into(),
            phase: 0,
            progress_percent: 0,
            message: "heartbeat".to_string(),
            page_id: None,
            page_title: current_page_title,
            page_status: None,
            total_pages: 0,
            completed_pages: 0,
            failed_pages: 0,
            error: None,
            token_summary: None,
        }
    }
}

struct Registration {
    callback: ProgressCallback,
    registered_at: Instant,
}

/// Shared registry of one callback per job. Registering garbage-collects
/// any entry older than `CALLBACK_TTL_SECS`, including the caller's own
/// stale prior registration for a different job.
#[derive(Default)]
pub struct ProgressBus {
    callbacks: Mutex<HashMap<String, Registration>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { callbacks: Mutex::new(HashMap::new()) }
    }

    pub fn register_progress_callback(&self, job_id: impl Into<String>, callback: ProgressCallback) {
        let mut map = self.callbacks.lock();
        map.retain(|_, reg| reg.registered_at.elapsed() < Duration::from_secs(CALLBACK_TTL_SECS));
        map.insert(job_id.into(), Registration { callback, registered_at: Instant::now() });
    }

    pub fn unregister(&self, job_id: &str) {
        self.callbacks.lock().remove(job_id);
    }

    /// Forwards `event` to the registered callback for its job, if any. The
    /// callback runs outside the lock so a slow or panicking client handler
    /// cannot block other jobs' emissions or poison the map.
    pub fn emit(&self, event: ProgressEvent) {
        let callback = self.callbacks.lock().get(&event.job_id).map(|reg| reg.callback.clone());
        if let Some(callback) = callback {
            callback(event);
        }
    }

    pub fn is_registered(&self, job_id: &str) -> bool {
        self.callbacks.lock().contains_key(job_id)
    }
}

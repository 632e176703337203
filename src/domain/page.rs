//! Page domain type (spec §3).

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Maximum retries before a page is promoted to `permanent_failed`.
pub const MAX_PAGE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Importance {
    High,
    #[default]
    Medium,
    Low,
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("'{s}' is not a valid importance")),
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    PermanentFailed,
}

impl FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "permanent_failed" => Ok(Self::PermanentFailed),
            _ => Err(format!("'{s}' is not a valid page status")),
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PermanentFailed => "permanent_failed",
        };
        write!(f, "{s}")
    }
}

/// One wiki page within a job.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub job_id: String,
    pub page_id: String,
    pub title: String,
    pub description: Option<String>,
    pub importance: Importance,
    pub file_paths: Vec<String>,
    pub related_pages: Vec<String>,
    pub parent_section: Option<String>,

    pub status: PageStatus,
    pub content: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub tokens_used: u64,
    pub generation_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Page {
    /// Next status after a failed generation attempt, per the retry_count
    /// invariant of spec §3.
    pub fn status_after_failure(retry_count: u32) -> PageStatus {
        if retry_count >= MAX_PAGE_RETRIES {
            PageStatus::PermanentFailed
        } else {
            PageStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_to_permanent_failed_at_retry_ceiling() {
        assert_eq!(Page::status_after_failure(3), PageStatus::PermanentFailed);
        assert_eq!(Page::status_after_failure(2), PageStatus::Failed);
    }
}

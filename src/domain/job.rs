//! Job domain type and its status lattice (spec §3).

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Source hosting provider for the repository under documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoType {
    Github,
    Gitlab,
    Bitbucket,
    Azuredevops,
}

impl FromStr for RepoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "bitbucket" => Ok(Self::Bitbucket),
            "azuredevops" => Ok(Self::Azuredevops),
            _ => Err(format!("'{s}' is not a valid repo_type")),
        }
    }
}

impl std::fmt::Display for RepoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Azuredevops => "azuredevops",
        };
        write!(f, "{s}")
    }
}

/// Job status lattice (spec §3). Non-terminal statuses participate in the
/// idempotent-creation check; terminal statuses free the `(owner, repo,
/// language, provider, model)` tuple for a fresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    PreparingEmbeddings,
    GeneratingStructure,
    GeneratingPages,
    Paused,
    Cancelled,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Completed | Self::PartiallyCompleted | Self::Failed
        )
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::PreparingEmbeddings
                | Self::GeneratingStructure
                | Self::GeneratingPages
        )
    }

    /// Whether `self -> to` is a legal state-machine move per spec §3.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            // Forward phase progression.
            (Pending, PreparingEmbeddings)
            | (PreparingEmbeddings, GeneratingStructure)
            | (GeneratingStructure, GeneratingPages)
            | (GeneratingPages, Completed)
            | (GeneratingPages, PartiallyCompleted) => true,
            // Any active phase can pause, cancel, or fail.
            (s, Paused | Cancelled | Failed) if s.is_active() => true,
            // Resume returns to the phase it paused from (caller supplies `to`).
            (Paused, PreparingEmbeddings | GeneratingStructure | GeneratingPages) => true,
            // Retry re-enters page generation from a terminal state.
            (Failed | Completed | PartiallyCompleted, GeneratingPages) => true,
            _ => false,
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "preparing_embeddings" => Ok(Self::PreparingEmbeddings),
            "generating_structure" => Ok(Self::GeneratingStructure),
            "generating_pages" => Ok(Self::GeneratingPages),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "partially_completed" => Ok(Self::PartiallyCompleted),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("'{s}' is not a valid job status")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::PreparingEmbeddings => "preparing_embeddings",
            Self::GeneratingStructure => "generating_structure",
            Self::GeneratingPages => "generating_pages",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Filter lists narrowing which repo files participate in chunking (spec §3).
#[derive(Debug, Clone, Default)]
pub struct PathFilters {
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
    pub included_dirs: Vec<String>,
    pub included_files: Vec<String>,
}

/// A unit of work for a single (repo, model, language) triple.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub repo_url: String,
    pub repo_type: RepoType,
    pub owner: String,
    pub repo: String,
    pub access_token: Option<String>,
    pub filters: PathFilters,
    pub provider: String,
    pub model: Option<String>,
    pub language: String,
    pub is_comprehensive: bool,
    pub client_id: Option<String>,

    pub status: JobStatus,
    pub current_phase: u8,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub failed_pages: u32,
    pub total_tokens_used: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub wiki_structure: Option<String>,
}

impl Job {
    /// The tuple the idempotent-creation invariant is keyed on (spec §3).
    pub fn identity_key(
        owner: &str,
        repo: &str,
        language: &str,
        provider: &str,
        model: Option<&str>,
    ) -> String {
        format!("{owner}/{repo}#{language}#{provider}#{}", model.unwrap_or(""))
    }
}

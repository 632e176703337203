//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type. Variants correspond to the error taxonomy
/// kinds (not provider-specific types) so that every failure surface maps to
/// exactly one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state transition: cannot transition {entity} {id} from {from} to {to}")]
    IllegalState {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Context length exceeded: {0}")]
    ContextLimit(String),

    #[error("Terminal provider error: {0}")]
    TerminalProvider(String),

    #[error("All endpoints unavailable")]
    AllEndpointsUnavailable,

    #[error("Wiki structure generation failed after retries: {0}")]
    StructureGenerationFailed(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn illegal_state(
        entity: &'static str,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::IllegalState {
            entity,
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Classify a raw completion-error message into the taxonomy of §7.
    /// Used by the provider registry to decide whether to retry, fail over,
    /// or escalate.
    pub fn classify_completion_message(msg: &str) -> Self {
        let lower = msg.to_ascii_lowercase();
        const CONTEXT_MARKERS: &[&str] = &[
            "maximum context length",
            "token limit",
            "too many tokens",
            "context length exceeded",
        ];
        if CONTEXT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::ContextLimit(msg.to_string());
        }
        if lower.contains("rate limit") || lower.contains("429") {
            return Self::RateLimited { retry_after_secs: 60 };
        }
        if lower.contains("unauthorized")
            || lower.contains("authentication")
            || lower.contains("permission")
            || lower.contains("unsupported model")
        {
            return Self::TerminalProvider(msg.to_string());
        }
        Self::Transient(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_context_limit_messages() {
        let err = Error::classify_completion_message("Error: maximum context length exceeded");
        assert!(matches!(err, Error::ContextLimit(_)));
    }

    #[test]
    fn classifies_terminal_auth_errors() {
        let err = Error::classify_completion_message("401 Unauthorized: invalid api key");
        assert!(matches!(err, Error::TerminalProvider(_)));
    }

    #[test]
    fn falls_back_to_transient() {
        let err = Error::classify_completion_message("connection reset by peer");
        assert!(matches!(err, Error::Transient(_)));
    }
}

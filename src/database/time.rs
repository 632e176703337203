//! Timestamp helpers for the database layer.
//!
//! We store timestamps as RFC3339 UTC strings with second precision (spec
//! §4.A), not epoch integers — string timestamps sort correctly in SQLite
//! and are human-readable when inspecting the store directly.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Current time formatted for storage.
pub fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a `DateTime<Utc>` for storage.
pub fn to_string(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored RFC3339 string back into a `DateTime<Utc>`.
pub fn parse(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("invalid timestamp '{s}': {e}")))
}

/// Parse an optional stored timestamp.
pub fn parse_opt(s: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let now = Utc::now();
        let stored = to_string(now);
        let parsed = parse(&stored).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}

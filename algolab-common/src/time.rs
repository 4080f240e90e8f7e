//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp the way every table stores it (RFC 3339)
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse an RFC 3339 column value back to UTC
pub fn from_db(column: &str, value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse an optional RFC 3339 column value
pub fn from_db_opt(column: &str, value: Option<String>) -> crate::Result<Option<DateTime<Utc>>> {
    value.map(|v| from_db(column, &v)).transpose()
}

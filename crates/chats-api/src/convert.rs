//! Row-to-wire conversions shared by the handlers.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use chats_types::ValidationError;

/// How the store writes timestamps; text comparison on this form is time order.
const STORED_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, what: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand may use SQLite's "YYYY-MM-DD HH:MM:SS" form.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, raw, e);
            DateTime::default()
        })
}

/// An RFC 3339 timestamp from the client, rewritten in the stored form so it
/// can be compared against timestamp columns.
pub(crate) fn stored_timestamp(raw: &str, field: &'static str) -> Result<String, ValidationError> {
    raw.parse::<DateTime<Utc>>()
        .map(|ts| ts.format(STORED_TIMESTAMP).to_string())
        .map_err(|_| ValidationError::new(field, "Enter a valid RFC 3339 timestamp."))
}

/// Blank optional input means "no value".
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

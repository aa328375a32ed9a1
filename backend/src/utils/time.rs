use chrono::{DateTime, NaiveDateTime, Utc};

/// Renders a UTC timestamp column as RFC 3339.
pub fn to_iso(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

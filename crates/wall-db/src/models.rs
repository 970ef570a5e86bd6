/// Database row types. These map directly to SQLite rows.
/// Distinct from wall-types API models to keep the DB layer independent.
use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width UTC timestamp format. Fixed width keeps lexicographic order
/// equal to chronological order, which the keyset comparisons rely on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|ndt| ndt.and_utc())
}

pub struct EventRow {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub text: String,
    pub sender_name: Option<String>,
    pub created_at: String,
    pub pinned: bool,
    pub images: Vec<String>,
}

/// Input for [`crate::Database::insert_message`].
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub channel_id: &'a str,
    pub text: &'a str,
    pub sender_name: Option<&'a str>,
    pub image_keys: &'a [String],
    pub created_at: DateTime<Utc>,
}

//! Persisted document projection and its timestamp encoding.
//!
//! The engine stores every field as text. `Modified` and `Indexed` are
//! base-10 seconds since the Unix epoch so they stay sortable and
//! filterable engine-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine field holding the logical document key.
pub const FIELD_PATH: &str = "Path";
/// Engine field holding the extracted title.
pub const FIELD_TITLE: &str = "Title";
/// Engine field holding the sanitized body text.
pub const FIELD_BODY: &str = "Body";
/// Engine field holding the source modification time.
pub const FIELD_MODIFIED: &str = "Modified";
/// Engine field holding the time the document was persisted.
pub const FIELD_INDEXED: &str = "Indexed";

/// The persisted projection of a [`Record`](crate::record::Record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub path: String,
    pub title: String,
    pub body: String,
    pub modified: String,
    pub indexed: String,
}

impl IndexDocument {
    /// Decoded `modified`; unparsable values decode to the epoch.
    pub fn modified_at(&self) -> DateTime<Utc> {
        decode_timestamp(&self.modified)
    }

    /// Decoded `indexed`; unparsable values decode to the epoch.
    pub fn indexed_at(&self) -> DateTime<Utc> {
        decode_timestamp(&self.indexed)
    }
}

/// Encodes a timestamp as decimal seconds since the epoch.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.timestamp().to_string()
}

/// Decodes decimal seconds since the epoch. Anything unparsable decodes
/// to the epoch.
pub fn decode_timestamp(raw: &str) -> DateTime<Utc> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

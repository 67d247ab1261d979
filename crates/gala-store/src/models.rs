//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A guest's chosen display name.  At most one per identity, keyed by the
/// opaque principal id from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Identity that owns this profile.
    pub owner_id: String,
    /// Name shown on this guest's posts and comments.  Never empty once set.
    pub display_name: String,
    /// When the profile was first created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// A single feed post.  Content and photo keys are immutable after
/// creation; only the pin/announcement flags can change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Unique post identifier.
    pub id: Uuid,
    /// Identity that created the post.
    pub owner_id: String,
    /// Display name of the author, snapshotted at post time.  Later name
    /// changes do not rewrite old posts.
    pub author_name: String,
    /// Post text.  May be empty only when at least one photo key is present.
    pub content: String,
    /// Object-store keys of attached photos, in upload order.
    pub photo_keys: Vec<String>,
    /// Announcement posts auto-pin at creation.
    pub is_announcement: bool,
    /// Pinned posts sort ahead of everything else regardless of recency.
    pub is_pinned: bool,
    /// When the post was created.  Creation-immutable.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// A comment on a post.  Never updated in place; only created and deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    /// Unique comment identifier.
    pub id: Uuid,
    /// The post this comment belongs to.
    pub post_id: Uuid,
    /// Identity that wrote the comment.
    pub owner_id: String,
    /// Display name snapshot, as for posts.
    pub author_name: String,
    /// Comment text.  Never empty.
    pub content: String,
    /// When the comment was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a listing plus the cursor for the next page, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more rows exist past this page.
    pub next: Option<Cursor>,
}

/// Opaque keyset-pagination cursor.
///
/// Internally it is the full sort key of the last row of the previous page:
/// `(is_pinned, created_at, rowid)` for the feed, `(created_at, rowid)` for
/// comment threads.  The rowid component makes the order total and stable
/// even when two records carry the same wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    /// Pin flag of the boundary row.  Only set for feed cursors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) pinned: Option<bool>,
    /// Timestamp of the boundary row, in the store's fixed-width encoding.
    pub(crate) created_at: String,
    /// SQLite rowid of the boundary row.
    pub(crate) rowid: i64,
}

impl Cursor {
    /// Encode to the opaque string handed to clients.
    pub fn encode(&self) -> String {
        // Serialization of this struct cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a client-supplied cursor.  Tampered or truncated input is a
    /// validation error, not a panic.
    pub fn decode(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| StoreError::Validation("malformed cursor".into()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| StoreError::Validation("malformed cursor".into()))
    }
}

// ---------------------------------------------------------------------------
// Timestamp encoding
// ---------------------------------------------------------------------------

/// Encode a timestamp for storage.  Fixed-width (microseconds, `Z` suffix)
/// so that lexicographic comparison in SQL matches chronological order.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into a `DateTime<Utc>`.
pub(crate) fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let c = Cursor {
            pinned: Some(true),
            created_at: encode_ts(Utc::now()),
            rowid: 42,
        };
        let decoded = Cursor::decode(&c.encode()).unwrap();
        assert_eq!(c, decoded);
    }

    #[test]
    fn cursor_rejects_garbage() {
        assert!(matches!(
            Cursor::decode("not a cursor!!"),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            Cursor::decode(&URL_SAFE_NO_PAD.encode(b"{\"nope\":1}")),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);
        assert!(encode_ts(early) < encode_ts(late));
    }
}

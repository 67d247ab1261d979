//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `profiles`, `posts`, and `comments`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    owner_id     TEXT PRIMARY KEY NOT NULL,   -- opaque identity-provider id
    display_name TEXT NOT NULL,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Posts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS posts (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    owner_id        TEXT NOT NULL,
    author_name     TEXT NOT NULL,              -- display-name snapshot
    content         TEXT NOT NULL,              -- may be '' when photos exist
    photo_keys      TEXT NOT NULL,              -- JSON array of object-store keys
    is_announcement INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    is_pinned       INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    created_at      TEXT NOT NULL
);

-- Matches the feed order: pinned first, then newest first.
CREATE INDEX IF NOT EXISTS idx_posts_feed
    ON posts(is_pinned DESC, created_at DESC);

-- ----------------------------------------------------------------
-- Comments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS comments (
    id          TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    post_id     TEXT NOT NULL,                  -- FK -> posts(id)
    owner_id    TEXT NOT NULL,
    author_name TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_post_ts
    ON comments(post_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

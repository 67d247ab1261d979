//! Comment repository: per-post threads.
//!
//! Threads list oldest-first (the inverse of the feed), ties broken by
//! insertion order.  Comments are never edited, only created and deleted.

use chrono::Utc;
use gala_shared::Identity;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{encode_ts, parse_ts, Comment, Cursor, Page};
use crate::policy::{authorize, Operation, ResourceKind};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Add a comment to an existing post.
    ///
    /// Same preconditions as posting: a saved display name (snapshotted as
    /// the author name) and non-empty trimmed content.  The target post
    /// must exist.
    pub fn create_comment(
        &self,
        caller: &Identity,
        post_id: Uuid,
        content: &str,
    ) -> Result<Comment> {
        let profile = self
            .get_profile(&caller.id)?
            .ok_or(StoreError::ProfileRequired)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Validation("comment must not be empty".into()));
        }

        // The foreign key would catch this too, but a typed NotFound beats
        // a constraint violation surfaced to the caller.
        let post_exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
            params![post_id.to_string()],
            |row| row.get(0),
        )?;
        if !post_exists {
            return Err(StoreError::NotFound);
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            owner_id: caller.id.clone(),
            author_name: profile.display_name,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO comments (id, post_id, owner_id, author_name, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id.to_string(),
                comment.post_id.to_string(),
                comment.owner_id,
                comment.author_name,
                comment.content,
                encode_ts(comment.created_at),
            ],
        )?;

        tracing::debug!(id = %comment.id, post = %post_id, "created comment");
        Ok(comment)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// List one page of a post's thread, oldest first.
    ///
    /// An unknown post id yields an empty page; the thread view resolves
    /// the post itself first and 404s there.
    pub fn list_comments(
        &self,
        post_id: Uuid,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<Page<Comment>> {
        let fetch = i64::from(limit) + 1;

        let mut rows: Vec<(Comment, i64)> = match cursor {
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {COMMENT_COLUMNS}, rowid FROM comments
                     WHERE post_id = ?1
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?2"
                ))?;
                let mapped =
                    stmt.query_map(params![post_id.to_string(), fetch], row_to_comment_with_rowid)?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
            Some(c) => {
                if c.pinned.is_some() {
                    return Err(StoreError::Validation(
                        "cursor does not belong to this listing".into(),
                    ));
                }
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {COMMENT_COLUMNS}, rowid FROM comments
                     WHERE post_id = ?1 AND (created_at, rowid) > (?2, ?3)
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?4"
                ))?;
                let mapped = stmt.query_map(
                    params![post_id.to_string(), c.created_at, c.rowid, fetch],
                    row_to_comment_with_rowid,
                )?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
        };

        let next = if rows.len() > limit as usize {
            rows.truncate(limit as usize);
            rows.last().map(|(comment, rowid)| Cursor {
                pinned: None,
                created_at: encode_ts(comment.created_at),
                rowid: *rowid,
            })
        } else {
            None
        };

        Ok(Page {
            items: rows.into_iter().map(|(comment, _)| comment).collect(),
            next,
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a comment.  Permitted for the comment's owner or an admin.
    pub fn delete_comment(&self, caller: &Identity, id: Uuid) -> Result<()> {
        let owner_id: String = self
            .conn()
            .query_row(
                "SELECT owner_id FROM comments WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        if !authorize(ResourceKind::Comment, Operation::Delete, &owner_id, caller).is_allowed() {
            return Err(StoreError::Forbidden);
        }

        self.conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![id.to_string()])?;

        tracing::debug!(id = %id, caller = %caller.id, "deleted comment");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const COMMENT_COLUMNS: &str = "id, post_id, owner_id, author_name, content, created_at";

/// Map a `rusqlite::Row` to a [`Comment`] plus its rowid.
fn row_to_comment_with_rowid(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Comment, i64)> {
    let id_str: String = row.get(0)?;
    let post_id_str: String = row.get(1)?;
    let owner_id: String = row.get(2)?;
    let author_name: String = row.get(3)?;
    let content: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let rowid: i64 = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let post_id = Uuid::parse_str(&post_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = parse_ts(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok((
        Comment {
            id,
            post_id,
            owner_id,
            author_name,
            content,
            created_at,
        },
        rowid,
    ))
}

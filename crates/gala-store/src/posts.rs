//! Post repository: the ordered, access-controlled feed collection.
//!
//! Feed order is a total order recomputed on every read, never a persisted
//! sort key: pinned posts first, then newest first, with the SQLite rowid as
//! a stable tiebreaker so near-simultaneous timestamps (clock skew between
//! writers) still list deterministically in reverse insertion order.

use chrono::Utc;
use gala_shared::Identity;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{encode_ts, parse_ts, Cursor, Page, Post};
use crate::policy::{authorize, Operation, ResourceKind};

/// Input for [`Database::create_post`].
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub content: String,
    /// Object-store keys of already-uploaded photos, in display order.
    pub photo_keys: Vec<String>,
    /// Request announcement treatment.  Honored only for admin callers.
    pub is_announcement: bool,
}

/// Patch for [`Database::update_post_flags`].  These two flags are the only
/// mutable fields of a post; content and photos are creation-immutable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostPatch {
    pub is_pinned: Option<bool>,
    pub is_announcement: Option<bool>,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a post owned by the caller.
    ///
    /// Requires a saved display name (the author name is snapshotted from
    /// it at call time).  A post must carry text or at least one photo.
    /// Announcements auto-pin; a non-admin asking for an announcement gets
    /// a plain post instead.
    pub fn create_post(&self, caller: &Identity, new: NewPost) -> Result<Post> {
        let profile = self
            .get_profile(&caller.id)?
            .ok_or(StoreError::ProfileRequired)?;

        let content = new.content.trim().to_string();
        if content.is_empty() && new.photo_keys.is_empty() {
            return Err(StoreError::Validation(
                "a post needs text or at least one photo".into(),
            ));
        }

        let is_announcement = new.is_announcement && caller.is_admin();
        let post = Post {
            id: Uuid::new_v4(),
            owner_id: caller.id.clone(),
            author_name: profile.display_name,
            content,
            photo_keys: new.photo_keys,
            is_announcement,
            // Announcements always start pinned.
            is_pinned: is_announcement,
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO posts (id, owner_id, author_name, content, photo_keys,
                                is_announcement, is_pinned, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                post.id.to_string(),
                post.owner_id,
                post.author_name,
                post.content,
                serde_json::to_string(&post.photo_keys)?,
                post.is_announcement as i32,
                post.is_pinned as i32,
                encode_ts(post.created_at),
            ],
        )?;

        tracing::debug!(id = %post.id, owner = %post.owner_id, "created post");
        Ok(post)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single post by id.
    pub fn get_post(&self, id: Uuid) -> Result<Post> {
        self.conn()
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id.to_string()],
                row_to_post,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List one page of the feed: pinned posts first, then descending
    /// `created_at`, ties broken by reverse insertion order.
    ///
    /// `cursor` is the opaque token returned with the previous page; `None`
    /// starts from the top.  The page carries a next-cursor while more rows
    /// exist.
    pub fn list_posts(&self, cursor: Option<&Cursor>, limit: u32) -> Result<Page<Post>> {
        // Fetch one extra row to learn whether another page exists.
        let fetch = i64::from(limit) + 1;

        let mut rows: Vec<(Post, i64, bool)> = match cursor {
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {POST_COLUMNS}, rowid FROM posts
                     ORDER BY is_pinned DESC, created_at DESC, rowid DESC
                     LIMIT ?1"
                ))?;
                let mapped = stmt.query_map(params![fetch], row_to_post_with_rowid)?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
            Some(c) => {
                // A feed cursor is the full sort key of the boundary row;
                // every component descends, so "after the boundary" is a
                // plain row-value comparison.
                let pinned = c.pinned.ok_or_else(|| {
                    StoreError::Validation("cursor does not belong to this listing".into())
                })?;
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {POST_COLUMNS}, rowid FROM posts
                     WHERE (is_pinned, created_at, rowid) < (?1, ?2, ?3)
                     ORDER BY is_pinned DESC, created_at DESC, rowid DESC
                     LIMIT ?4"
                ))?;
                let mapped = stmt.query_map(
                    params![pinned as i32, c.created_at, c.rowid, fetch],
                    row_to_post_with_rowid,
                )?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
        };

        let next = if rows.len() > limit as usize {
            rows.truncate(limit as usize);
            rows.last().map(|(post, rowid, pinned)| Cursor {
                pinned: Some(*pinned),
                created_at: encode_ts(post.created_at),
                rowid: *rowid,
            })
        } else {
            None
        };

        Ok(Page {
            items: rows.into_iter().map(|(post, _, _)| post).collect(),
            next,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Update the pin/announcement flags of a post.  Permitted for the
    /// post's owner or an admin; the policy is evaluated against the owner
    /// as currently stored.
    pub fn update_post_flags(
        &self,
        caller: &Identity,
        id: Uuid,
        patch: PostPatch,
    ) -> Result<Post> {
        let post = self.get_post(id)?;

        if !authorize(ResourceKind::Post, Operation::Update, &post.owner_id, caller).is_allowed() {
            return Err(StoreError::Forbidden);
        }

        let is_pinned = patch.is_pinned.unwrap_or(post.is_pinned);
        let is_announcement = patch.is_announcement.unwrap_or(post.is_announcement);

        self.conn().execute(
            "UPDATE posts SET is_pinned = ?1, is_announcement = ?2 WHERE id = ?3",
            params![is_pinned as i32, is_announcement as i32, id.to_string()],
        )?;

        Ok(Post {
            is_pinned,
            is_announcement,
            ..post
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a post.  Permitted for the owner or an admin.  Comments go
    /// with it (foreign key cascade); stored photo objects are not touched.
    pub fn delete_post(&self, caller: &Identity, id: Uuid) -> Result<()> {
        let owner_id: String = self
            .conn()
            .query_row(
                "SELECT owner_id FROM posts WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        if !authorize(ResourceKind::Post, Operation::Delete, &owner_id, caller).is_allowed() {
            return Err(StoreError::Forbidden);
        }

        self.conn()
            .execute("DELETE FROM posts WHERE id = ?1", params![id.to_string()])?;

        tracing::debug!(id = %id, caller = %caller.id, "deleted post");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const POST_COLUMNS: &str =
    "id, owner_id, author_name, content, photo_keys, is_announcement, is_pinned, created_at";

/// Map a `rusqlite::Row` to a [`Post`].
fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let id_str: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let author_name: String = row.get(2)?;
    let content: String = row.get(3)?;
    let photo_keys_json: String = row.get(4)?;
    let is_announcement_int: i32 = row.get(5)?;
    let is_pinned_int: i32 = row.get(6)?;
    let created_str: String = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let photo_keys: Vec<String> = serde_json::from_str(&photo_keys_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = parse_ts(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Post {
        id,
        owner_id,
        author_name,
        content,
        photo_keys,
        is_announcement: is_announcement_int != 0,
        is_pinned: is_pinned_int != 0,
        created_at,
    })
}

/// Like [`row_to_post`] but also yields the rowid and raw pin flag that form
/// the pagination cursor.
fn row_to_post_with_rowid(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Post, i64, bool)> {
    let post = row_to_post(row)?;
    let rowid: i64 = row.get(8)?;
    let pinned = post.is_pinned;
    Ok((post, rowid, pinned))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn named(db: &Database, id: &str, name: &str) -> Identity {
        let identity = Identity::guest(id);
        db.upsert_profile(&identity, name).unwrap();
        identity
    }

    fn named_admin(db: &Database, id: &str, name: &str) -> Identity {
        let identity = Identity::admin(id);
        db.upsert_profile(&identity, name).unwrap();
        identity
    }

    fn text_post(db: &Database, author: &Identity, content: &str) -> Post {
        db.create_post(
            author,
            NewPost {
                content: content.into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn create_requires_profile() {
        let (db, _dir) = test_db();
        let nameless = Identity::guest("nameless");

        let err = db
            .create_post(
                &nameless,
                NewPost {
                    content: "hello".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ProfileRequired));
    }

    #[test]
    fn post_needs_text_or_photo() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        assert!(matches!(
            db.create_post(&alice, NewPost::default()),
            Err(StoreError::Validation(_))
        ));

        // Empty content with a photo is fine.
        let post = db
            .create_post(
                &alice,
                NewPost {
                    photo_keys: vec!["photos/abc".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(post.content.is_empty());
        assert_eq!(post.photo_keys, vec!["photos/abc"]);
    }

    #[test]
    fn author_name_is_a_snapshot() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        let post = text_post(&db, &alice, "hello");
        assert_eq!(post.author_name, "Alice");
        assert!(!post.is_pinned);

        // Renaming does not rewrite old posts.
        db.upsert_profile(&alice, "Alicia").unwrap();
        assert_eq!(db.get_post(post.id).unwrap().author_name, "Alice");
    }

    #[test]
    fn admin_announcement_auto_pins() {
        let (db, _dir) = test_db();
        let admin = named_admin(&db, "host", "The Hosts");

        let post = db
            .create_post(
                &admin,
                NewPost {
                    content: "save the date".into(),
                    is_announcement: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(post.is_announcement);
        assert!(post.is_pinned);
    }

    #[test]
    fn guest_announcement_becomes_plain_post() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        let post = db
            .create_post(
                &alice,
                NewPost {
                    content: "me too".into(),
                    is_announcement: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!post.is_announcement);
        assert!(!post.is_pinned);
    }

    #[test]
    fn feed_lists_newest_first() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        let p1 = text_post(&db, &alice, "first");
        let p2 = text_post(&db, &alice, "second");

        let page = db.list_posts(None, 10).unwrap();
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![p2.id, p1.id]);
        assert!(page.next.is_none());
    }

    #[test]
    fn pinned_posts_lead_the_feed() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        let oldest = text_post(&db, &alice, "oldest");
        let _middle = text_post(&db, &alice, "middle");
        let _newest = text_post(&db, &alice, "newest");

        db.update_post_flags(
            &alice,
            oldest.id,
            PostPatch {
                is_pinned: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let page = db.list_posts(None, 10).unwrap();
        assert_eq!(page.items[0].id, oldest.id);
        // Every pinned post sorts before every unpinned one.
        let first_unpinned = page.items.iter().position(|p| !p.is_pinned).unwrap();
        assert!(page.items[..first_unpinned].iter().all(|p| p.is_pinned));
        // Within the unpinned partition, timestamps never increase.
        let unpinned = &page.items[first_unpinned..];
        assert!(unpinned.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn equal_timestamps_list_in_reverse_insertion_order() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");

        let p1 = text_post(&db, &alice, "first");
        let p2 = text_post(&db, &alice, "second");
        let p3 = text_post(&db, &alice, "third");

        // Simulate clock skew: all three created in the same instant.
        db.conn()
            .execute("UPDATE posts SET created_at = ?1", params![encode_ts(Utc::now())])
            .unwrap();

        let page = db.list_posts(None, 10).unwrap();
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![p3.id, p2.id, p1.id]);
    }

    #[test]
    fn pagination_walks_the_whole_feed_in_order() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");
        let admin = named_admin(&db, "host", "The Hosts");

        for i in 0..5 {
            text_post(&db, &alice, &format!("post {i}"));
        }
        // Two pinned announcements straddling a page boundary.
        for i in 0..2 {
            db.create_post(
                &admin,
                NewPost {
                    content: format!("announcement {i}"),
                    is_announcement: true,
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let all = db.list_posts(None, 100).unwrap().items;
        assert_eq!(all.len(), 7);

        let mut paged = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = db.list_posts(cursor.as_ref(), 3).unwrap();
            assert!(page.items.len() <= 3);
            paged.extend(page.items);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(paged, all);
    }

    #[test]
    fn cursor_survives_client_round_trip() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");
        for i in 0..3 {
            text_post(&db, &alice, &format!("post {i}"));
        }

        let first = db.list_posts(None, 2).unwrap();
        let token = first.next.unwrap().encode();

        let decoded = Cursor::decode(&token).unwrap();
        let rest = db.list_posts(Some(&decoded), 2).unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(rest.next.is_none());
    }

    #[test]
    fn thread_cursor_rejected_on_feed() {
        let (db, _dir) = test_db();
        let foreign = Cursor {
            pinned: None,
            created_at: encode_ts(Utc::now()),
            rowid: 1,
        };
        assert!(matches!(
            db.list_posts(Some(&foreign), 10),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn flag_update_is_owner_or_admin_only() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");
        let bob = named(&db, "bob", "Bob");
        let admin = named_admin(&db, "host", "The Hosts");

        let post = text_post(&db, &alice, "mine");
        let pin = PostPatch {
            is_pinned: Some(true),
            ..Default::default()
        };

        assert!(matches!(
            db.update_post_flags(&bob, post.id, pin),
            Err(StoreError::Forbidden)
        ));

        let pinned = db.update_post_flags(&admin, post.id, pin).unwrap();
        assert!(pinned.is_pinned);

        let unpinned = db
            .update_post_flags(
                &alice,
                post.id,
                PostPatch {
                    is_pinned: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!unpinned.is_pinned);
    }

    #[test]
    fn update_missing_post_is_not_found() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");
        assert!(matches!(
            db.update_post_flags(&alice, Uuid::new_v4(), PostPatch::default()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_is_owner_or_admin_only() {
        let (db, _dir) = test_db();
        let alice = named(&db, "alice", "Alice");
        let bob = named(&db, "bob", "Bob");
        let admin = named_admin(&db, "host", "The Hosts");

        let post = text_post(&db, &alice, "mine");

        // A stranger cannot delete it, and the post stays listed.
        assert!(matches!(
            db.delete_post(&bob, post.id),
            Err(StoreError::Forbidden)
        ));
        assert!(db.list_posts(None, 10).unwrap().items.iter().any(|p| p.id == post.id));

        db.delete_post(&alice, post.id).unwrap();
        assert!(matches!(db.get_post(post.id), Err(StoreError::NotFound)));

        let other = text_post(&db, &alice, "also mine");
        db.delete_post(&admin, other.id).unwrap();
        assert!(matches!(db.delete_post(&admin, other.id), Err(StoreError::NotFound)));
    }
}

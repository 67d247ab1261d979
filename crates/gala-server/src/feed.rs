//! Feed assembly.
//!
//! Joins post listings with photo-URL resolution to produce the view the
//! client renders.  Photo resolution is fail-soft: one missing object
//! degrades that single image to absent instead of failing the listing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gala_store::{Comment, Cursor, Database, Post};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ApiError;
use crate::photo_store::PhotoStore;

/// A photo key with its resolved time-limited URL, or `None` when the
/// object could not be resolved.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedPhoto {
    pub key: String,
    pub url: Option<String>,
}

/// A post as the client sees it: record fields plus resolved photos.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub owner_id: String,
    pub author_name: String,
    pub content: String,
    pub is_announcement: bool,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub photos: Vec<ResolvedPhoto>,
}

/// One page of the assembled feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub posts: Vec<PostView>,
    /// Opaque cursor for the next page, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Single-post thread view: the post, its photos, and its comments
/// oldest-first.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub post: PostView,
    pub comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_next: Option<String>,
}

/// Combines the post repository with the photo store.
pub struct FeedService {
    db: Arc<Mutex<Database>>,
    photos: Arc<PhotoStore>,
}

impl FeedService {
    pub fn new(db: Arc<Mutex<Database>>, photos: Arc<PhotoStore>) -> Self {
        Self { db, photos }
    }

    /// Assemble one page of the feed, preserving repository order.
    pub async fn feed(&self, cursor: Option<&str>, limit: u32) -> Result<FeedPage, ApiError> {
        let cursor = decode_cursor(cursor)?;
        let page = {
            let db = self.db.lock().await;
            db.list_posts(cursor.as_ref(), limit)?
        };

        let mut posts = Vec::with_capacity(page.items.len());
        for post in page.items {
            posts.push(self.resolve(post).await);
        }

        Ok(FeedPage {
            posts,
            next: page.next.map(|c| c.encode()),
        })
    }

    /// Assemble the thread view for one post.
    pub async fn thread(
        &self,
        post_id: Uuid,
        comments_cursor: Option<&str>,
        limit: u32,
    ) -> Result<ThreadView, ApiError> {
        let cursor = decode_cursor(comments_cursor)?;
        let (post, comments) = {
            let db = self.db.lock().await;
            let post = db.get_post(post_id)?;
            let comments = db.list_comments(post_id, cursor.as_ref(), limit)?;
            (post, comments)
        };

        Ok(ThreadView {
            post: self.resolve(post).await,
            comments: comments.items,
            comments_next: comments.next.map(|c| c.encode()),
        })
    }

    /// All photos across all posts, in feed order.
    pub async fn gallery(&self) -> Result<Vec<ResolvedPhoto>, ApiError> {
        let mut keys = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = {
                let db = self.db.lock().await;
                db.list_posts(cursor.as_ref(), GALLERY_SCAN_PAGE)?
            };
            for post in &page.items {
                keys.extend(post.photo_keys.iter().cloned());
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut photos = Vec::with_capacity(keys.len());
        for key in keys {
            photos.push(self.resolve_photo(key).await);
        }
        Ok(photos)
    }

    /// Resolve a post's photo keys into time-limited URLs.
    async fn resolve(&self, post: Post) -> PostView {
        let mut photos = Vec::with_capacity(post.photo_keys.len());
        for key in &post.photo_keys {
            photos.push(self.resolve_photo(key.clone()).await);
        }

        PostView {
            id: post.id,
            owner_id: post.owner_id,
            author_name: post.author_name,
            content: post.content,
            is_announcement: post.is_announcement,
            is_pinned: post.is_pinned,
            created_at: post.created_at,
            photos,
        }
    }

    async fn resolve_photo(&self, key: String) -> ResolvedPhoto {
        match self.photos.retrieval_url(&key, Utc::now()).await {
            Ok(url) => ResolvedPhoto {
                key,
                url: Some(url),
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "photo unresolved, shown without image");
                ResolvedPhoto { key, url: None }
            }
        }
    }
}

/// Pages the gallery scan walks the repository with.
const GALLERY_SCAN_PAGE: u32 = 100;

fn decode_cursor(cursor: Option<&str>) -> Result<Option<Cursor>, ApiError> {
    cursor.map(Cursor::decode).transpose().map_err(ApiError::from)
}

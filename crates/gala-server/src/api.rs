use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, Method},
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use gala_store::posts::{NewPost, PostPatch};
use gala_store::{Comment, Database, Post, Profile};

use crate::auth::TokenRegistry;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::feed::{FeedService, ResolvedPhoto, FeedPage, ThreadView};
use crate::photo_store::PhotoStore;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub feed: Arc<FeedService>,
    pub photos: Arc<PhotoStore>,
    pub tokens: Arc<TokenRegistry>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // Leave room for multipart framing around the photo itself.
    let body_limit = state.config.max_photo_size + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/me/profile", get(get_profile))
        .route("/me/profile", put(put_profile))
        .route("/feed", get(get_feed))
        .route("/gallery", get(get_gallery))
        .route("/posts", post(create_post))
        .route("/posts/{id}", get(get_thread))
        .route("/posts/{id}", patch(patch_post))
        .route("/posts/{id}", delete(delete_post))
        .route("/posts/{id}/comments", post(create_comment))
        .route("/posts/{id}/comments", get(list_comments))
        .route("/comments/{id}", delete(delete_comment))
        .route("/photos", post(upload_photo))
        .route("/photos/{name}", get(download_photo))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct ProfileRequest {
    display_name: String,
}

#[derive(Deserialize)]
struct PostRequest {
    #[serde(default)]
    content: String,
    #[serde(default)]
    photo_keys: Vec<String>,
    #[serde(default)]
    is_announcement: bool,
}

#[derive(Deserialize)]
struct PostPatchRequest {
    is_pinned: Option<bool>,
    is_announcement: Option<bool>,
}

#[derive(Deserialize)]
struct CommentRequest {
    content: String,
}

#[derive(Deserialize)]
struct PageQuery {
    cursor: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct CommentsResponse {
    comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

#[derive(Serialize)]
struct PhotoUploadResponse {
    key: String,
}

#[derive(Serialize)]
struct GalleryResponse {
    photos: Vec<ResolvedPhoto>,
}

#[derive(Deserialize)]
struct SignedQuery {
    expires: i64,
    sig: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Profile>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    db.get_profile(&caller.id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no profile saved yet".into()))
}

async fn put_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    let profile = db.upsert_profile(&caller, &req.display_name)?;
    Ok(Json(profile))
}

async fn get_feed(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<FeedPage>, ApiError> {
    state.tokens.resolve(&headers)?;
    let limit = page_limit(&state, page.limit);
    let feed = state.feed.feed(page.cursor.as_deref(), limit).await?;
    Ok(Json(feed))
}

async fn get_gallery(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<GalleryResponse>, ApiError> {
    state.tokens.resolve(&headers)?;
    let photos = state.feed.gallery().await?;
    Ok(Json(GalleryResponse { photos }))
}

async fn create_post(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<PostRequest>,
) -> Result<Json<Post>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    let post = db.create_post(
        &caller,
        NewPost {
            content: req.content,
            photo_keys: req.photo_keys,
            is_announcement: req.is_announcement,
        },
    )?;
    info!(id = %post.id, owner = %caller.id, "post created");
    Ok(Json(post))
}

async fn get_thread(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ThreadView>, ApiError> {
    state.tokens.resolve(&headers)?;
    let limit = page_limit(&state, page.limit);
    let thread = state.feed.thread(id, page.cursor.as_deref(), limit).await?;
    Ok(Json(thread))
}

async fn patch_post(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostPatchRequest>,
) -> Result<Json<Post>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    let post = db.update_post_flags(
        &caller,
        id,
        PostPatch {
            is_pinned: req.is_pinned,
            is_announcement: req.is_announcement,
        },
    )?;
    Ok(Json(post))
}

async fn delete_post(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    db.delete_post(&caller, id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn create_comment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    let comment = db.create_comment(&caller, id, &req.content)?;
    Ok(Json(comment))
}

async fn list_comments(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CommentsResponse>, ApiError> {
    state.tokens.resolve(&headers)?;
    let limit = page_limit(&state, page.limit);

    let cursor = page
        .cursor
        .as_deref()
        .map(gala_store::Cursor::decode)
        .transpose()?;
    let db = state.db.lock().await;
    let comments = db.list_comments(id, cursor.as_ref(), limit)?;
    Ok(Json(CommentsResponse {
        comments: comments.items,
        next: comments.next.map(|c| c.encode()),
    }))
}

async fn delete_comment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;
    let db = state.db.lock().await;
    db.delete_comment(&caller, id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn upload_photo(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PhotoUploadResponse>, ApiError> {
    let caller = state.tokens.resolve(&headers)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let ext = field
                .file_name()
                .and_then(|f| f.rsplit_once('.').map(|(_, ext)| ext.to_string()));
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;

            let key = state.photos.put_photo(&data, ext.as_deref()).await?;

            info!(key = %key, size = data.len(), owner = %caller.id, "photo uploaded");
            return Ok(Json(PhotoUploadResponse { key }));
        }
    }

    Err(ApiError::BadRequest(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

/// Photo downloads are authorized by the signed URL itself; there is no
/// session check here.
async fn download_photo(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(signed): Query<SignedQuery>,
) -> Result<Vec<u8>, ApiError> {
    state
        .photos
        .verify(&name, signed.expires, &signed.sig, Utc::now())?;
    state.photos.read(&name).await
}

/// Clamp a client-requested page size to the configured default/maximum.
fn page_limit(state: &AppState, requested: Option<u32>) -> u32 {
    let max = state.config.page_size;
    requested.unwrap_or(max).clamp(1, max)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

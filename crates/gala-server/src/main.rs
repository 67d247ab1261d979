//! # gala-server
//!
//! HTTP backend for the Gala private guest feed.
//!
//! This binary provides:
//! - **Guest feed** (posts, comments, pinning) stored in SQLite, with
//!   owner/admin access control enforced on every mutation
//! - **Photo storage** on disk, served through time-limited signed URLs
//! - **REST API** (axum) consumed by the web client
//! - **Per-IP rate limiting** to protect against abuse

mod api;
mod auth;
mod config;
mod error;
mod feed;
mod photo_store;
mod rate_limit;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gala_store::Database;

use crate::api::AppState;
use crate::auth::TokenRegistry;
use crate::config::ServerConfig;
use crate::feed::FeedService;
use crate::photo_store::PhotoStore;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gala_server=debug")),
        )
        .init();

    info!("Starting Gala server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        db = %config.db_path.display(),
        photos = %config.photo_storage_path.display(),
        guests = config.guest_tokens.len(),
        admins = config.admin_tokens.len(),
        "Loaded configuration"
    );

    if config.url_signing_key == [0u8; 32] {
        tracing::warn!("URL_SIGNING_KEY not set; photo links are forgeable (dev-only)");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Database (runs migrations on open)
    let db = Arc::new(Mutex::new(Database::open_at(&config.db_path)?));

    // Photo store (creates directory if missing)
    let photos = Arc::new(
        PhotoStore::new(
            config.photo_storage_path.clone(),
            config.max_photo_size,
            config.url_signing_key,
            config.url_ttl_secs,
        )
        .await?,
    );

    // Bearer-token identity registry
    let tokens = Arc::new(TokenRegistry::from_config(&config));

    // Rate limiter: 10 req/s sustained, burst of 30
    let rate_limiter = RateLimiter::default();

    // Feed assembly joins the repositories with the photo store
    let feed = Arc::new(FeedService::new(db.clone(), photos.clone()));

    let http_addr = config.http_addr;
    let app_state = AppState {
        db,
        feed,
        photos,
        tokens,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

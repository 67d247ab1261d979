//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.  Token tables (`GUEST_TOKENS` /
//! `ADMIN_TOKENS`) stand in for the external identity provider: each entry
//! is a `token=guest-id` pair, comma separated.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Path of the SQLite database file.
    /// Env: `DB_PATH`
    /// Default: `./gala.db`
    pub db_path: PathBuf,

    /// Filesystem path where uploaded photos are stored.
    /// Env: `PHOTO_STORAGE_PATH`
    /// Default: `./photos`
    pub photo_storage_path: PathBuf,

    /// Key for signing time-limited photo retrieval URLs (hex, 64 chars).
    /// Env: `URL_SIGNING_KEY`
    /// Default: all-zeros (development only).
    pub url_signing_key: [u8; 32],

    /// How long a signed photo URL stays valid, in seconds.
    /// Env: `URL_TTL_SECS`
    /// Default: `900` (15 minutes)
    pub url_ttl_secs: u64,

    /// Maximum photo upload size in bytes.
    /// Env: `MAX_PHOTO_SIZE`
    /// Default: 10 MiB
    pub max_photo_size: usize,

    /// Default (and maximum client-requestable) page size for listings.
    /// Env: `PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,

    /// Guest bearer tokens, `token=guest-id` pairs.
    /// Env: `GUEST_TOKENS`
    pub guest_tokens: Vec<(String, String)>,

    /// Admin bearer tokens, same format.  These identities carry the admin
    /// role (pin/delete rights over all posts and comments).
    /// Env: `ADMIN_TOKENS`
    pub admin_tokens: Vec<(String, String)>,

    /// Human-readable name for this instance, shown on `/health`.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Gala"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("./gala.db"),
            photo_storage_path: PathBuf::from("./photos"),
            url_signing_key: [0u8; 32],
            url_ttl_secs: 900,
            max_photo_size: 10 * 1024 * 1024, // 10 MiB
            page_size: 50,
            guest_tokens: Vec::new(),
            admin_tokens: Vec::new(),
            instance_name: "Gala".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("PHOTO_STORAGE_PATH") {
            config.photo_storage_path = PathBuf::from(path);
        }

        if let Ok(hex_key) = std::env::var("URL_SIGNING_KEY") {
            match parse_signing_key(&hex_key) {
                Ok(key) => config.url_signing_key = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid URL_SIGNING_KEY, using default (dev-only)"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("URL_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.url_ttl_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("MAX_PHOTO_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_photo_size = n;
            }
        }

        if let Ok(val) = std::env::var("PAGE_SIZE") {
            if let Ok(n) = val.parse::<u32>() {
                config.page_size = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("GUEST_TOKENS") {
            config.guest_tokens = parse_token_table(&val);
        }

        if let Ok(val) = std::env::var("ADMIN_TOKENS") {
            config.admin_tokens = parse_token_table(&val);
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte signing key.
fn parse_signing_key(s: &str) -> Result<[u8; 32], String> {
    let s = s.trim();
    if s.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", s.len()));
    }
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Parse `token=guest-id` pairs, comma separated.  Malformed entries are
/// skipped with a warning rather than failing startup.
fn parse_token_table(s: &str) -> Vec<(String, String)> {
    s.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match entry.split_once('=') {
                Some((token, id)) if !token.trim().is_empty() && !id.trim().is_empty() => {
                    Some((token.trim().to_string(), id.trim().to_string()))
                }
                _ => {
                    tracing::warn!(entry = %entry, "Skipping malformed token entry");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.url_signing_key, [0u8; 32]);
        assert_eq!(config.url_ttl_secs, 900);
    }

    #[test]
    fn test_parse_signing_key() {
        let hex = "ab".repeat(32);
        assert_eq!(parse_signing_key(&hex).unwrap(), [0xab; 32]);
        assert!(parse_signing_key("abcd").is_err());
    }

    #[test]
    fn test_parse_token_table() {
        let parsed = parse_token_table("t1=alice, t2=bob");
        assert_eq!(
            parsed,
            vec![
                ("t1".to_string(), "alice".to_string()),
                ("t2".to_string(), "bob".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_token_table_skips_malformed() {
        let parsed = parse_token_table("good=alice,, =x, bad");
        assert_eq!(parsed, vec![("good".to_string(), "alice".to_string())]);
    }
}

//! Disk-backed photo store with time-limited retrieval URLs.
//!
//! Plays the role of the external object store: uploads go in under the
//! `photos/` key namespace, and reads happen through signed URLs that expire.
//! The signature is a keyed BLAKE3 MAC over `name|expires`, so a URL is a
//! self-contained capability; the download route needs no session.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;

/// Namespace prefix every photo key carries, an object-store addressing
/// convention shared with clients.
pub const KEY_PREFIX: &str = "photos/";

#[derive(Debug, Clone)]
pub struct PhotoStore {
    base_path: PathBuf,
    max_size: usize,
    signing_key: [u8; 32],
    url_ttl_secs: u64,
}

impl PhotoStore {
    pub async fn new(
        base_path: PathBuf,
        max_size: usize,
        signing_key: [u8; 32],
        url_ttl_secs: u64,
    ) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ApiError::DependencyUnavailable(format!(
                "Failed to create photo directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), ttl_secs = url_ttl_secs, "Photo store initialized");

        Ok(Self {
            base_path,
            max_size,
            signing_key,
            url_ttl_secs,
        })
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Store an uploaded photo and return its object key
    /// (`photos/<uuid>[.<ext>]`).  Keys are generated server-side; client
    /// file names never reach the filesystem.
    pub async fn put_photo(&self, data: &[u8], ext: Option<&str>) -> Result<String, ApiError> {
        if data.is_empty() {
            return Err(ApiError::Validation("empty photo upload".into()));
        }
        if data.len() > self.max_size {
            return Err(ApiError::Validation(format!(
                "photo too large: {} bytes (max {})",
                data.len(),
                self.max_size
            )));
        }

        let name = match sanitize_ext(ext) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.file_path(&name)?;

        fs::write(&path, data)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write photo {name}: {e}")))?;

        debug!(name = %name, size = data.len(), "Stored photo");
        Ok(format!("{KEY_PREFIX}{name}"))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Read a photo by its on-disk name (the key without the namespace).
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.file_path(name)?;

        if !path.exists() {
            return Err(ApiError::NotFound(format!("no photo '{name}'")));
        }

        fs::read(&path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to read photo {name}: {e}")))
    }

    /// Produce a time-limited retrieval URL for a stored key.
    ///
    /// A key whose object is missing yields `NotFound` (a resolvable
    /// outcome for the caller, not a crash); feed assembly treats it as
    /// "this photo is absent".
    pub async fn retrieval_url(&self, key: &str, now: DateTime<Utc>) -> Result<String, ApiError> {
        let name = key_to_name(key)?;
        let path = self.file_path(name)?;
        if !path.exists() {
            return Err(ApiError::NotFound(format!("no photo '{name}'")));
        }

        let expires = now.timestamp() + self.url_ttl_secs as i64;
        let sig = self.sign(name, expires);
        Ok(format!("/photos/{name}?expires={expires}&sig={sig}"))
    }

    /// Check a presented `(name, expires, sig)` triple against the signing
    /// key and the clock.  Constant-time signature comparison.
    pub fn verify(
        &self,
        name: &str,
        expires: i64,
        sig: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        validate_name(name)?;

        if now.timestamp() > expires {
            return Err(ApiError::Forbidden("photo link has expired".into()));
        }

        let presented =
            hex::decode(sig).map_err(|_| ApiError::Forbidden("invalid photo link".into()))?;
        let expected = self.mac(name, expires);

        if presented.len() != expected.len()
            || presented.ct_eq(expected.as_slice()).unwrap_u8() != 1
        {
            return Err(ApiError::Forbidden("invalid photo link".into()));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove a stored photo.  Not wired to post deletion: orphan cleanup
    /// is an operator action until photo retention is decided.
    #[allow(dead_code)]
    pub async fn remove(&self, key: &str) -> Result<(), ApiError> {
        let name = key_to_name(key)?;
        let path = self.file_path(name)?;

        if !path.exists() {
            return Err(ApiError::NotFound(format!("no photo '{name}'")));
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to delete photo {name}: {e}")))?;

        debug!(name = %name, "Deleted photo");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn mac(&self, name: &str, expires: i64) -> [u8; 32] {
        *blake3::keyed_hash(&self.signing_key, format!("{name}|{expires}").as_bytes()).as_bytes()
    }

    fn sign(&self, name: &str, expires: i64) -> String {
        hex::encode(self.mac(name, expires))
    }

    /// Resolve a validated name under the base directory.
    fn file_path(&self, name: &str) -> Result<PathBuf, ApiError> {
        validate_name(name)?;
        Ok(self.base_path.join(name))
    }

    #[cfg(test)]
    fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }
}

/// Strip the `photos/` namespace off a stored key.
fn key_to_name(key: &str) -> Result<&str, ApiError> {
    key.strip_prefix(KEY_PREFIX)
        .ok_or_else(|| ApiError::BadRequest(format!("photo key outside '{KEY_PREFIX}' namespace")))
}

/// Names are generated server-side, so anything outside the expected
/// alphabet is an attack, not a typo.
fn validate_name(name: &str) -> Result<(), ApiError> {
    let ok = !name.is_empty()
        && name.len() <= 128
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid photo name".into()))
    }
}

/// Keep at most 8 alphanumeric characters of a client-supplied extension.
fn sanitize_ext(ext: Option<&str>) -> Option<String> {
    let cleaned: String = ext?
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (PhotoStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PhotoStore::new(dir.path().to_path_buf(), 1024 * 1024, [7u8; 32], 900)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let (store, _dir) = test_store().await;

        let key = store.put_photo(b"jpeg-bytes", Some("jpg")).await.unwrap();
        assert!(key.starts_with(KEY_PREFIX));
        assert!(key.ends_with(".jpg"));

        let name = key_to_name(&key).unwrap();
        assert_eq!(store.read(name).await.unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_empty_and_oversized_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.put_photo(b"", None).await.is_err());

        let big = vec![0u8; 1024 * 1024 + 1];
        assert!(store.put_photo(&big, None).await.is_err());
    }

    #[tokio::test]
    async fn test_signed_url_round_trip() {
        let (store, _dir) = test_store().await;
        let key = store.put_photo(b"data", None).await.unwrap();

        let now = Utc::now();
        let url = store.retrieval_url(&key, now).await.unwrap();

        // Pull the pieces back out of the URL we produced.
        let (path, query) = url.split_once('?').unwrap();
        let name = path.strip_prefix("/photos/").unwrap();
        let mut expires = 0i64;
        let mut sig = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "sig" => sig = v.to_string(),
                _ => {}
            }
        }

        assert!(store.verify(name, expires, &sig, now).is_ok());

        // Tampered signature fails.
        let bad = format!("00{}", &sig[2..]);
        assert!(store.verify(name, expires, &bad, now).is_err());

        // Expired link fails.
        let later = now + chrono::Duration::seconds(901);
        assert!(store.verify(name, expires, &sig, later).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let (store, _dir) = test_store().await;
        let err = store
            .retrieval_url("photos/nope.jpg", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_key_outside_namespace_rejected() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.retrieval_url("backups/x", Utc::now()).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let (store, _dir) = test_store().await;
        for name in ["../etc/passwd", "a/b", "", "..", "a\\b"] {
            assert!(
                matches!(store.read(name).await, Err(ApiError::BadRequest(_))),
                "accepted {name:?}"
            );
        }
        assert!(store.base_path().exists());
    }
}

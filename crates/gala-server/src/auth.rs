//! Identity context adapter.
//!
//! Identity issuance lives outside this service; the server only maps a
//! presented bearer token to the claims (guest id + roles) the policy
//! consumes.  The registry is loaded once from configuration, so token
//! lookup never has an availability failure mode of its own.

use axum::http::HeaderMap;
use gala_shared::Identity;
use subtle::ConstantTimeEq;

use crate::config::ServerConfig;
use crate::error::ApiError;

struct TokenEntry {
    token: String,
    identity: Identity,
}

/// Maps bearer tokens to authenticated identities.
pub struct TokenRegistry {
    entries: Vec<TokenEntry>,
}

impl TokenRegistry {
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut entries = Vec::new();
        for (token, id) in &config.guest_tokens {
            entries.push(TokenEntry {
                token: token.clone(),
                identity: Identity::guest(id.clone()),
            });
        }
        for (token, id) in &config.admin_tokens {
            entries.push(TokenEntry {
                token: token.clone(),
                identity: Identity::admin(id.clone()),
            });
        }

        if entries.is_empty() {
            tracing::warn!("No guest or admin tokens configured; every request will be rejected");
        }

        Self { entries }
    }

    /// Resolve the caller's identity from the `Authorization` header.
    ///
    /// Missing, malformed, and unknown tokens are all `Unauthenticated`;
    /// the comparison is constant-time per candidate token.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        let presented = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        if presented.is_empty() {
            return Err(ApiError::Unauthenticated);
        }

        for entry in &self.entries {
            let expected = entry.token.as_bytes();
            let candidate = presented.as_bytes();
            if candidate.len() == expected.len() && candidate.ct_eq(expected).unwrap_u8() == 1 {
                return Ok(entry.identity.clone());
            }
        }

        Err(ApiError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn registry() -> TokenRegistry {
        let config = ServerConfig {
            guest_tokens: vec![("guest-secret".into(), "alice".into())],
            admin_tokens: vec![("admin-secret".into(), "host".into())],
            ..Default::default()
        };
        TokenRegistry::from_config(&config)
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn resolves_guest_and_admin() {
        let registry = registry();

        let guest = registry.resolve(&headers_with("guest-secret")).unwrap();
        assert_eq!(guest.id, "alice");
        assert!(!guest.is_admin());

        let admin = registry.resolve(&headers_with("admin-secret")).unwrap();
        assert_eq!(admin.id, "host");
        assert!(admin.is_admin());
    }

    #[test]
    fn unknown_token_is_unauthenticated() {
        assert!(matches!(
            registry().resolve(&headers_with("wrong")),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        assert!(matches!(
            registry().resolve(&HeaderMap::new()),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn bare_token_without_scheme_still_resolves() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("guest-secret"));
        assert!(registry().resolve(&headers).is_ok());
    }
}

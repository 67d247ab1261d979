use serde::{Deserialize, Serialize};

/// A privileged group membership attached to an identity.
///
/// Roles are issued by the external identity provider; this crate only
/// carries them. The only role the feed core interprets is [`Role::Admin`],
/// which grants cross-owner update/delete rights on posts and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
}

/// The authenticated principal performing an operation.
///
/// Supplied per request by the identity context; never constructed from
/// anything a caller can forge. There is no anonymous identity: code that
/// has an `Identity` in hand is talking to an authenticated guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque principal id from the identity provider.
    pub id: String,
    /// Group memberships granted by the provider.
    pub roles: Vec<Role>,
}

impl Identity {
    /// A plain guest with no elevated roles.
    pub fn guest(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    /// A guest holding the admin role.
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: vec![Role::Admin],
        }
    }

    /// Whether this identity carries the admin role.
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_flag() {
        assert!(Identity::admin("a").is_admin());
        assert!(!Identity::guest("g").is_admin());
    }
}

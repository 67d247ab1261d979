//! Authorization policy.
//!
//! One pure function deciding whether an identity may perform an operation
//! on a resource, given the record's current owner.  The repositories call
//! it on every mutating operation with the owner as stored right now;
//! decisions are never cached across calls.
//!
//! The rules, as a table over (resource kind, operation, caller-is-owner,
//! caller-is-admin):
//!
//! | resource | create          | read | update         | delete         |
//! |----------|-----------------|------|----------------|----------------|
//! | Profile  | owner only      | any  | owner only     | owner only     |
//! | Post     | any             | any  | owner or admin | owner or admin |
//! | Comment  | any             | any  | owner or admin | owner or admin |
//!
//! "any" means any authenticated identity; an unauthenticated caller never
//! reaches this function because there is no anonymous [`Identity`].

use gala_shared::Identity;

/// Resource kinds the policy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Profile,
    Post,
    Comment,
}

/// Operations the policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// Outcome of a policy evaluation.  A denial is a value, not an error;
/// the repository layer turns it into a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Decide whether `caller` may perform `op` on a `kind` record owned by
/// `owner_id`.  Pure and side-effect-free.
pub fn authorize(kind: ResourceKind, op: Operation, owner_id: &str, caller: &Identity) -> Decision {
    let is_owner = caller.id == owner_id;

    let allowed = match (kind, op) {
        // Any authenticated caller may read anything.
        (_, Operation::Read) => true,

        // Profiles are strictly personal; even admins cannot touch them.
        (ResourceKind::Profile, _) => is_owner,

        // Anyone may create a post or comment (it becomes theirs).
        (ResourceKind::Post | ResourceKind::Comment, Operation::Create) => true,

        // Owner or admin may mutate posts and comments.
        (ResourceKind::Post | ResourceKind::Comment, Operation::Update | Operation::Delete) => {
            is_owner || caller.is_admin()
        }
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Identity {
        Identity::guest("alice")
    }

    fn stranger() -> Identity {
        Identity::guest("bob")
    }

    fn admin() -> Identity {
        Identity::admin("carol")
    }

    #[test]
    fn anyone_reads_everything() {
        for kind in [ResourceKind::Profile, ResourceKind::Post, ResourceKind::Comment] {
            assert!(authorize(kind, Operation::Read, "alice", &stranger()).is_allowed());
        }
    }

    #[test]
    fn post_mutation_owner_or_admin() {
        for op in [Operation::Update, Operation::Delete] {
            assert!(authorize(ResourceKind::Post, op, "alice", &owner()).is_allowed());
            assert!(authorize(ResourceKind::Post, op, "alice", &admin()).is_allowed());
            assert!(!authorize(ResourceKind::Post, op, "alice", &stranger()).is_allowed());
        }
    }

    #[test]
    fn comment_mutation_owner_or_admin() {
        for op in [Operation::Update, Operation::Delete] {
            assert!(authorize(ResourceKind::Comment, op, "alice", &owner()).is_allowed());
            assert!(authorize(ResourceKind::Comment, op, "alice", &admin()).is_allowed());
            assert!(!authorize(ResourceKind::Comment, op, "alice", &stranger()).is_allowed());
        }
    }

    #[test]
    fn profiles_are_owner_only_even_for_admins() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            assert!(authorize(ResourceKind::Profile, op, "alice", &owner()).is_allowed());
            assert!(!authorize(ResourceKind::Profile, op, "alice", &admin()).is_allowed());
            assert!(!authorize(ResourceKind::Profile, op, "alice", &stranger()).is_allowed());
        }
    }

    #[test]
    fn anyone_creates_posts_and_comments() {
        assert!(authorize(ResourceKind::Post, Operation::Create, "bob", &stranger()).is_allowed());
        assert!(
            authorize(ResourceKind::Comment, Operation::Create, "bob", &stranger()).is_allowed()
        );
    }
}

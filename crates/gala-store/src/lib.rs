//! # gala-store
//!
//! SQLite-backed persistence for the Gala guest feed: profiles, posts, and
//! comment threads, plus the authorization policy that gates every mutation.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed, policy-checked operations for
//! every domain model.  Callers supply the authenticated [`gala_shared::Identity`]
//! on each mutating call; the policy is re-evaluated against the record's
//! current owner every time, never cached.

pub mod comments;
pub mod database;
pub mod migrations;
pub mod models;
pub mod policy;
pub mod posts;
pub mod profiles;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;

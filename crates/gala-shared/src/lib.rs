//! # gala-shared
//!
//! Types shared between the store and server crates of the Gala guest-feed
//! application.  Deliberately tiny: just the authenticated identity shape
//! that every policy decision and repository call consumes.

pub mod identity;

pub use identity::{Identity, Role};

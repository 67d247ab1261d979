//! Profile directory: one display name per identity.
//!
//! The directory only ever addresses the caller's own row (the owner key is
//! the caller's identity), so the owner-only policy rule holds by
//! construction here; there is no code path that writes another guest's
//! profile.

use chrono::Utc;
use gala_shared::Identity;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{encode_ts, parse_ts, Profile};

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch the profile for an identity, if one has been saved.
    pub fn get_profile(&self, owner_id: &str) -> Result<Option<Profile>> {
        let result = self.conn().query_row(
            "SELECT owner_id, display_name, created_at
             FROM profiles
             WHERE owner_id = ?1",
            params![owner_id],
            row_to_profile,
        );

        match result {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Create or update the caller's display name.
    ///
    /// First call creates the profile; later calls update the name in place
    /// and keep the original `created_at`.  Repeating the same name is a
    /// no-op (idempotent).  The name is trimmed; an empty result is rejected.
    pub fn upsert_profile(&self, caller: &Identity, display_name: &str) -> Result<Profile> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("display name must not be empty".into()));
        }

        self.conn().execute(
            "INSERT INTO profiles (owner_id, display_name, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET display_name = excluded.display_name",
            params![caller.id, name, encode_ts(Utc::now())],
        )?;

        tracing::debug!(owner = %caller.id, "saved display name");

        // Re-read so the returned record carries the original created_at.
        self.get_profile(&caller.id)?.ok_or(StoreError::NotFound)
    }
}

/// Map a `rusqlite::Row` to a [`Profile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let owner_id: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    let created_at = parse_ts(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Profile {
        owner_id,
        display_name,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn absent_until_saved() {
        let (db, _dir) = test_db();
        assert!(db.get_profile("alice").unwrap().is_none());
    }

    #[test]
    fn upsert_creates_then_updates() {
        let (db, _dir) = test_db();
        let alice = Identity::guest("alice");

        let created = db.upsert_profile(&alice, "Sarah + Mike").unwrap();
        assert_eq!(created.display_name, "Sarah + Mike");

        let updated = db.upsert_profile(&alice, "Sarah").unwrap();
        assert_eq!(updated.display_name, "Sarah");
        // Original creation time survives the rename.
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn upsert_is_idempotent() {
        let (db, _dir) = test_db();
        let alice = Identity::guest("alice");

        let first = db.upsert_profile(&alice, "Sarah").unwrap();
        let second = db.upsert_profile(&alice, "Sarah").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn name_is_trimmed() {
        let (db, _dir) = test_db();
        let alice = Identity::guest("alice");

        let profile = db.upsert_profile(&alice, "  Sarah  ").unwrap();
        assert_eq!(profile.display_name, "Sarah");
    }

    #[test]
    fn empty_name_rejected() {
        let (db, _dir) = test_db();
        let alice = Identity::guest("alice");

        assert!(matches!(
            db.upsert_profile(&alice, "   "),
            Err(StoreError::Validation(_))
        ));
        assert!(db.get_profile("alice").unwrap().is_none());
    }

    #[test]
    fn profiles_are_per_identity() {
        let (db, _dir) = test_db();
        db.upsert_profile(&Identity::guest("alice"), "Sarah").unwrap();
        db.upsert_profile(&Identity::guest("bob"), "Mike").unwrap();

        assert_eq!(db.get_profile("alice").unwrap().unwrap().display_name, "Sarah");
        assert_eq!(db.get_profile("bob").unwrap().unwrap().display_name, "Mike");
    }
}

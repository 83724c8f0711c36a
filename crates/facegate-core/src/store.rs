//! Persistence for the single enrolled profile.

use crate::types::EnrolledProfile;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("profile record is corrupt: {0}")]
    Corrupt(String),
}

/// Saves, loads, and deletes the one enrolled profile.
/// Absence (first run) is not an error.
pub trait ProfileStore {
    fn save(&self, profile: &EnrolledProfile) -> Result<(), StoreError>;
    fn load(&self) -> Result<Option<EnrolledProfile>, StoreError>;
    fn delete(&self) -> Result<(), StoreError>;
}

/// SQLite-backed store: a single-row table, template as a bincode BLOB.
pub struct SqliteProfileStore {
    conn: Connection,
}

impl SqliteProfileStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS profile (
                id          INTEGER PRIMARY KEY CHECK (id = 1),
                name        TEXT NOT NULL,
                enrolled_at TEXT NOT NULL,
                template    BLOB NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl ProfileStore for SqliteProfileStore {
    fn save(&self, profile: &EnrolledProfile) -> Result<(), StoreError> {
        let blob = bincode::serialize(&profile.template)
            .map_err(|e| StoreError::Corrupt(format!("template encode: {e}")))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO profile (id, name, enrolled_at, template)
             VALUES (1, ?1, ?2, ?3)",
            rusqlite::params![profile.name, profile.enrolled_at, blob],
        )?;
        Ok(())
    }

    fn load(&self) -> Result<Option<EnrolledProfile>, StoreError> {
        let row: Option<(String, String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT name, enrolled_at, template FROM profile WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((name, enrolled_at, blob)) => {
                let template = bincode::deserialize(&blob)
                    .map_err(|e| StoreError::Corrupt(format!("template decode: {e}")))?;
                Ok(Some(EnrolledProfile {
                    template,
                    name,
                    enrolled_at,
                }))
            }
        }
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM profile WHERE id = 1", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lbph::FaceTemplate;

    fn sample_profile() -> EnrolledProfile {
        EnrolledProfile {
            template: FaceTemplate {
                grid: 8,
                histograms: vec![0.25; 8 * 8 * 256],
            },
            name: "Authorized Person".into(),
            enrolled_at: "2026-01-15T09:30:00+00:00".into(),
        }
    }

    #[test]
    fn test_load_absent_is_none() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        let profile = sample_profile();
        store.save(&profile).unwrap();

        let loaded = store.load().unwrap().expect("profile should exist");
        assert_eq!(loaded.name, profile.name);
        assert_eq!(loaded.enrolled_at, profile.enrolled_at);
        assert_eq!(loaded.template.grid, profile.template.grid);
        assert_eq!(loaded.template.histograms, profile.template.histograms);
    }

    #[test]
    fn test_save_replaces_wholesale() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store.save(&sample_profile()).unwrap();

        let mut second = sample_profile();
        second.enrolled_at = "2026-02-01T12:00:00+00:00".into();
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.enrolled_at, second.enrolled_at);
    }

    #[test]
    fn test_delete_then_load_is_none() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store.save(&sample_profile()).unwrap();
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_delete_tolerates_absence() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        assert!(store.delete().is_ok());
    }

    #[test]
    fn test_corrupt_template_blob_is_an_error() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO profile (id, name, enrolled_at, template)
                 VALUES (1, 'x', 'y', ?1)",
                rusqlite::params![vec![0xDEu8, 0xAD]],
            )
            .unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }
}

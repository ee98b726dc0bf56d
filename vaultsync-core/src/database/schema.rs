//! SQLite-backed entity cache.

use super::{CachedEntity, DatabaseError, DbResult, LocalStore};
use crate::sync::models::{EntityType, SyncRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Current schema version. Incremented when the schema changes.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Entity cache stored in a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a cache at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create a new in-memory cache
    pub fn in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned("sqlite store".to_string()))
    }

    /// Initialize the cache schema
    pub fn initialize_schema(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entities (
                entity_type TEXT NOT NULL,
                id TEXT NOT NULL,
                version TEXT NOT NULL,
                payload TEXT NOT NULL,
                synced_at INTEGER NOT NULL,
                PRIMARY KEY (entity_type, id)
            );",
        )?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM cache_metadata WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match version {
            None => {
                conn.execute(
                    "INSERT INTO cache_metadata (id, version) VALUES (1, ?1)",
                    [CURRENT_SCHEMA_VERSION],
                )?;
            }
            // The cache is disposable: an unknown layout is dropped and re-synced
            Some(v) if v != CURRENT_SCHEMA_VERSION => {
                tracing::warn!("Cache schema v{} is unsupported; clearing cache", v);
                conn.execute_batch("DELETE FROM cache_entities;")?;
                conn.execute(
                    "UPDATE cache_metadata SET version = ?1 WHERE id = 1",
                    [CURRENT_SCHEMA_VERSION],
                )?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT version FROM cache_metadata WHERE id = 1", [], |row| row.get(0))?)
    }
}

fn parse_id(value: &str) -> DbResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::Corrupt(format!("Bad id {}: {}", value, e)))
}

/// `(id, version, payload, synced_at)` as stored.
type RawRow = (String, String, String, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_entity(entity_type: EntityType, raw: RawRow) -> DbResult<CachedEntity> {
    let (id, version, payload, synced_at) = raw;
    Ok(CachedEntity {
        id: parse_id(&id)?,
        entity_type,
        version,
        payload,
        synced_at: DateTime::<Utc>::from_timestamp(synced_at, 0).unwrap_or_default(),
    })
}

impl LocalStore for SqliteStore {
    fn get_revision(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT version FROM cache_entities WHERE entity_type = ?1 AND id = ?2",
                params![entity_type.as_str(), id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn upsert(&self, record: &SyncRecord) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cache_entities (entity_type, id, version, payload, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(entity_type, id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                synced_at = excluded.synced_at",
            params![
                record.entity_type.as_str(),
                record.id.to_string(),
                record.version,
                record.payload,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, entity_type: EntityType, id: Uuid) -> DbResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entities WHERE entity_type = ?1 AND id = ?2",
            params![entity_type.as_str(), id.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn list_ids(&self, entity_type: EntityType) -> DbResult<Vec<Uuid>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM cache_entities WHERE entity_type = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([entity_type.as_str()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.iter().map(|id| parse_id(id)).collect()
    }

    fn get(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<CachedEntity>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, version, payload, synced_at FROM cache_entities
                 WHERE entity_type = ?1 AND id = ?2",
                params![entity_type.as_str(), id.to_string()],
                read_row,
            )
            .optional()?;
        raw.map(|raw| into_entity(entity_type, raw)).transpose()
    }

    fn list(&self, entity_type: EntityType) -> DbResult<Vec<CachedEntity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, version, payload, synced_at FROM cache_entities
             WHERE entity_type = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([entity_type.as_str()], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(|raw| into_entity(entity_type, raw)).collect()
    }

    fn versions(&self, entity_type: EntityType) -> DbResult<HashMap<Uuid, String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, version FROM cache_entities WHERE entity_type = ?1")?;
        let rows = stmt
            .query_map([entity_type.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, version)| Ok((parse_id(&id)?, version)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();

        let conn = store.conn().unwrap();
        let table_names: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        drop(conn);

        assert!(table_names.contains(&"cache_entities".to_string()));
        assert!(table_names.contains(&"cache_metadata".to_string()));
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let id = Uuid::new_v4();

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .upsert(&SyncRecord::new(id, EntityType::Folder, "r7", "{\"cseKey\":\"\"}"))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get_revision(EntityType::Folder, id).unwrap().as_deref(),
            Some("r7")
        );
        assert_eq!(store.list(EntityType::Folder).unwrap()[0].payload, "{\"cseKey\":\"\"}");
    }

    #[test]
    fn test_unwritable_parent_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        assert!(matches!(
            SqliteStore::open(blocker.join("cache.db")),
            Err(DatabaseError::Io(_))
        ));
    }

    #[test]
    fn test_unknown_schema_version_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let id = Uuid::new_v4();

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .upsert(&SyncRecord::new(id, EntityType::Password, "r1", "{}"))
                .unwrap();
            store
                .conn()
                .unwrap()
                .execute("UPDATE cache_metadata SET version = 99 WHERE id = 1", [])
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.list_ids(EntityType::Password).unwrap().is_empty());
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_id_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO cache_entities VALUES ('share', 'not-a-uuid', '1', '{}', 0)",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.list_ids(EntityType::Share),
            Err(DatabaseError::Corrupt(_))
        ));
    }
}

//! Local cache of synced vault entities.
//!
//! The cache stores each entity's payload exactly as the server sent it;
//! encrypted fields stay encrypted at rest. It is mutated only by sync
//! reconciliation, one atomic upsert or delete at a time.

pub mod memory;
pub mod schema;

pub use memory::MemoryStore;
pub use schema::SqliteStore;

use crate::sync::models::{EntityType, SyncRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by local stores.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Corrupt cache row: {0}")]
    Corrupt(String),
}

/// Result type for local store operations
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// One cached entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntity {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub version: String,
    pub payload: String,
    pub synced_at: DateTime<Utc>,
}

impl CachedEntity {
    pub fn from_record(record: &SyncRecord, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            entity_type: record.entity_type,
            version: record.version.clone(),
            payload: record.payload.clone(),
            synced_at,
        }
    }
}

/// Persistent `id -> entity` cache, partitioned by entity type.
///
/// Every method is a single atomic operation; an interrupted sync leaves
/// the cache in a state where each entity is either old or new.
pub trait LocalStore: Send + Sync {
    /// Cached version token of one entity.
    fn get_revision(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<String>>;

    /// Insert or replace one entity.
    fn upsert(&self, record: &SyncRecord) -> DbResult<()>;

    /// Remove one entity. Returns whether it existed.
    fn delete(&self, entity_type: EntityType, id: Uuid) -> DbResult<bool>;

    fn list_ids(&self, entity_type: EntityType) -> DbResult<Vec<Uuid>>;

    fn get(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<CachedEntity>>;

    fn list(&self, entity_type: EntityType) -> DbResult<Vec<CachedEntity>>;

    /// `id -> version` for every cached entity of one type.
    fn versions(&self, entity_type: EntityType) -> DbResult<HashMap<Uuid, String>> {
        let mut versions = HashMap::new();
        for id in self.list_ids(entity_type)? {
            if let Some(version) = self.get_revision(entity_type, id)? {
                versions.insert(id, version);
            }
        }
        Ok(versions)
    }
}

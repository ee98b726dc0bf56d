//! In-memory entity cache.

use super::{CachedEntity, DatabaseError, DbResult, LocalStore};
use crate::sync::models::{EntityType, SyncRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Cache that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<(EntityType, Uuid), CachedEntity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DbResult<RwLockReadGuard<'_, BTreeMap<(EntityType, Uuid), CachedEntity>>> {
        self.entities
            .read()
            .map_err(|_| DatabaseError::LockPoisoned("memory store".to_string()))
    }

    fn write(&self) -> DbResult<RwLockWriteGuard<'_, BTreeMap<(EntityType, Uuid), CachedEntity>>> {
        self.entities
            .write()
            .map_err(|_| DatabaseError::LockPoisoned("memory store".to_string()))
    }
}

impl LocalStore for MemoryStore {
    fn get_revision(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<String>> {
        Ok(self.read()?.get(&(entity_type, id)).map(|e| e.version.clone()))
    }

    fn upsert(&self, record: &SyncRecord) -> DbResult<()> {
        self.write()?.insert(
            (record.entity_type, record.id),
            CachedEntity::from_record(record, Utc::now()),
        );
        Ok(())
    }

    fn delete(&self, entity_type: EntityType, id: Uuid) -> DbResult<bool> {
        Ok(self.write()?.remove(&(entity_type, id)).is_some())
    }

    fn list_ids(&self, entity_type: EntityType) -> DbResult<Vec<Uuid>> {
        Ok(self
            .read()?
            .keys()
            .filter(|(t, _)| *t == entity_type)
            .map(|(_, id)| *id)
            .collect())
    }

    fn get(&self, entity_type: EntityType, id: Uuid) -> DbResult<Option<CachedEntity>> {
        Ok(self.read()?.get(&(entity_type, id)).cloned())
    }

    fn list(&self, entity_type: EntityType) -> DbResult<Vec<CachedEntity>> {
        Ok(self
            .read()?
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect())
    }
}

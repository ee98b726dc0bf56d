//! Presentation-facing facade over the session manager, sync engine and cache.

use crate::config::ClientConfig;
use crate::database::{LocalStore, SqliteStore};
use crate::session::keychain::{self, FieldValue, Keychain};
use crate::session::{MasterPasswordStore, OpenOutcome, SessionManager, SessionSettings, SessionState};
use crate::sync::models::{EntityType, Folder, Password, Share, Syncable};
use crate::sync::{SyncEngine, SyncReport};
use crate::transport::{HttpTransport, Transport};
use crate::{Result, VaultError};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Encrypted field waiting to be decrypted.
struct PendingField {
    id: Uuid,
    value: String,
    key_id: String,
}

/// Entry point for a UI or CLI.
pub struct VaultClient {
    session: SessionManager,
    sync: SyncEngine,
    store: Arc<dyn LocalStore>,
}

impl VaultClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
        session: SessionManager,
    ) -> Self {
        let sync = SyncEngine::new(transport, store.clone(), session.clone());
        Self {
            session,
            sync,
            store,
        }
    }

    /// Wire an HTTP transport and an SQLite cache from configuration.
    pub fn from_config(config: &ClientConfig, passwords: Arc<dyn MasterPasswordStore>) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config)?);
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open(&config.cache_path)?);
        let session = SessionManager::new(
            transport.clone(),
            passwords,
            SessionSettings::from_config(config),
        );
        Ok(Self::new(transport, store, session))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn current_session_state(&self) -> SessionState {
        self.session.current_state()
    }

    pub async fn open_session(&self, master_password: Option<SecretString>) -> OpenOutcome {
        self.session.open_session(master_password).await
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    /// Sync one entity type now.
    pub async fn trigger_sync(&self, entity_type: EntityType) -> Result<SyncReport> {
        self.sync.sync(entity_type).await
    }

    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        self.sync.sync_all().await
    }

    /// One cached entity as a typed model.
    pub fn cached<T: Syncable>(&self, id: Uuid) -> Result<Option<T>> {
        self.store
            .get(T::ENTITY_TYPE, id)?
            .map(|entity| parse::<T>(&entity.payload))
            .transpose()
    }

    /// Every cached entity of one type as typed models.
    pub fn list<T: Syncable>(&self) -> Result<Vec<T>> {
        self.store
            .list(T::ENTITY_TYPE)?
            .iter()
            .map(|entity| parse::<T>(&entity.payload))
            .collect()
    }

    /// Decrypt one field of a cached entity for display.
    ///
    /// Works from the cache and the in-memory keychain only; no network
    /// call is made.
    pub async fn decrypt_visible_field(
        &self,
        entity_type: EntityType,
        id: Uuid,
        field: &str,
    ) -> Result<FieldValue> {
        let pending = self.pending_field(entity_type, id, field)?;
        let keys = self.session.keychain().await;
        keychain::decrypt_field(&pending.value, &pending.key_id, &keys)
    }

    /// Decrypt `field` of many cached entities on blocking worker threads.
    pub async fn decrypt_batch(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
        field: &str,
    ) -> HashMap<Uuid, Result<FieldValue>> {
        let mut results = HashMap::with_capacity(ids.len());
        let mut pending = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.pending_field(entity_type, id, field) {
                Ok(item) => pending.push(item),
                Err(e) => {
                    results.insert(id, Err(e));
                }
            }
        }
        if pending.is_empty() {
            return results;
        }

        let keys = self.session.keychain().await;
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let chunk_size = pending.len().div_ceil(workers).max(1);
        debug!(
            fields = pending.len(),
            chunk_size, "Decrypting batch of {}", entity_type
        );

        let mut tasks = Vec::new();
        while !pending.is_empty() {
            let rest = pending.split_off(chunk_size.min(pending.len()));
            let chunk = std::mem::replace(&mut pending, rest);
            let ids: Vec<Uuid> = chunk.iter().map(|item| item.id).collect();
            let keys = keys.clone();
            tasks.push((ids, tokio::task::spawn_blocking(move || decrypt_chunk(chunk, &keys))));
        }

        for (ids, task) in tasks {
            match task.await {
                Ok(decrypted) => results.extend(decrypted),
                Err(e) => {
                    for id in ids {
                        results.insert(id, Err(VaultError::Io(format!("Decrypt task failed: {}", e))));
                    }
                }
            }
        }
        results
    }

    fn pending_field(&self, entity_type: EntityType, id: Uuid, field: &str) -> Result<PendingField> {
        let entity = self
            .store
            .get(entity_type, id)?
            .ok_or_else(|| VaultError::NotFound(format!("{} {} is not cached", entity_type, id)))?;

        let (value, key_id) = match entity_type {
            EntityType::Password => encrypted_field::<Password>(&entity.payload, field)?,
            EntityType::Folder => encrypted_field::<Folder>(&entity.payload, field)?,
            EntityType::Share => encrypted_field::<Share>(&entity.payload, field)?,
        };
        Ok(PendingField { id, value, key_id })
    }
}

fn parse<T: Syncable>(payload: &str) -> Result<T> {
    T::from_payload(payload).map_err(|e| {
        VaultError::Storage(format!("Cached {} is unreadable: {}", T::ENTITY_TYPE, e))
    })
}

fn encrypted_field<T: Syncable>(payload: &str, field: &str) -> Result<(String, String)> {
    let model = parse::<T>(payload)?;
    let value = model
        .field(field)
        .ok_or_else(|| VaultError::NotFound(format!("{} has no field {}", T::ENTITY_TYPE, field)))?;
    Ok((value.to_string(), model.decryption_key().to_string()))
}

fn decrypt_chunk(chunk: Vec<PendingField>, keys: &Keychain) -> Vec<(Uuid, Result<FieldValue>)> {
    chunk
        .into_iter()
        .map(|item| (item.id, keychain::decrypt_field(&item.value, &item.key_id, keys)))
        .collect()
}

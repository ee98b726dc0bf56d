//! Sync engine: fetches remote lists and applies the reconciliation to the
//! local cache.

use crate::database::LocalStore;
use crate::session::SessionManager;
use crate::sync::models::EntityType;
use crate::sync::reconcile::reconcile;
use crate::transport::Transport;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary of one sync cycle for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub entity_type: EntityType,
    pub upserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.upserted > 0 || self.deleted > 0
    }
}

/// Keeps the local cache consistent with the server, one entity type at a time.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    store: Arc<dyn LocalStore>,
    session: SessionManager,
    locks: TypeLocks,
}

/// One cycle lock per entity type.
#[derive(Default)]
struct TypeLocks {
    password: Mutex<()>,
    folder: Mutex<()>,
    share: Mutex<()>,
}

impl TypeLocks {
    fn get(&self, entity_type: EntityType) -> &Mutex<()> {
        match entity_type {
            EntityType::Password => &self.password,
            EntityType::Folder => &self.folder,
            EntityType::Share => &self.share,
        }
    }
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
        session: SessionManager,
    ) -> Self {
        Self {
            transport,
            store,
            session,
            locks: TypeLocks::default(),
        }
    }

    /// Run one sync cycle for `entity_type`.
    ///
    /// Cycles for the same type are serialised; different types may run
    /// concurrently. A failed cycle leaves the session untouched unless the
    /// server revoked the client.
    pub async fn sync(&self, entity_type: EntityType) -> Result<SyncReport> {
        let _cycle = self.locks.get(entity_type).lock().await;

        let code = self.session.require_open().await?;
        let started = Instant::now();

        let remote = match self.transport.list_entities(entity_type, Some(&code)).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Sync of {} failed: {}", entity_type, e);
                self.session.report_transport_error(&e, &code).await;
                return Err(e.into());
            }
        };

        let local = self.store.versions(entity_type)?;
        let plan = reconcile(&remote, &local);
        debug!(
            entity_type = %entity_type,
            remote = remote.len(),
            local = local.len(),
            "Reconciled"
        );

        for record in &plan.to_upsert {
            self.store.upsert(record)?;
        }
        for id in &plan.to_delete {
            self.store.delete(entity_type, *id)?;
        }

        let distinct = remote.iter().map(|r| r.id).collect::<HashSet<_>>().len();
        let report = SyncReport {
            entity_type,
            upserted: plan.to_upsert.len(),
            deleted: plan.to_delete.len(),
            unchanged: distinct.saturating_sub(plan.to_upsert.len()),
            duration: started.elapsed(),
            finished_at: Utc::now(),
        };
        info!(
            "Synced {}: {} upserted, {} deleted, {} unchanged",
            entity_type, report.upserted, report.deleted, report.unchanged
        );
        Ok(report)
    }

    /// Sync every entity type concurrently. Every cycle runs to completion;
    /// the first failure is returned.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        futures::future::join_all(EntityType::ALL.into_iter().map(|t| self.sync(t)))
            .await
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::fast_params;
    use crate::database::MemoryStore;
    use crate::session::{MemoryPasswordStore, SessionSettings, SessionState};
    use crate::sync::models::SyncRecord;
    use crate::transport::mock::{status, ScriptedTransport};
    use crate::transport::TransportError;
    use crate::VaultError;
    use uuid::Uuid;

    fn record(entity_type: EntityType, n: u8, version: &str) -> SyncRecord {
        SyncRecord::new(
            Uuid::from_bytes([n; 16]),
            entity_type,
            version,
            format!("{{\"id\":{},\"cseType\":\"CSEv1r1\",\"label\":\"beef\"}}", n),
        )
    }

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        session: SessionManager,
        engine: SyncEngine,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let store = Arc::new(MemoryStore::new());
        let session = SessionManager::with_kdf_params(
            transport.clone(),
            Arc::new(MemoryPasswordStore::new()),
            SessionSettings::default(),
            fast_params(),
        );
        let engine = SyncEngine::new(transport.clone(), store.clone(), session.clone());
        Fixture {
            transport,
            store,
            session,
            engine,
        }
    }

    #[tokio::test]
    async fn test_sync_requires_open_session() {
        let f = fixture();
        assert_eq!(
            f.engine.sync(EntityType::Password).await,
            Err(VaultError::NoSession)
        );
        assert_eq!(ScriptedTransport::count(&f.transport.list_calls), 0);
    }

    #[tokio::test]
    async fn test_sync_applies_reconciliation() {
        let f = fixture();
        f.session.open_session(None).await;

        f.store.upsert(&record(EntityType::Password, 1, "r1")).unwrap();
        f.store.upsert(&record(EntityType::Password, 2, "r1")).unwrap();
        f.store.upsert(&record(EntityType::Password, 3, "r1")).unwrap();
        let remote = vec![
            record(EntityType::Password, 1, "r1"),
            record(EntityType::Password, 2, "r2"),
            record(EntityType::Password, 4, "r1"),
        ];
        f.transport.push_list(EntityType::Password, Ok(remote.clone()));

        let report = f.engine.sync(EntityType::Password).await.unwrap();
        assert_eq!((report.upserted, report.deleted, report.unchanged), (2, 1, 1));

        let ids = f.store.list_ids(EntityType::Password).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&Uuid::from_bytes([3; 16])));
        // Ciphertext is cached as-is
        let cached = f
            .store
            .get(EntityType::Password, Uuid::from_bytes([2; 16]))
            .unwrap()
            .unwrap();
        assert_eq!(cached.payload, remote[1].payload);
        assert_eq!(cached.version, "r2");

        // Second cycle against the same list changes nothing
        f.transport.push_list(EntityType::Password, Ok(remote));
        let report = f.engine.sync(EntityType::Password).await.unwrap();
        assert!(!report.changed());
    }

    #[tokio::test]
    async fn test_repeated_remote_id_counts_once() {
        let f = fixture();
        f.session.open_session(None).await;
        f.store.upsert(&record(EntityType::Folder, 4, "r1")).unwrap();
        f.transport.push_list(
            EntityType::Folder,
            Ok(vec![
                record(EntityType::Folder, 4, "r1"),
                record(EntityType::Folder, 4, "r1"),
            ]),
        );

        let report = f.engine.sync(EntityType::Folder).await.unwrap();
        assert_eq!(report.upserted, 0);
        assert_eq!(report.unchanged, 1);
        assert!(!report.changed());
    }

    #[tokio::test]
    async fn test_sync_leaves_other_types_alone() {
        let f = fixture();
        f.session.open_session(None).await;
        f.store.upsert(&record(EntityType::Folder, 7, "r1")).unwrap();

        f.engine.sync(EntityType::Password).await.unwrap();
        assert_eq!(f.store.list_ids(EntityType::Folder).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_list_deauthorizes() {
        let f = fixture();
        f.session.open_session(None).await;
        f.transport.push_list(EntityType::Folder, Err(status(403)));

        assert_eq!(
            f.engine.sync(EntityType::Folder).await,
            Err(VaultError::Deauthorized)
        );
        assert_eq!(f.session.current_state(), SessionState::Deauthorized);
    }

    #[tokio::test]
    async fn test_network_failure_keeps_session_and_cache() {
        let f = fixture();
        f.session.open_session(None).await;
        f.store.upsert(&record(EntityType::Share, 5, "100")).unwrap();
        f.transport.push_list(
            EntityType::Share,
            Err(TransportError::Timeout("list".into())),
        );

        assert!(matches!(
            f.engine.sync(EntityType::Share).await,
            Err(VaultError::NetworkTimeout(_))
        ));
        assert_eq!(f.session.current_state(), SessionState::Open);
        assert_eq!(f.store.list_ids(EntityType::Share).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_all_covers_every_type() {
        let f = fixture();
        f.session.open_session(None).await;
        f.transport.push_list(EntityType::Password, Ok(vec![record(EntityType::Password, 1, "a")]));
        f.transport.push_list(EntityType::Folder, Ok(vec![record(EntityType::Folder, 2, "b")]));
        f.transport.push_list(EntityType::Share, Ok(vec![record(EntityType::Share, 3, "9")]));

        let reports = f.engine.sync_all().await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.upserted == 1));
        assert_eq!(ScriptedTransport::count(&f.transport.list_calls), 3);
    }
}

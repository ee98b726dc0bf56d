//! Revision-based reconciliation of a remote list against the local cache.

use crate::sync::models::SyncRecord;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Changes needed to make the local cache match the remote list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Remote records that are new or whose version changed.
    pub to_upsert: Vec<SyncRecord>,
    /// Local ids absent from the remote list.
    pub to_delete: Vec<Uuid>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// Compare the remote list with the local `id -> version` map.
///
/// A record is upserted when the local cache lacks it or holds a different
/// version; versions are opaque and only compared for equality. A local id
/// is deleted when the remote list does not contain it. Payloads are never
/// inspected, so ciphertext passes through untouched.
///
/// Linear in the size of both inputs, with constant-time lookups into `local`.
/// If `remote` lists the same id twice, the last occurrence wins.
pub fn reconcile(remote: &[SyncRecord], local: &HashMap<Uuid, String>) -> Reconciliation {
    let mut latest: HashMap<Uuid, usize> = HashMap::with_capacity(remote.len());
    let mut order = Vec::with_capacity(remote.len());

    for (index, record) in remote.iter().enumerate() {
        if latest.insert(record.id, index).is_none() {
            order.push(record.id);
        }
    }

    let to_upsert = order
        .iter()
        .filter_map(|id| latest.get(id).map(|&index| &remote[index]))
        .filter(|record| local.get(&record.id) != Some(&record.version))
        .cloned()
        .collect();

    let seen: HashSet<&Uuid> = latest.keys().collect();
    let to_delete = local
        .keys()
        .filter(|id| !seen.contains(id))
        .copied()
        .collect();

    Reconciliation {
        to_upsert,
        to_delete,
    }
}

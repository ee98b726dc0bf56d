//! Revision-based sync of vault entities into the local cache.
//!
//! - Lists every entity of a type from the server
//! - Reconciles the list against the cached versions
//! - Stores payloads as received; encrypted fields are never decrypted here

pub mod engine;
pub mod models;
pub mod reconcile;

pub use engine::{SyncEngine, SyncReport};
pub use models::{CseType, EntityType, Folder, Password, Share, SyncRecord, Syncable};
pub use reconcile::{reconcile, Reconciliation};

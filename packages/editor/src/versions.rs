//! # Version Snapshots
//!
//! Point-in-time captures of the replicated document, kept in creation order
//! and mirrored to a remote store.
//!
//! Creating a version is optimistic: the local list grows immediately and
//! the store is told afterwards. A failed save is reported to the caller but
//! the local entry stays. Loading replaces the local list wholesale; a
//! failed load leaves it empty.

use crate::cursors::ClientId;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// An immutable capture of the shared document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// Capture time, Unix milliseconds
    pub time: i64,

    /// Encoded replica snapshot
    pub snapshot: Vec<u8>,

    /// Participant that captured it
    #[serde(rename = "clientID", default)]
    pub client_id: ClientId,
}

/// Remote append/query service for snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist one snapshot
    async fn save(&self, version: &VersionSnapshot) -> Result<(), StoreError>;

    /// Every persisted snapshot, oldest first
    async fn list(&self) -> Result<Vec<VersionSnapshot>, StoreError>;
}

/// Ordered version list for one participant
pub struct VersionManager {
    client_id: ClientId,
    store: Arc<dyn SnapshotStore>,
    versions: watch::Sender<Vec<VersionSnapshot>>,
    last_time: i64,
}

impl VersionManager {
    pub fn new(client_id: ClientId, store: Arc<dyn SnapshotStore>) -> Self {
        let (versions, _) = watch::channel(Vec::new());
        Self {
            client_id,
            store,
            versions,
            last_time: 0,
        }
    }

    /// Current list, oldest first
    pub fn versions(&self) -> Vec<VersionSnapshot> {
        self.versions.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.versions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.borrow().is_empty()
    }

    /// Receiver notified whenever the list changes
    pub fn subscribe(&self) -> watch::Receiver<Vec<VersionSnapshot>> {
        self.versions.subscribe()
    }

    /// Record `snapshot` as a new version and persist it.
    ///
    /// The version is appended before the store is contacted and is kept
    /// even if persisting fails.
    pub async fn create_version(&mut self, snapshot: Vec<u8>) -> Result<VersionSnapshot, StoreError> {
        let version = VersionSnapshot {
            time: self.next_time(),
            snapshot,
            client_id: self.client_id,
        };

        self.versions.send_modify(|versions| versions.push(version.clone()));

        if let Err(err) = self.store.save(&version).await {
            warn!(time = version.time, error = %err, "Failed to persist version");
            return Err(err);
        }
        Ok(version)
    }

    /// Replace the local list with the store's. On failure the list is
    /// emptied and the error returned.
    pub async fn load_versions(&mut self) -> Result<usize, StoreError> {
        match self.store.list().await {
            Ok(versions) => {
                let count = versions.len();
                info!(count, "Loaded versions");
                if let Some(latest) = versions.iter().map(|v| v.time).max() {
                    self.last_time = self.last_time.max(latest);
                }
                self.versions.send_replace(versions);
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load versions");
                self.versions.send_replace(Vec::new());
                Err(err)
            }
        }
    }

    /// Wall-clock milliseconds, bumped so that no two versions share a time
    fn next_time(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_time = now.max(self.last_time + 1);
        self.last_time
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("client_id", &self.client_id)
            .field("versions", &self.len())
            .finish_non_exhaustive()
    }
}

//! Snapshot store clients.
//!
//! [`HttpSnapshotStore`] talks to a remote store service over two routes:
//!
//! - `POST {base}/save` with one JSON-encoded [`VersionSnapshot`]
//! - `GET {base}/get/snapshots` returning the full list, oldest first
//!
//! [`MemorySnapshotStore`] keeps everything in process.

use crate::versions::{SnapshotStore, VersionSnapshot};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Client for a remote snapshot store service
#[derive(Debug, Clone)]
pub struct HttpSnapshotStore {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSnapshotStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SnapshotStore for HttpSnapshotStore {
    async fn save(&self, version: &VersionSnapshot) -> Result<(), StoreError> {
        let url = format!("{}/save", self.base_url);
        debug!(%url, time = version.time, "Saving snapshot");

        let response = self
            .client
            .post(&url)
            .json(version)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<VersionSnapshot>, StoreError> {
        let url = format!("{}/get/snapshots", self.base_url);
        debug!(%url, "Fetching snapshots");

        let response = self.client.get(&url).timeout(self.timeout).send().await?;
        let versions = Self::check(response).await?.json().await?;
        Ok(versions)
    }
}

/// In-process store. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<VersionSnapshot>>,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything persisted so far
    pub fn snapshots(&self) -> Vec<VersionSnapshot> {
        self.snapshots
            .read()
            .map(|snapshots| snapshots.clone())
            .unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, version: &VersionSnapshot) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.snapshots
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?
            .push(version.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<VersionSnapshot>, StoreError> {
        self.ensure_available()?;
        self.snapshots
            .read()
            .map(|snapshots| snapshots.clone())
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

//! # Tandem Snapshot Store
//!
//! HTTP service holding the version snapshots of a shared document.
//!
//! ## Routes
//!
//! - `POST /save`: append one snapshot (`{snapshot, time, clientID}`)
//! - `GET /get/snapshots`: every snapshot, in the order they were saved
//!
//! Snapshots live in memory. With a data file they are also written out
//! after every save and read back on startup.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_editor::VersionSnapshot;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum StoreServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data file: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for StoreServiceError {
    fn into_response(self) -> Response {
        error!(error = %self, "Snapshot store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Snapshots held by the service
#[derive(Debug, Default)]
pub struct SnapshotLog {
    snapshots: RwLock<Vec<VersionSnapshot>>,
    data_file: Option<PathBuf>,
}

pub type SharedLog = Arc<SnapshotLog>;

impl SnapshotLog {
    /// In-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log backed by `path`, loading what it already holds
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreServiceError> {
        let path = path.into();
        let snapshots = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), count = snapshots.len(), "Opened snapshot log");

        Ok(Self {
            snapshots: RwLock::new(snapshots),
            data_file: Some(path),
        })
    }

    pub async fn append(&self, version: VersionSnapshot) -> Result<usize, StoreServiceError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.push(version);

        if let Some(path) = &self.data_file {
            if let Err(err) = Self::persist(path, &snapshots).await {
                // keep memory and disk in agreement
                snapshots.pop();
                return Err(err);
            }
        }
        Ok(snapshots.len())
    }

    async fn persist(path: &Path, snapshots: &[VersionSnapshot]) -> Result<(), StoreServiceError> {
        let json = serde_json::to_vec(snapshots)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<VersionSnapshot> {
        self.snapshots.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

/// Build the service's router
pub fn router(log: SharedLog) -> Router {
    Router::new()
        .route("/save", post(save_snapshot))
        .route("/get/snapshots", get(list_snapshots))
        .with_state(log)
        .layer(CorsLayer::permissive())
}

async fn save_snapshot(
    State(log): State<SharedLog>,
    Json(version): Json<VersionSnapshot>,
) -> Result<StatusCode, StoreServiceError> {
    let time = version.time;
    let client_id = version.client_id;
    let count = log.append(version).await?;
    info!(time, client_id, count, "Saved snapshot");
    Ok(StatusCode::CREATED)
}

async fn list_snapshots(State(log): State<SharedLog>) -> Json<Vec<VersionSnapshot>> {
    Json(log.list().await)
}

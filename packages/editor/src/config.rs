use crate::cursors::CursorData;
use crate::errors::EditorError;
use crate::store::HttpSnapshotStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "tandem.config.json";

/// Tandem configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Collaboration server the transport connects to
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Shared document name on the collaboration server
    #[serde(default = "default_document_name")]
    pub document_name: String,

    /// Base URL of the snapshot store service
    #[serde(default = "default_snapshot_store_url")]
    pub snapshot_store_url: String,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Maximum undo levels (0 = unlimited)
    #[serde(default = "default_undo_levels")]
    pub undo_levels: usize,

    /// Local cursor label; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_name: Option<String>,

    /// Local cursor color; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_color: Option<String>,
}

fn default_endpoint_url() -> String {
    "ws://127.0.0.1:1234".to_string()
}

fn default_document_name() -> String {
    "slate-yjs-demo".to_string()
}

fn default_snapshot_store_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

fn default_undo_levels() -> usize {
    100
}

impl Config {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, EditorError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    /// Address of the shared document on the collaboration server
    pub fn document_url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint_url.trim_end_matches('/'),
            self.document_name
        )
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Client for the configured snapshot store
    pub fn snapshot_store(&self) -> HttpSnapshotStore {
        HttpSnapshotStore::new(&self.snapshot_store_url).with_timeout(self.store_timeout())
    }

    /// Configured cursor data, with random values filling the gaps
    pub fn cursor_data(&self) -> CursorData {
        let random = CursorData::random();
        CursorData::new(
            self.cursor_name.clone().unwrap_or(random.name),
            self.cursor_color.clone().unwrap_or(random.color),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            document_name: default_document_name(),
            snapshot_store_url: default_snapshot_store_url(),
            store_timeout_ms: default_store_timeout_ms(),
            undo_levels: default_undo_levels(),
            cursor_name: None,
            cursor_color: None,
        }
    }
}

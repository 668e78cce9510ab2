//! Error types for the editor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Mutation error: {0}")]
    Mutation(#[from] crate::mutations::MutationError),

    #[error("Replica error: {0}")]
    Crdt(#[from] crate::crdt::CrdtError),

    #[error("Snapshot store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::connection::TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! # Connection Controller
//!
//! Mirrors the transport's connection status and lets the user flip it.
//!
//! ```text
//!              toggle() → transport.connect()
//!   Disconnected ─────────────────────────────→ (waits)
//!        ↑                                        │ TransportEvent::Connected
//!        │ TransportEvent::Disconnected           ↓
//!        └──────────────────────────────────── Connected
//! ```
//!
//! Requests never change the state by themselves. Only events reported by
//! the transport do, so the mirrored state cannot drift from the real one.
//! A request the transport rejects outright is reported as a disconnect.

use crate::cursors::{AwarenessEntry, AwarenessUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Everything the transport delivers to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,

    /// Replicated document update (yrs v1 encoding)
    DocumentUpdate(Vec<u8>),

    Awareness(AwarenessUpdate),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,
}

/// The network provider carrying document updates and awareness.
///
/// Requests return as soon as they are issued; their outcome arrives later
/// as [`TransportEvent`]s.
pub trait Transport: Send + Sync {
    fn connect(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;

    fn send_update(&self, update: &[u8]) -> Result<(), TransportError>;

    /// Publish (or with `None`, withdraw) the local awareness entry
    fn publish_awareness(&self, entry: Option<&AwarenessEntry>) -> Result<(), TransportError>;
}

/// Boolean connection state plus a toggle over the transport
pub struct ConnectionController {
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { transport, state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Ask the transport to connect
    pub fn connect(&self) {
        if let Err(err) = self.transport.connect() {
            warn!(error = %err, "Transport rejected connect");
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// Ask the transport to disconnect
    pub fn disconnect(&self) {
        if let Err(err) = self.transport.disconnect() {
            warn!(error = %err, "Transport rejected disconnect");
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// Disconnect when connected, connect otherwise
    pub fn toggle(&self) {
        if self.is_connected() {
            self.disconnect();
        } else {
            self.connect();
        }
    }

    /// Mirror a connection event. Returns whether the event was one.
    pub fn handle_event(&self, event: &TransportEvent) -> bool {
        match event {
            TransportEvent::Connected => {
                self.transition(ConnectionState::Connected);
                true
            }
            TransportEvent::Disconnected => {
                self.transition(ConnectionState::Disconnected);
                true
            }
            TransportEvent::DocumentUpdate(_) | TransportEvent::Awareness(_) => false,
        }
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(from = ?*state, to = ?next, "Connection state changed");
            *state = next;
            true
        });
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

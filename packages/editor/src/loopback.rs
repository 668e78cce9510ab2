//! In-process transport.
//!
//! A [`LoopbackHub`] plays the part of the collaboration server: every
//! participant joins with its client id and gets a [`LoopbackTransport`]
//! plus the receiving end of its event channel. Document updates are logged
//! and relayed to every other connected participant; a participant that
//! connects later has the log replayed. Awareness entries are relayed the
//! same way and withdrawn when their owner disconnects.

use crate::connection::{Transport, TransportError, TransportEvent};
use crate::cursors::{AwarenessEntry, AwarenessUpdate, ClientId};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

struct Peer {
    client_id: ClientId,
    sender: mpsc::UnboundedSender<TransportEvent>,
    connected: bool,
    /// Last entry the participant published, kept while disconnected
    entry: Option<AwarenessEntry>,
}

impl Peer {
    fn send(&self, event: TransportEvent) {
        // Receiver may be gone
        let _ = self.sender.send(event);
    }
}

#[derive(Default)]
struct HubState {
    peers: Vec<Peer>,
    updates: Vec<Vec<u8>>,
    awareness: IndexMap<ClientId, AwarenessEntry>,
    refusing: bool,
}

impl HubState {
    fn peer_mut(&mut self, client_id: ClientId) -> Result<&mut Peer, TransportError> {
        self.peers
            .iter_mut()
            .find(|peer| peer.client_id == client_id)
            .ok_or(TransportError::Closed)
    }

    /// Send to all connected peers except the origin
    fn broadcast(&self, event: TransportEvent, exclude: ClientId) {
        for peer in &self.peers {
            if peer.connected && peer.client_id != exclude {
                peer.send(event.clone());
            }
        }
    }

    fn publish(&mut self, entry: AwarenessEntry) {
        let client_id = entry.client_id;
        let update = match self.awareness.insert(client_id, entry.clone()) {
            Some(_) => AwarenessUpdate {
                updated: vec![entry],
                ..Default::default()
            },
            None => AwarenessUpdate {
                added: vec![entry],
                ..Default::default()
            },
        };
        self.broadcast(TransportEvent::Awareness(update), client_id);
    }

    fn withdraw(&mut self, client_id: ClientId) {
        if self.awareness.shift_remove(&client_id).is_some() {
            let update = AwarenessUpdate {
                removed: vec![client_id],
                ..Default::default()
            };
            self.broadcast(TransportEvent::Awareness(update), client_id);
        }
    }
}

/// Relay shared by every participant of one document
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant. Joining again with the same id replaces the
    /// earlier registration.
    pub fn join(&self, client_id: ClientId) -> (Arc<LoopbackTransport>, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state.lock() {
            state.peers.retain(|peer| peer.client_id != client_id);
            state.peers.push(Peer {
                client_id,
                sender,
                connected: false,
                entry: None,
            });
        }
        let transport = LoopbackTransport {
            client_id,
            hub: self.clone(),
        };
        (Arc::new(transport), receiver)
    }

    /// Refuse (or accept again) connection requests
    pub fn set_refusing(&self, refusing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.refusing = refusing;
        }
    }

    /// Drop a participant's connection from the server side
    pub fn sever(&self, client_id: ClientId) {
        if let Ok(mut state) = self.state.lock() {
            if let Ok(peer) = state.peer_mut(client_id) {
                if !peer.connected {
                    return;
                }
                peer.connected = false;
                peer.send(TransportEvent::Disconnected);
            }
            state.withdraw(client_id);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.peers.iter().filter(|peer| peer.connected).count())
            .unwrap_or(0)
    }

    /// Number of document updates relayed so far
    pub fn update_count(&self) -> usize {
        self.state.lock().map(|state| state.updates.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>, TransportError> {
        self.state.lock().map_err(|_| TransportError::Closed)
    }
}

impl std::fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("connected", &self.connected_count())
            .field("updates", &self.update_count())
            .finish()
    }
}

/// One participant's handle on a [`LoopbackHub`]
#[derive(Debug)]
pub struct LoopbackTransport {
    client_id: ClientId,
    hub: LoopbackHub,
}

impl LoopbackTransport {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.hub.lock()?;
        if state.refusing {
            return Err(TransportError::Refused("hub is refusing connections".to_string()));
        }

        let peer = state.peer_mut(self.client_id)?;
        if peer.connected {
            return Ok(());
        }
        peer.connected = true;
        peer.send(TransportEvent::Connected);
        let pending = peer.entry.clone();

        let backlog: Vec<TransportEvent> = state
            .updates
            .iter()
            .cloned()
            .map(TransportEvent::DocumentUpdate)
            .collect();
        let present: Vec<AwarenessEntry> = state.awareness.values().cloned().collect();

        let peer = state.peer_mut(self.client_id)?;
        for event in backlog {
            peer.send(event);
        }
        if !present.is_empty() {
            peer.send(TransportEvent::Awareness(AwarenessUpdate {
                added: present,
                ..Default::default()
            }));
        }

        if let Some(entry) = pending {
            state.publish(entry);
        }
        debug!(client_id = self.client_id, "Loopback peer connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.hub.lock()?;
        let peer = state.peer_mut(self.client_id)?;
        if !peer.connected {
            return Ok(());
        }
        peer.connected = false;
        peer.send(TransportEvent::Disconnected);
        state.withdraw(self.client_id);
        debug!(client_id = self.client_id, "Loopback peer disconnected");
        Ok(())
    }

    fn send_update(&self, update: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.lock()?;
        if !state.peer_mut(self.client_id)?.connected {
            return Err(TransportError::NotConnected);
        }
        state.updates.push(update.to_vec());
        state.broadcast(TransportEvent::DocumentUpdate(update.to_vec()), self.client_id);
        Ok(())
    }

    fn publish_awareness(&self, entry: Option<&AwarenessEntry>) -> Result<(), TransportError> {
        let mut state = self.hub.lock()?;
        let peer = state.peer_mut(self.client_id)?;
        peer.entry = entry.cloned();
        let connected = peer.connected;

        match entry {
            Some(entry) if connected => state.publish(entry.clone()),
            Some(_) => {}
            None => state.withdraw(self.client_id),
        }
        Ok(())
    }
}

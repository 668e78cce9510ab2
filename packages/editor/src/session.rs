//! # Edit Session Management
//!
//! An EditSession is one participant's view of a shared document. It owns
//! the local tree, the replica bound to it, the remote cursor states, the
//! connection controller, the version list and the local undo history.
//!
//! ## Event flow
//!
//! ```text
//! user command ──→ Document::apply ──→ normalize ──→ UndoStack::record
//!                                                      │
//!                                                      ↓
//!                                       YrsReplica::write_local ──→ Transport
//!
//! Transport ──→ TransportEvent ──→ handle_event
//!                  DocumentUpdate: replica merge ──→ Document::replace_blocks
//!                  Awareness:      RemoteCursors::apply
//!                  Connected/Disconnected: ConnectionController
//! ```
//!
//! Events are handled one at a time on the caller's thread. Dropping the
//! session detaches it.

use crate::commands;
use crate::config::Config;
use crate::connection::{ConnectionController, ConnectionState, Transport, TransportEvent};
use crate::crdt::YrsReplica;
use crate::cursors::{AwarenessEntry, Caret, ClientId, CursorData, Decoration, RemoteCursors};
use crate::document::Document;
use crate::errors::EditorError;
use crate::node::{Block, Format, Mark, Marks, Node};
use crate::selection::Selection;
use crate::undo_stack::UndoStack;
use crate::versions::{SnapshotStore, VersionManager, VersionSnapshot};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Single participant in a collaborative document
pub struct EditSession {
    document: Document,
    replica: YrsReplica,
    cursors: RemoteCursors,
    connection: ConnectionController,
    versions: VersionManager,
    undo: UndoStack,
    cursor_data: CursorData,
    document_url: Option<String>,
    attached: bool,
}

impl EditSession {
    /// Create a detached session around `replica`
    pub fn new(
        replica: YrsReplica,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let client_id = replica.client_id();
        Self {
            document: Document::new(),
            replica,
            cursors: RemoteCursors::new(client_id),
            connection: ConnectionController::new(transport),
            versions: VersionManager::new(client_id, store),
            undo: UndoStack::new(),
            cursor_data: CursorData::random(),
            document_url: None,
            attached: false,
        }
    }

    /// Create a session using the configured store, cursor data and undo depth
    pub fn from_config(config: &Config, replica: YrsReplica, transport: Arc<dyn Transport>) -> Self {
        let mut session = Self::new(replica, transport, Arc::new(config.snapshot_store()));
        session.cursor_data = config.cursor_data();
        session.undo = UndoStack::with_max_levels(config.undo_levels);
        session.document_url = Some(config.document_url());
        session
    }

    pub fn with_cursor_data(mut self, cursor_data: CursorData) -> Self {
        self.cursor_data = cursor_data;
        self
    }

    pub fn with_undo_levels(mut self, levels: usize) -> Self {
        self.undo = UndoStack::with_max_levels(levels);
        self
    }

    pub fn client_id(&self) -> ClientId {
        self.replica.client_id()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn replica(&self) -> &YrsReplica {
        &self.replica
    }

    pub fn cursor_data(&self) -> &CursorData {
        &self.cursor_data
    }

    /// Shared document this session was configured for
    pub fn document_url(&self) -> Option<&str> {
        self.document_url.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Adopt the replica's content and ask the transport to connect
    pub fn attach(&mut self) -> Result<(), EditorError> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        self.adopt_replica()?;
        info!(
            client_id = self.client_id(),
            document = self.document_url.as_deref().unwrap_or_default(),
            "Session attached"
        );
        self.connection.connect();
        self.publish_awareness();
        Ok(())
    }

    /// Stop following the replica, withdraw the local cursor and disconnect
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;

        if let Err(err) = self.connection.transport().publish_awareness(None) {
            debug!(error = %err, "Failed to withdraw awareness entry");
        }
        self.connection.disconnect();
        self.cursors.clear();
        info!(client_id = self.client_id(), "Session detached");
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), EditorError> {
        if self.connection.handle_event(&event) {
            match event {
                TransportEvent::Connected => {
                    // Anything written while offline goes out in full
                    if !self.replica.is_pristine() {
                        let state = self.replica.encode_state();
                        self.send_update(&state);
                    }
                    self.publish_awareness();
                }
                _ => self.cursors.clear(),
            }
            return Ok(());
        }
        if !self.attached {
            debug!(client_id = self.client_id(), "Ignoring event while detached");
            return Ok(());
        }

        match event {
            TransportEvent::DocumentUpdate(update) => {
                self.replica.apply_remote_update(&update)?;
                self.adopt_replica()?;
            }
            TransportEvent::Awareness(update) => {
                self.cursors.apply(update);
            }
            TransportEvent::Connected | TransportEvent::Disconnected => {}
        }
        Ok(())
    }

    /// Handle every event already waiting in `events`. Returns how many were
    /// handled.
    pub fn handle_pending(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<usize, EditorError> {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    // Selection & commands

    pub fn selection(&self) -> Option<&Selection> {
        self.document.selection()
    }

    pub fn select(&mut self, selection: Option<Selection>) {
        self.document.select(selection);
        self.publish_awareness();
    }

    pub fn marks(&self) -> Marks {
        commands::marks(&self.document)
    }

    pub fn is_mark_active(&self, mark: Mark) -> bool {
        commands::is_mark_active(&self.document, mark)
    }

    pub fn is_block_active(&self, format: Format) -> bool {
        commands::is_block_active(&self.document, format)
    }

    pub fn toggle_mark(&mut self, mark: Mark) -> Result<(), EditorError> {
        let result = commands::toggle_mark(&mut self.document, mark);
        self.commit(mark.as_str())?;
        Ok(result?)
    }

    pub fn toggle_block(&mut self, format: Format) -> Result<(), EditorError> {
        let result = commands::toggle_block(&mut self.document, format);
        self.commit(format.as_str())?;
        Ok(result?)
    }

    pub fn insert_text(&mut self, text: &str) -> Result<(), EditorError> {
        let result = commands::insert_text(&mut self.document, text);
        self.commit("insert text")?;
        Ok(result?)
    }

    pub fn delete_selection(&mut self) -> Result<(), EditorError> {
        let result = commands::delete_selection(&mut self.document);
        self.commit("delete")?;
        Ok(result?)
    }

    // History

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let undone = self.undo.undo(&mut self.document)?;
        self.document.take_operations();
        if undone {
            self.sync_replica()?;
            self.publish_awareness();
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let redone = self.undo.redo(&mut self.document)?;
        self.document.take_operations();
        if redone {
            self.sync_replica()?;
            self.publish_awareness();
        }
        Ok(redone)
    }

    // Remote cursors

    pub fn remote_cursors(&self) -> &RemoteCursors {
        &self.cursors
    }

    /// Highlight ranges of remote participants, recomputed on each call
    pub fn decorations(&self) -> impl Iterator<Item = Decoration> + '_ {
        self.cursors.decorations(&self.document)
    }

    pub fn carets(&self) -> impl Iterator<Item = Caret> + '_ {
        self.cursors.carets(&self.document)
    }

    pub fn set_cursor_data(&mut self, cursor_data: CursorData) {
        self.cursor_data = cursor_data;
        self.publish_awareness();
    }

    // Connection

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn toggle_connection(&self) {
        self.connection.toggle();
    }

    // Versions

    pub fn versions(&self) -> Vec<VersionSnapshot> {
        self.versions.versions()
    }

    pub fn subscribe_versions(&self) -> watch::Receiver<Vec<VersionSnapshot>> {
        self.versions.subscribe()
    }

    /// Capture the replica as a new version
    pub async fn create_version(&mut self) -> Result<VersionSnapshot, EditorError> {
        let snapshot = self.replica.snapshot();
        Ok(self.versions.create_version(snapshot).await?)
    }

    pub async fn load_versions(&mut self) -> Result<usize, EditorError> {
        Ok(self.versions.load_versions().await?)
    }

    /// Bring the content captured by `version` back as an undoable edit
    pub fn restore_version(&mut self, version: &VersionSnapshot) -> Result<(), EditorError> {
        let blocks = self.replica.materialize_snapshot(&version.snapshot)?;
        let result = self.document.replace_blocks(blocks);
        self.commit("restore version")?;
        info!(time = version.time, "Restored version");
        Ok(result?)
    }

    // Internals

    /// Record the pending local operations and mirror them to the replica
    fn commit(&mut self, description: &str) -> Result<(), EditorError> {
        let operations = self.document.take_operations();
        if !operations.is_empty() {
            self.undo.record_described(operations, description);
            self.sync_replica()?;
        }
        self.publish_awareness();
        Ok(())
    }

    /// Take the replica's content as the local tree
    fn adopt_replica(&mut self) -> Result<(), EditorError> {
        let mut blocks = self.replica.materialize()?;
        let shared_is_empty = blocks.is_empty();
        if shared_is_empty {
            blocks.push(Node::Block(Block::empty_paragraph()));
        }
        let result = self.document.replace_blocks(blocks);

        let foreign = self.document.take_operations();
        self.undo.rebase(&foreign);
        result?;

        // Repairs made by normalization go back out; an empty shared
        // document is left for the first local edit to fill
        if !shared_is_empty {
            self.sync_replica()?;
        }
        Ok(())
    }

    fn sync_replica(&mut self) -> Result<(), EditorError> {
        if let Some(update) = self.replica.write_local(self.document.children())? {
            self.send_update(&update);
        }
        Ok(())
    }

    fn send_update(&self, update: &[u8]) {
        if !self.connection.is_connected() {
            return;
        }
        if let Err(err) = self.connection.transport().send_update(update) {
            warn!(error = %err, "Failed to send document update");
        }
    }

    fn publish_awareness(&self) {
        if !self.attached {
            return;
        }
        let entry = AwarenessEntry {
            client_id: self.client_id(),
            data: self.cursor_data.clone(),
            selection: self.document.selection().cloned(),
        };
        if let Err(err) = self.connection.transport().publish_awareness(Some(&entry)) {
            debug!(error = %err, "Failed to publish awareness entry");
        }
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("client_id", &self.client_id())
            .field("document_url", &self.document_url)
            .field("attached", &self.attached)
            .field("connection", &self.connection.state())
            .field("remote_cursors", &self.cursors.len())
            .finish_non_exhaustive()
    }
}

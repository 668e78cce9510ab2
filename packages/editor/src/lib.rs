//! # Tandem Editor
//!
//! Integration layer between a locally edited rich-text tree and a document
//! replicated between collaborators.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ commands: mark/block toggles at selection   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ document: tree + selection                  │
//! │  - Apply mutations with validation          │
//! │  - Normalize dirty paths to a fixpoint      │
//! │  - Record inverses for undo                 │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ crdt: yrs replica shared over a Transport   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Alongside the tree, `cursors` projects remote awareness into highlight
//! ranges, `connection` mirrors the transport's state and `versions` keeps
//! snapshots of the replica in a remote store. [`EditSession`] owns all of
//! them for one participant.
//!
//! ## Core Principles
//!
//! 1. **Tree is always valid**: every commit ends in normalization
//! 2. **CRDT for convergence**: the replica merges, the tree interprets
//! 3. **Character-level replication**: block text is a shared `YText`, so
//!    concurrent typing in one block merges
//! 4. **State mirrors events**: connection state follows transport reports
//!
//! ## Usage
//!
//! ### Single-user editing
//!
//! ```rust,ignore
//! use tandem_editor::{commands, Document, Mark, Point, Selection};
//!
//! let mut doc = Document::new();
//! doc.select(Some(Selection::collapsed(Point::new(vec![0, 0], 0))));
//! commands::insert_text(&mut doc, "Hello")?;
//!
//! doc.select(Some(Selection::new(
//!     Point::new(vec![0, 0], 0),
//!     Point::new(vec![0, 0], 5),
//! )));
//! commands::toggle_mark(&mut doc, Mark::Bold)?;
//! ```
//!
//! ### Collaborative editing
//!
//! ```rust,ignore
//! use tandem_editor::{EditSession, LoopbackHub, MemorySnapshotStore, YrsReplica};
//!
//! let hub = LoopbackHub::new();
//! let (transport, mut events) = hub.join(1);
//! let mut session = EditSession::new(
//!     YrsReplica::with_client_id(1),
//!     transport,
//!     Arc::new(MemorySnapshotStore::new()),
//! );
//!
//! session.attach()?;
//! session.handle_pending(&mut events)?;
//! ```

pub mod commands;
mod config;
mod connection;
mod crdt;
mod cursors;
mod document;
mod errors;
mod loopback;
mod mutations;
mod node;
mod normalize;
pub mod path;
mod selection;
mod session;
mod store;
mod undo_stack;
mod versions;

pub use config::{Config, DEFAULT_CONFIG_NAME};
pub use connection::{
    ConnectionController, ConnectionState, Transport, TransportError, TransportEvent,
};
pub use crdt::{CrdtError, YrsReplica, CONTENT};
pub use cursors::{
    AwarenessEntry, AwarenessUpdate, Caret, ClientId, CursorData, Decoration, RemoteCursorState,
    RemoteCursors,
};
pub use document::{Descendants, Document};
pub use errors::EditorError;
pub use loopback::{EventReceiver, LoopbackHub, LoopbackTransport};
pub use mutations::{transform_path, AppliedMutation, Mutation, MutationError};
pub use node::{Align, Block, BlockKind, Format, Mark, Marks, Node, Text, UnknownFormat};
pub use normalize::{
    EnsureBlockHasChild, EnsureRootBlock, MergeAdjacentTexts, NormalizationEngine, NormalizeRule,
    RemoveMismatchedChildren,
};
pub use path::Path;
pub use selection::{Point, Selection};
pub use session::EditSession;
pub use store::{HttpSnapshotStore, MemorySnapshotStore, StoreError};
pub use undo_stack::{MutationBatch, UndoStack};
pub use versions::{SnapshotStore, VersionManager, VersionSnapshot};

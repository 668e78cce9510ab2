//! # Remote Cursors
//!
//! Turns awareness state published by other participants into decorations
//! the rendering layer can paint over the local tree.
//!
//! ## Flow
//!
//! ```text
//! transport ── AwarenessUpdate ──→ RemoteCursors ──┐
//!                                                   ├──→ decorations()
//! Document (current tree) ─────────────────────────┘
//! ```
//!
//! Decorations are computed lazily against the tree they are given. A cursor
//! whose anchor or focus no longer resolves is left out instead of being
//! clamped to some nearby position.

use crate::document::Document;
use crate::selection::{Point, Selection};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Replica client identifier (the replicated document's client id)
pub type ClientId = u64;

const CURSOR_NAMES: &[&str] = &[
    "Heron", "Otter", "Lynx", "Marten", "Wren", "Ibex", "Puffin", "Stoat", "Kestrel", "Newt",
];

const CURSOR_COLORS: &[&str] = &[
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990",
    "#9a6324", "#800000",
];

/// Display data a participant publishes alongside its selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub name: String,
    pub color: String,
}

impl CursorData {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    /// A random name and color from a fixed palette
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let name = CURSOR_NAMES.choose(&mut rng).copied().unwrap_or("Guest");
        let color = CURSOR_COLORS.choose(&mut rng).copied().unwrap_or("#000000");
        Self::new(format!("Anonymous {}", name), color)
    }
}

/// One participant's entry on the awareness channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessEntry {
    pub client_id: ClientId,

    #[serde(flatten)]
    pub data: CursorData,

    #[serde(default)]
    pub selection: Option<Selection>,
}

/// A batch of awareness changes as delivered by the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwarenessUpdate {
    #[serde(default)]
    pub added: Vec<AwarenessEntry>,

    #[serde(default)]
    pub updated: Vec<AwarenessEntry>,

    #[serde(default)]
    pub removed: Vec<ClientId>,
}

impl AwarenessUpdate {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Last known state of one remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCursorState {
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
    pub selection: Option<Selection>,
}

impl From<AwarenessEntry> for RemoteCursorState {
    fn from(entry: AwarenessEntry) -> Self {
        Self {
            client_id: entry.client_id,
            name: entry.data.name,
            color: entry.data.color,
            selection: entry.selection,
        }
    }
}

/// A highlighted range for one remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub start: Point,
    pub end: Point,
    /// Where the participant's caret is drawn (their focus)
    pub caret: Point,
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
}

/// A caret for one remote participant, highlighted range or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caret {
    pub point: Point,
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
}

/// Awareness state of every remote participant, in first-seen order
#[derive(Debug)]
pub struct RemoteCursors {
    local_client: ClientId,
    states: IndexMap<ClientId, RemoteCursorState>,
    generation: u64,
}

impl RemoteCursors {
    pub fn new(local_client: ClientId) -> Self {
        Self {
            local_client,
            states: IndexMap::new(),
            generation: 0,
        }
    }

    /// Apply an awareness change. Entries for the local client are ignored.
    /// Returns whether anything changed.
    pub fn apply(&mut self, update: AwarenessUpdate) -> bool {
        let mut changed = false;

        for entry in update.added.into_iter().chain(update.updated) {
            if entry.client_id == self.local_client {
                continue;
            }
            let state = RemoteCursorState::from(entry);
            if self.states.get(&state.client_id) != Some(&state) {
                self.states.insert(state.client_id, state);
                changed = true;
            }
        }

        for client_id in update.removed {
            changed |= self.states.shift_remove(&client_id).is_some();
        }

        if changed {
            self.generation += 1;
        }
        changed
    }

    /// Drop every remote participant (the channel went away)
    pub fn clear(&mut self) {
        if !self.states.is_empty() {
            self.states.clear();
            self.generation += 1;
        }
    }

    pub fn get(&self, client_id: ClientId) -> Option<&RemoteCursorState> {
        self.states.get(&client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteCursorState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Bumped on every change; renderers compare it to skip redundant work
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Highlight ranges for every participant with a non-empty selection
    /// that resolves in `doc`. Calling again restarts the projection.
    pub fn decorations<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = Decoration> + 'a {
        self.states.values().filter_map(move |state| {
            let selection = state.selection.as_ref()?;
            if selection.is_collapsed() {
                return None;
            }
            if !doc.resolves(&selection.anchor) || !doc.resolves(&selection.focus) {
                debug!(
                    client_id = state.client_id,
                    "Dropping remote selection that no longer resolves"
                );
                return None;
            }

            Some(Decoration {
                start: selection.start().clone(),
                end: selection.end().clone(),
                caret: selection.focus.clone(),
                client_id: state.client_id,
                name: state.name.clone(),
                color: state.color.clone(),
            })
        })
    }

    /// One caret per participant whose focus resolves in `doc`
    pub fn carets<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = Caret> + 'a {
        self.states.values().filter_map(move |state| {
            let focus = &state.selection.as_ref()?.focus;
            doc.resolves(focus).then(|| Caret {
                point: focus.clone(),
                client_id: state.client_id,
                name: state.name.clone(),
                color: state.color.clone(),
            })
        })
    }
}

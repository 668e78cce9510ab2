//! # Replica Binding
//!
//! Binds the local document to a `yrs` document shared with collaborators.
//!
//! The shared document holds one array, `content`, with one map per
//! top-level block:
//!
//! ```text
//! content ─┬─ { type: "paragraph", align?: "center", text: YText }
//!          └─ { type: "bulleted-list", children: [ { type: "list-item", text: YText } ] }
//! ```
//!
//! Inline runs live in the block's `YText`, each mark stored as a formatting
//! attribute, so concurrent typing in one block merges character by
//! character. Local edits touch only the blocks, characters and attributes
//! that changed. Offsets handed to `yrs` are UTF-8 byte offsets.
//!
//! Garbage collection is disabled so that a snapshot of any past state can
//! still be turned back into content.

use crate::node::{Block, Mark, Marks, Node, Text};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use yrs::types::text::YChange;
use yrs::types::Attrs;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::{Encode, Encoder, EncoderV1};
use yrs::{
    Any, Array, ArrayPrelim, ArrayRef, Doc, GetString, Map, MapPrelim, MapRef, Options, Out,
    ReadTxn, Snapshot, StateVector, Text as _, TextPrelim, TextRef, Transact, TransactionMut,
    Update,
};

/// Name of the shared array holding the document content
pub const CONTENT: &str = "content";

const TYPE: &str = "type";
const ALIGN: &str = "align";
const TEXT: &str = "text";
const CHILDREN: &str = "children";

/// Errors that can occur during replica operations.
#[derive(Debug, thiserror::Error)]
pub enum CrdtError {
    #[error("Failed to decode: {0}")]
    DecodeError(String),

    #[error("Failed to apply update: {0}")]
    ApplyError(String),

    #[error("Failed to restore snapshot: {0}")]
    SnapshotError(String),

    #[error("Unexpected value in shared content: {0}")]
    UnexpectedValue(String),

    #[error("Invalid block attribute: {0}")]
    Json(#[from] serde_json::Error),
}

/// The local participant's copy of the shared document
pub struct YrsReplica {
    doc: Doc,
    content: ArrayRef,
}

impl YrsReplica {
    /// Create an empty replica with a random client id
    pub fn new() -> Self {
        Self::with_options(Options {
            skip_gc: true,
            ..Options::default()
        })
    }

    /// Create an empty replica with a fixed client id
    pub fn with_client_id(client_id: u64) -> Self {
        Self::with_options(Options {
            client_id,
            skip_gc: true,
            ..Options::default()
        })
    }

    fn with_options(options: Options) -> Self {
        let doc = Doc::with_options(options);
        let content = doc.get_or_insert_array(CONTENT);
        Self { doc, content }
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Blocks currently held by the shared document
    pub fn materialize(&self) -> Result<Vec<Node>, CrdtError> {
        let txn = self.doc.transact();
        let blocks = read_blocks(&self.content, &txn)?;
        Ok(blocks.into_iter().map(Node::Block).collect())
    }

    /// Write the local blocks into the shared document. Returns the update
    /// to broadcast, or `None` if the shared document already matches.
    pub fn write_local(&mut self, blocks: &[Node]) -> Result<Option<Vec<u8>>, CrdtError> {
        let before: StateVector;
        {
            let mut txn = self.doc.transact_mut();
            before = txn.state_vector();
            if !sync_blocks(&mut txn, &self.content, blocks)? {
                return Ok(None);
            }
        }
        debug!(client_id = self.client_id(), "Wrote local blocks");

        let txn = self.doc.transact();
        Ok(Some(txn.encode_state_as_update_v1(&before)))
    }

    /// Merge an update received from a collaborator
    pub fn apply_remote_update(&mut self, update: &[u8]) -> Result<(), CrdtError> {
        let update =
            Update::decode_v1(update).map_err(|e| CrdtError::DecodeError(e.to_string()))?;

        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| CrdtError::ApplyError(e.to_string()))?;
        Ok(())
    }

    /// Whether no change, local or remote, has ever reached this replica
    pub fn is_pristine(&self) -> bool {
        self.doc.transact().state_vector().is_empty()
    }

    /// Encode the full document state.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode a snapshot of the current state
    pub fn snapshot(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.snapshot().encode_v1()
    }

    /// Blocks the shared document held when `snapshot` was taken
    pub fn materialize_snapshot(&self, snapshot: &[u8]) -> Result<Vec<Node>, CrdtError> {
        let snapshot =
            Snapshot::decode_v1(snapshot).map_err(|e| CrdtError::DecodeError(e.to_string()))?;

        let mut encoder = EncoderV1::new();
        self.doc
            .transact()
            .encode_state_from_snapshot(&snapshot, &mut encoder)
            .map_err(|e| CrdtError::SnapshotError(e.to_string()))?;
        let update = Update::decode_v1(&encoder.to_vec())
            .map_err(|e| CrdtError::DecodeError(e.to_string()))?;

        let past = YrsReplica::new();
        past.doc
            .transact_mut()
            .apply_update(update)
            .map_err(|e| CrdtError::ApplyError(e.to_string()))?;
        past.materialize()
    }
}

impl Default for YrsReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for YrsReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YrsReplica")
            .field("client_id", &self.client_id())
            .finish_non_exhaustive()
    }
}

// Reading

fn read_blocks<T: ReadTxn>(array: &ArrayRef, txn: &T) -> Result<Vec<Block>, CrdtError> {
    array
        .iter(txn)
        .map(|value| match value {
            Out::YMap(map) => read_block(&map, txn),
            other => Err(unexpected(Some(other))),
        })
        .collect()
}

fn read_block<T: ReadTxn>(map: &MapRef, txn: &T) -> Result<Block, CrdtError> {
    let kind = match map.get(txn, TYPE) {
        Some(Out::Any(Any::String(name))) => parse_name(&name)?,
        other => return Err(unexpected(other)),
    };
    let align = match map.get(txn, ALIGN) {
        None => None,
        Some(Out::Any(Any::String(name))) => Some(parse_name(&name)?),
        other => return Err(unexpected(other)),
    };
    let children = match (map.get(txn, TEXT), map.get(txn, CHILDREN)) {
        (Some(Out::YText(text)), _) => read_runs(&text, txn)
            .into_iter()
            .map(Node::Text)
            .collect(),
        (_, Some(Out::YArray(children))) => read_blocks(&children, txn)?
            .into_iter()
            .map(Node::Block)
            .collect(),
        (text, _) => return Err(unexpected(text)),
    };

    Ok(Block {
        kind,
        align,
        children,
    })
}

/// Inline runs of a block, merged by marks. Never empty.
fn read_runs<T: ReadTxn>(text: &TextRef, txn: &T) -> Vec<Text> {
    let mut runs: Vec<Text> = Vec::new();
    for chunk in text.diff(txn, YChange::identity) {
        let chunk_text = match chunk.insert {
            Out::Any(Any::String(s)) => s,
            _ => continue,
        };
        let marks = chunk
            .attributes
            .map(|attrs| marks_from_attrs(&attrs))
            .unwrap_or_default();

        match runs.last_mut() {
            Some(last) if last.marks == marks => last.text.push_str(&chunk_text),
            _ => runs.push(Text {
                text: chunk_text.to_string(),
                marks,
            }),
        }
    }
    if runs.is_empty() {
        runs.push(Text::default());
    }
    runs
}

fn marks_from_attrs(attrs: &Attrs) -> Marks {
    attrs
        .iter()
        .filter(|(_, value)| **value == Any::Bool(true))
        .filter_map(|(key, _)| key.parse::<Mark>().ok())
        .collect()
}

fn parse_name<T: DeserializeOwned>(name: &str) -> Result<T, CrdtError> {
    Ok(serde_json::from_value(serde_json::Value::String(
        name.to_string(),
    ))?)
}

fn unexpected(value: Option<Out>) -> CrdtError {
    CrdtError::UnexpectedValue(format!("{:?}", value))
}

// Writing

/// Attributes giving a run exactly `marks`; absent marks are cleared
fn mark_attrs(marks: &Marks) -> Attrs {
    Mark::ALL
        .iter()
        .map(|mark| {
            let value = if marks.contains(*mark) {
                Any::Bool(true)
            } else {
                Any::Null
            };
            (Arc::from(mark.as_str()), value)
        })
        .collect()
}

fn insert_block(txn: &mut TransactionMut, array: &ArrayRef, index: u32, block: &Block) {
    let map = array.insert(txn, index, MapPrelim::default());
    map.insert(txn, TYPE, block.kind.as_str());
    if let Some(align) = block.align {
        map.insert(txn, ALIGN, align.as_str());
    }

    if block.has_inline_children() {
        let text = map.insert(txn, TEXT, TextPrelim::new(""));
        let mut offset = 0;
        for run in block.children.iter().filter_map(Node::as_text) {
            text.insert_with_attributes(txn, offset, &run.text, mark_attrs(&run.marks));
            offset += run.text.len() as u32;
        }
    } else {
        let children = map.insert(txn, CHILDREN, ArrayPrelim::default());
        for (index, child) in block.children.iter().filter_map(Node::as_block).enumerate() {
            insert_block(txn, &children, index as u32, child);
        }
    }
}

/// Make `array` hold `nodes`. Unchanged blocks at either end are left alone
/// and the blocks between them are updated in place where their shape
/// allows. Returns whether anything was written.
fn sync_blocks(
    txn: &mut TransactionMut,
    array: &ArrayRef,
    nodes: &[Node],
) -> Result<bool, CrdtError> {
    let current = read_blocks(array, &*txn)?;
    let next: Vec<&Block> = nodes.iter().filter_map(Node::as_block).collect();

    let prefix = current
        .iter()
        .zip(&next)
        .take_while(|(a, b)| a == *b)
        .count();
    let suffix = current[prefix..]
        .iter()
        .rev()
        .zip(next[prefix..].iter().rev())
        .take_while(|(a, b)| a == *b)
        .count();
    let removed = current.len() - prefix - suffix;
    let inserted = next.len() - prefix - suffix;
    let paired = removed.min(inserted);

    let mut changed = false;
    for index in prefix..prefix + paired {
        let map = match array.get(&*txn, index as u32) {
            Some(Out::YMap(map)) => map,
            other => return Err(unexpected(other)),
        };
        match update_block(txn, &map, &current[index], next[index])? {
            Some(updated) => changed |= updated,
            None => {
                array.remove(txn, index as u32);
                insert_block(txn, array, index as u32, next[index]);
                changed = true;
            }
        }
    }

    let at = prefix + paired;
    if removed > paired {
        array.remove_range(txn, at as u32, (removed - paired) as u32);
        changed = true;
    }
    for (offset, block) in next[at..next.len() - suffix].iter().enumerate() {
        insert_block(txn, array, (at + offset) as u32, block);
        changed = true;
    }
    Ok(changed)
}

/// Update one block map in place. `None` if the map holds the other kind of
/// content (runs vs. child blocks) and must be replaced.
fn update_block(
    txn: &mut TransactionMut,
    map: &MapRef,
    current: &Block,
    next: &Block,
) -> Result<Option<bool>, CrdtError> {
    let mut changed = match (
        map.get(&*txn, TEXT),
        map.get(&*txn, CHILDREN),
        next.has_inline_children(),
    ) {
        (Some(Out::YText(text)), _, true) => sync_runs(txn, &text, &next.children),
        (_, Some(Out::YArray(children)), false) => sync_blocks(txn, &children, &next.children)?,
        _ => return Ok(None),
    };

    if current.kind != next.kind {
        map.insert(txn, TYPE, next.kind.as_str());
        changed = true;
    }
    if current.align != next.align {
        match next.align {
            Some(align) => {
                map.insert(txn, ALIGN, align.as_str());
            }
            None => {
                map.remove(txn, ALIGN);
            }
        }
        changed = true;
    }
    Ok(Some(changed))
}

/// Make `text` hold the runs in `nodes`: the changed middle of the string is
/// replaced, then marks are reformatted wherever they differ
fn sync_runs(txn: &mut TransactionMut, text: &TextRef, nodes: &[Node]) -> bool {
    let runs: Vec<&Text> = nodes.iter().filter_map(Node::as_text).collect();
    let target: String = runs.iter().map(|run| run.text.as_str()).collect();
    let current = text.get_string(&*txn);

    let (prefix, suffix) = common_affixes(&current, &target);
    let removed = current.len() - prefix - suffix;
    let inserted_end = target.len() - suffix;
    let mut changed = false;

    if removed > 0 {
        text.remove_range(txn, prefix as u32, removed as u32);
        changed = true;
    }

    let mut run_start = 0;
    let mut at = prefix;
    for run in &runs {
        let run_end = run_start + run.text.len();
        let from = run_start.max(prefix);
        let to = run_end.min(inserted_end);
        if from < to {
            let piece = &run.text[from - run_start..to - run_start];
            text.insert_with_attributes(txn, at as u32, piece, mark_attrs(&run.marks));
            at += piece.len();
            changed = true;
        }
        run_start = run_end;
    }

    let stored = read_runs(text, &*txn);
    for (start, end, marks) in mark_changes(&stored, &runs) {
        text.format(txn, start as u32, (end - start) as u32, mark_attrs(marks));
        changed = true;
    }
    changed
}

/// Byte lengths of the longest common prefix and suffix, on char boundaries
fn common_affixes(a: &str, b: &str) -> (usize, usize) {
    let prefix: usize = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum();
    let suffix: usize = a[prefix..]
        .chars()
        .rev()
        .zip(b[prefix..].chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum();
    (prefix, suffix)
}

/// Byte ranges where the stored marks differ from the wanted ones, with the
/// marks each range should get. Both run lists cover the same string.
fn mark_changes<'a>(stored: &[Text], wanted: &[&'a Text]) -> Vec<(usize, usize, &'a Marks)> {
    let mut boundaries: Vec<usize> = run_ends(stored.iter())
        .chain(run_ends(wanted.iter().copied()))
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut changes: Vec<(usize, usize, &'a Marks)> = Vec::new();
    let mut start = 0;
    for end in boundaries {
        if end == start {
            continue;
        }
        if let (Some(have), Some(want)) = (
            marks_at(stored.iter(), start),
            marks_at(wanted.iter().copied(), start),
        ) {
            if have != want {
                match changes.last_mut() {
                    Some(last) if last.1 == start && last.2 == want => last.1 = end,
                    _ => changes.push((start, end, want)),
                }
            }
        }
        start = end;
    }
    changes
}

fn run_ends<'a>(runs: impl Iterator<Item = &'a Text> + 'a) -> impl Iterator<Item = usize> + 'a {
    runs.scan(0, |end, run| {
        *end += run.text.len();
        Some(*end)
    })
}

fn marks_at<'a>(runs: impl Iterator<Item = &'a Text>, offset: usize) -> Option<&'a Marks> {
    let mut start = 0;
    for run in runs {
        let end = start + run.text.len();
        if offset < end {
            return Some(&run.marks);
        }
        start = end;
    }
    None
}

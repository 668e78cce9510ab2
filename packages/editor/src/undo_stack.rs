//! # Undo/Redo Stack
//!
//! Tracks locally-originated mutation history and enables undo/redo.
//!
//! ## Design
//!
//! - The document records each committed mutation with its inverse
//! - One user action (a command, a typed run) becomes one batch
//! - Undo applies the batch's inverses, newest first, and moves it to redo
//! - Redo reapplies the original mutations
//! - New batches clear the redo stack
//! - Content adopted from collaborators is never recorded; stored batches
//!   are moved past it, and batches whose targets it removed are dropped
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! let mut doc = Document::new();
//!
//! commands::insert_text(&mut doc, "hello")?;
//! stack.record(doc.take_operations());
//!
//! stack.undo(&mut doc)?;
//! stack.redo(&mut doc)?;
//! ```

use crate::document::Document;
use crate::mutations::{AppliedMutation, Mutation, MutationError};

/// A group of mutations that should be undone/redone together
#[derive(Debug, Clone)]
pub struct MutationBatch {
    /// The mutations in this batch (in application order)
    pub mutations: Vec<Mutation>,

    /// The inverse mutations (in reverse order for undo)
    pub inverses: Vec<Mutation>,

    /// Optional description of this batch
    pub description: Option<String>,
}

impl MutationBatch {
    /// Create a batch from committed mutations
    pub fn from_applied(applied: Vec<AppliedMutation>) -> Self {
        let mut mutations = Vec::with_capacity(applied.len());
        let mut inverses = Vec::with_capacity(applied.len());
        for AppliedMutation { mutation, inverse } in applied {
            mutations.push(mutation);
            inverses.push(inverse);
        }
        inverses.reverse();

        Self {
            mutations,
            inverses,
            description: None,
        }
    }

    /// Add a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn transform(&self, ops: &[AppliedMutation]) -> Option<Self> {
        let through = |mutation: &Mutation| {
            ops.iter()
                .try_fold(mutation.clone(), |mutation, op| mutation.transform(&op.mutation))
        };

        Some(Self {
            mutations: self.mutations.iter().map(through).collect::<Option<_>>()?,
            inverses: self.inverses.iter().map(through).collect::<Option<_>>()?,
            description: self.description.clone(),
        })
    }
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack {
    /// Stack of applied batches (most recent last)
    undo_stack: Vec<MutationBatch>,

    /// Stack of undone batches (most recent last)
    redo_stack: Vec<MutationBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    /// Create an undo stack with custom max levels
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Record the mutations of one user action as a single undo step
    pub fn record(&mut self, applied: Vec<AppliedMutation>) {
        if applied.is_empty() {
            return;
        }
        self.push_batch(MutationBatch::from_applied(applied));
    }

    /// Record with a description
    pub fn record_described(&mut self, applied: Vec<AppliedMutation>, description: &str) {
        if applied.is_empty() {
            return;
        }
        self.push_batch(MutationBatch::from_applied(applied).with_description(description));
    }

    /// Push a batch to the undo stack
    fn push_batch(&mut self, batch: MutationBatch) {
        self.undo_stack.push(batch);

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // Clear redo stack (new action invalidates future)
        self.redo_stack.clear();
    }

    /// Move every stored batch past mutations that did not originate here
    pub fn rebase(&mut self, foreign: &[AppliedMutation]) {
        if foreign.is_empty() {
            return;
        }
        let keep = |stack: &mut Vec<MutationBatch>| {
            *stack = stack
                .iter()
                .filter_map(|batch| batch.transform(foreign))
                .collect();
        };
        keep(&mut self.undo_stack);
        keep(&mut self.redo_stack);
    }

    /// Undo the most recent batch
    pub fn undo(&mut self, doc: &mut Document) -> Result<bool, MutationError> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(false); // Nothing to undo
        };

        doc.without_normalizing(|doc| {
            batch
                .inverses
                .iter()
                .try_for_each(|inverse| doc.apply(inverse.clone()))
        })?;

        // Move to redo stack
        self.redo_stack.push(batch);
        Ok(true)
    }

    /// Redo the most recently undone batch
    pub fn redo(&mut self, doc: &mut Document) -> Result<bool, MutationError> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(false); // Nothing to redo
        };

        doc.without_normalizing(|doc| {
            batch
                .mutations
                .iter()
                .try_for_each(|mutation| doc.apply(mutation.clone()))
        })?;

        // Move back to undo stack
        self.undo_stack.push(batch);
        Ok(true)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the number of undo levels available
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the number of redo levels available
    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get description of the next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use crate::node::{Block, BlockKind, Mark, Node, Text};
    use crate::selection::{Point, Selection};

    fn doc_with(text: &str) -> Document {
        Document::with_children(vec![Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![Node::Text(Text::new(text))],
        ))])
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_undo_and_redo_mark_toggle() {
        let mut doc = doc_with("Hello world");
        let original = doc.children().to_vec();
        let mut stack = UndoStack::new();

        doc.select(Some(Selection::new(
            Point::new(vec![0, 0], 0),
            Point::new(vec![0, 0], 5),
        )));
        commands::toggle_mark(&mut doc, Mark::Bold).unwrap();
        stack.record_described(doc.take_operations(), "Bold");
        let bolded = doc.children().to_vec();

        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.undo_description(), Some("Bold"));

        assert!(stack.undo(&mut doc).unwrap());
        doc.take_operations();
        assert_eq!(doc.children(), original.as_slice());
        assert!(stack.can_redo());

        assert!(stack.redo(&mut doc).unwrap());
        doc.take_operations();
        assert_eq!(doc.children(), bolded.as_slice());
    }

    #[test]
    fn test_new_batch_clears_redo() {
        let mut doc = doc_with("Hello");
        let mut stack = UndoStack::new();

        doc.apply(Mutation::InsertText {
            path: vec![0, 0],
            offset: 5,
            text: "!".to_string(),
        })
        .unwrap();
        stack.record(doc.take_operations());
        stack.undo(&mut doc).unwrap();
        doc.take_operations();
        assert_eq!(stack.redo_levels(), 1);

        doc.apply(Mutation::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "Oh, ".to_string(),
        })
        .unwrap();
        stack.record(doc.take_operations());
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut doc = doc_with("Hello");
        let mut stack = UndoStack::with_max_levels(2);

        for i in 0..3 {
            doc.apply(Mutation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: format!("{}", i),
            })
            .unwrap();
            stack.record(doc.take_operations());
        }

        // Should only keep 2 (max levels)
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_rebase_shifts_past_foreign_insert() {
        let mut doc = doc_with("Hello");
        let mut stack = UndoStack::new();

        doc.apply(Mutation::InsertText {
            path: vec![0, 0],
            offset: 5,
            text: "!".to_string(),
        })
        .unwrap();
        stack.record(doc.take_operations());

        // a collaborator adds a block in front
        let mut blocks = vec![Node::Block(Block::empty_paragraph())];
        blocks.extend(doc.children().iter().cloned());
        doc.replace_blocks(blocks).unwrap();
        stack.rebase(&doc.take_operations());

        assert!(stack.undo(&mut doc).unwrap());
        assert_eq!(doc.plain_text(), "\nHello");
    }

    #[test]
    fn test_rebase_drops_batches_in_replaced_blocks() {
        let mut doc = doc_with("Hello");
        let mut stack = UndoStack::new();

        doc.apply(Mutation::InsertText {
            path: vec![0, 0],
            offset: 5,
            text: "!".to_string(),
        })
        .unwrap();
        stack.record(doc.take_operations());

        doc.replace_blocks(vec![Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![Node::Text(Text::new("Rewritten"))],
        ))])
        .unwrap();
        stack.rebase(&doc.take_operations());

        assert!(!stack.can_undo());
    }
}

//! # Document
//!
//! The local document tree and its single commit path.
//!
//! Every change goes through [`Document::apply`]:
//!
//! ```text
//! Mutation → validate → invert → apply → transform selection → mark dirty
//!                                                                  ↓
//!                                      normalize (unless batching) ← ┘
//! ```
//!
//! The tree is never mutated any other way, so the root invariant (at least
//! one block) holds whenever control returns to the caller.

use crate::mutations::{transform_path, AppliedMutation, Mutation, MutationError};
use crate::node::{Block, Marks, Node, Text};
use crate::normalize::NormalizationEngine;
use crate::path::{self, Path};
use crate::selection::{Point, Selection};
use std::cmp::Ordering;
use tracing::debug;

/// Iterations allowed per dirty path before normalization is considered stuck
const NORMALIZE_ITERATIONS_PER_PATH: usize = 42;

/// Editable rich-text document
#[derive(Debug)]
pub struct Document {
    children: Vec<Node>,

    /// Current version number (increments on each committed mutation)
    pub version: u64,

    selection: Option<Selection>,

    /// Marks applied to the next inserted text (collapsed toggles)
    pending_marks: Option<Marks>,

    engine: NormalizationEngine,
    dirty: Vec<Path>,
    batch_depth: usize,
    normalizing: bool,

    /// Committed mutations not yet taken by the history
    operations: Vec<AppliedMutation>,
}

impl Document {
    /// Create an empty document, normalized to a single empty paragraph
    pub fn new() -> Self {
        Self::with_children(Vec::new())
    }

    /// Create a document from existing content. The content is normalized
    /// before it is returned; those repairs are not part of its history.
    pub fn with_children(children: Vec<Node>) -> Self {
        let mut dirty = vec![Path::new()];
        for (index, child) in children.iter().enumerate() {
            collect_paths(child, vec![index], &mut dirty);
        }

        let mut doc = Self {
            children,
            version: 0,
            selection: None,
            pending_marks: None,
            engine: NormalizationEngine::new(),
            dirty,
            batch_depth: 0,
            normalizing: false,
            operations: Vec::new(),
        };
        doc.normalize();
        doc.operations.clear();
        doc.version = 0;
        doc
    }

    /// Parse a document from its JSON child list
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::with_children(serde_json::from_str(json)?))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.children)
    }

    /// Top-level blocks
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_at(&self.children, path)
    }

    pub fn text(&self, path: &[usize]) -> Option<&Text> {
        self.node(path)?.as_text()
    }

    pub fn block(&self, path: &[usize]) -> Option<&Block> {
        self.node(path)?.as_block()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Replace the selection. Pending marks belong to the old caret and go.
    pub fn select(&mut self, selection: Option<Selection>) {
        self.selection = selection;
        self.pending_marks = None;
    }

    pub fn pending_marks(&self) -> Option<&Marks> {
        self.pending_marks.as_ref()
    }

    pub fn set_pending_marks(&mut self, marks: Option<Marks>) {
        self.pending_marks = marks;
    }

    /// Whether `point` addresses a text node and lies within it
    pub fn resolves(&self, point: &Point) -> bool {
        self.text(&point.path)
            .is_some_and(|text| point.offset <= text.len())
    }

    /// Commit a mutation.
    ///
    /// The mutation is validated against the current tree; an invalid
    /// mutation leaves the document untouched. Outside of a batch the tree
    /// is normalized before this returns.
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), MutationError> {
        let inverse = mutation.to_inverse(&self.children)?;
        mutation.apply(&mut self.children)?;
        self.version += 1;

        self.transform_selection(&mutation);

        let mut dirty: Vec<Path> = self
            .dirty
            .iter()
            .filter_map(|path| transform_path(path, &mutation))
            .collect();
        for path in mutation.dirty_paths() {
            if !dirty.contains(&path) {
                dirty.push(path);
            }
        }
        self.dirty = dirty;

        self.operations.push(AppliedMutation { mutation, inverse });

        if self.batch_depth == 0 {
            self.normalize();
        }
        Ok(())
    }

    /// Run `f` with normalization deferred until the outermost batch ends
    pub fn without_normalizing<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.normalize();
        }
        result
    }

    /// Repair every dirty path until no rule fires.
    ///
    /// # Panics
    ///
    /// Panics if the rules do not converge, which means two rules undo each
    /// other's repairs.
    pub fn normalize(&mut self) {
        if self.normalizing || self.dirty.is_empty() {
            return;
        }
        self.normalizing = true;

        let max_iterations = self.dirty.len() * NORMALIZE_ITERATIONS_PER_PATH;
        let mut iterations = 0;

        while let Some(dirty_path) = self.dirty.pop() {
            if iterations > max_iterations {
                panic!(
                    "Normalization did not converge after {} iterations",
                    max_iterations
                );
            }

            if let Some((rule, repair)) = self.engine.repair(&self.children, &dirty_path) {
                debug!(rule, op = repair.name(), path = ?repair.path(), "Normalization repair");
                if let Err(err) = self.apply(repair) {
                    panic!("Normalization rule {} produced an invalid repair: {}", rule, err);
                }
            }
            iterations += 1;
        }

        self.normalizing = false;
    }

    /// Take the committed mutations recorded since the last call
    pub fn take_operations(&mut self) -> Vec<AppliedMutation> {
        std::mem::take(&mut self.operations)
    }

    /// Replace the top-level blocks with `blocks`, touching only the range
    /// that differs. Used to adopt replicated or restored content.
    pub fn replace_blocks(&mut self, blocks: Vec<Node>) -> Result<(), MutationError> {
        let prefix = self
            .children
            .iter()
            .zip(&blocks)
            .take_while(|(a, b)| a == b)
            .count();
        let suffix = self.children[prefix..]
            .iter()
            .rev()
            .zip(blocks[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let removed = self.children.len() - prefix - suffix;
        let inserted = &blocks[prefix..blocks.len() - suffix];
        if removed == 0 && inserted.is_empty() {
            return Ok(());
        }

        self.without_normalizing(|doc| {
            for _ in 0..removed {
                doc.apply(Mutation::RemoveNode { path: vec![prefix] })?;
            }
            for (offset, node) in inserted.iter().enumerate() {
                doc.apply(Mutation::InsertNode {
                    path: vec![prefix + offset],
                    node: node.clone(),
                })?;
            }
            Ok(())
        })
    }

    /// All nodes in document order (pre-order), with their paths
    pub fn nodes(&self) -> Descendants<'_> {
        Descendants::new(&self.children)
    }

    /// All text nodes in document order
    pub fn texts(&self) -> impl Iterator<Item = (Path, &Text)> + '_ {
        self.nodes()
            .filter_map(|(path, node)| node.as_text().map(|text| (path, text)))
    }

    /// Nodes touched by the range `start..=end`, including the ancestors of
    /// both edges
    pub fn nodes_in_range<'a>(
        &'a self,
        start: &'a Point,
        end: &'a Point,
    ) -> impl Iterator<Item = (Path, &'a Node)> + 'a {
        self.nodes().filter(move |(node_path, _)| {
            path::compare(node_path, &start.path) != Ordering::Less
                && path::compare(node_path, &end.path) != Ordering::Greater
        })
    }

    /// Nearest ancestor block of `path` matching `predicate`, innermost first
    pub fn above<F>(&self, at: &[usize], predicate: F) -> Option<(Path, &Block)>
    where
        F: Fn(&Block) -> bool,
    {
        path::ancestors(at)
            .rev()
            .filter(|ancestor| !ancestor.is_empty())
            .find_map(|ancestor| {
                self.block(ancestor)
                    .filter(|block| predicate(block))
                    .map(|block| (ancestor.to_vec(), block))
            })
    }

    /// Pull the end of a range that "hangs" into the start of the next block
    /// back to the end of the last text it really covers.
    ///
    /// A triple-click selection of a paragraph ends at offset 0 of the
    /// following block; formatting it must not touch that block.
    pub fn unhang_range(&self, start: &Point, end: &Point) -> (Point, Point) {
        let unchanged = (start.clone(), end.clone());
        if start.offset != 0 || end.offset != 0 || start == end {
            return unchanged;
        }

        let block_path = path::parent(&end.path).unwrap_or(&[]);
        let covered: Vec<(Path, &Text)> = self
            .texts()
            .filter(|(text_path, _)| {
                !path::is_before(text_path, &start.path) && !path::is_after(text_path, &end.path)
            })
            .collect();

        covered
            .iter()
            .rev()
            .skip(1)
            .find(|(text_path, text)| !text.is_empty() || path::is_before(text_path, block_path))
            .map(|(text_path, text)| (start.clone(), Point::new(text_path.clone(), text.len())))
            .unwrap_or(unchanged)
    }

    /// Start and end of the current selection after unhanging
    pub fn selected_range(&self) -> Option<(Point, Point)> {
        let selection = self.selection.as_ref()?;
        Some(self.unhang_range(selection.start(), selection.end()))
    }

    /// Plain text of the whole document, one line per top-level block
    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .map(Node::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn transform_selection(&mut self, mutation: &Mutation) {
        let Some(selection) = self.selection.take() else {
            return;
        };

        let anchor = selection
            .anchor
            .transform(mutation)
            .or_else(|| self.relocate(mutation.path()));
        let focus = selection
            .focus
            .transform(mutation)
            .or_else(|| self.relocate(mutation.path()));

        self.selection = match (anchor, focus) {
            (Some(anchor), Some(focus)) => Some(Selection::new(anchor, focus)),
            _ => None,
        };
    }

    /// Where a point goes when the node holding it was removed from
    /// `removed`: the end of the previous text, else the start of the next
    fn relocate(&self, removed: &[usize]) -> Option<Point> {
        self.texts()
            .filter(|(text_path, _)| path::is_before(text_path, removed))
            .last()
            .map(|(text_path, text)| Point::new(text_path, text.len()))
            .or_else(|| {
                self.texts()
                    .find(|(text_path, _)| !path::is_before(text_path, removed))
                    .map(|(text_path, _)| Point::new(text_path, 0))
            })
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order walk over a node list
pub struct Descendants<'a> {
    stack: Vec<(Path, &'a Node)>,
}

impl<'a> Descendants<'a> {
    fn new(children: &'a [Node]) -> Self {
        let stack = children
            .iter()
            .enumerate()
            .rev()
            .map(|(index, node)| (vec![index], node))
            .collect();
        Self { stack }
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = (Path, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let (node_path, node) = self.stack.pop()?;
        for (index, child) in node.children().iter().enumerate().rev() {
            self.stack.push((path::child(&node_path, index), child));
        }
        Some((node_path, node))
    }
}

/// Node at `path` below a root child list. The empty path has no node.
pub fn node_at<'a>(root: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = root.get(*first)?;
    for index in rest {
        node = node.children().get(*index)?;
    }
    Some(node)
}

pub fn node_at_mut<'a>(root: &'a mut [Node], path: &[usize]) -> Option<&'a mut Node> {
    let (first, rest) = path.split_first()?;
    let mut node = root.get_mut(*first)?;
    for index in rest {
        node = node.as_block_mut()?.children.get_mut(*index)?;
    }
    Some(node)
}

/// Child list of the node at `path`; the empty path is the root itself
pub fn children_at_mut<'a>(root: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    if path.is_empty() {
        return Some(root);
    }
    node_at_mut(root, path)?
        .as_block_mut()
        .map(|block| &mut block.children)
}

fn collect_paths(node: &Node, at: Path, out: &mut Vec<Path>) {
    for (index, child) in node.children().iter().enumerate() {
        collect_paths(child, path::child(&at, index), out);
    }
    out.push(at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BlockKind, Mark};

    fn paragraph(texts: &[&str]) -> Node {
        Node::Block(Block::new(
            BlockKind::Paragraph,
            texts.iter().map(|t| Node::Text(Text::new(*t))).collect(),
        ))
    }

    #[test]
    fn test_new_document_has_one_empty_paragraph() {
        let doc = Document::new();
        assert_eq!(doc.children(), &[Node::Block(Block::empty_paragraph())]);
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn test_removing_last_block_is_repaired() {
        let mut doc = Document::with_children(vec![paragraph(&["hello"])]);
        doc.apply(Mutation::RemoveNode { path: vec![0] }).unwrap();

        assert_eq!(doc.children(), &[Node::Block(Block::empty_paragraph())]);
        // removal plus the repair insertion
        assert_eq!(doc.take_operations().len(), 2);
    }

    #[test]
    fn test_invalid_mutation_leaves_document_untouched() {
        let mut doc = Document::with_children(vec![paragraph(&["hello"])]);
        let result = doc.apply(Mutation::RemoveText {
            path: vec![0, 0],
            offset: 3,
            len: 10,
        });

        assert!(matches!(result, Err(MutationError::OffsetOutOfRange { .. })));
        assert_eq!(doc.version, 0);
        assert_eq!(doc.plain_text(), "hello");
    }

    #[test]
    fn test_batch_defers_normalization() {
        let mut doc = Document::with_children(vec![paragraph(&["ab"])]);

        doc.without_normalizing(|doc| {
            doc.apply(Mutation::SplitNode {
                path: vec![0, 0],
                position: 1,
            })
            .unwrap();
            // not merged back yet
            assert_eq!(doc.block(&[0]).unwrap().children.len(), 2);
        });

        // equal marks: merged once the batch ends
        assert_eq!(doc.block(&[0]).unwrap().children.len(), 1);
        assert_eq!(doc.plain_text(), "ab");
    }

    #[test]
    fn test_split_with_different_marks_survives() {
        let mut doc = Document::with_children(vec![paragraph(&["ab"])]);
        doc.without_normalizing(|doc| {
            doc.apply(Mutation::SplitNode {
                path: vec![0, 0],
                position: 1,
            })
            .unwrap();
            doc.apply(Mutation::SetMark {
                path: vec![0, 1],
                mark: Mark::Bold,
                active: true,
            })
            .unwrap();
        });

        assert_eq!(doc.block(&[0]).unwrap().children.len(), 2);
        assert!(doc.text(&[0, 1]).unwrap().marks.contains(Mark::Bold));
    }

    #[test]
    fn test_selection_follows_removed_block() {
        let mut doc = Document::with_children(vec![paragraph(&["one"]), paragraph(&["two"])]);
        doc.select(Some(Selection::collapsed(Point::new(vec![1, 0], 2))));

        doc.apply(Mutation::RemoveNode { path: vec![1] }).unwrap();

        assert_eq!(
            doc.selection(),
            Some(&Selection::collapsed(Point::new(vec![0, 0], 3)))
        );
    }

    #[test]
    fn test_nodes_in_range_include_ancestors() {
        let doc = Document::with_children(vec![
            paragraph(&["one"]),
            paragraph(&["two"]),
            paragraph(&["three"]),
        ]);
        let start = Point::new(vec![0, 0], 1);
        let end = Point::new(vec![1, 0], 1);

        let paths: Vec<Path> = doc.nodes_in_range(&start, &end).map(|(p, _)| p).collect();
        assert_eq!(paths, vec![vec![0], vec![0, 0], vec![1], vec![1, 0]]);
    }

    #[test]
    fn test_unhang_range_pulls_end_back() {
        let doc = Document::with_children(vec![paragraph(&["one"]), paragraph(&["two"])]);
        let (start, end) = doc.unhang_range(&Point::new(vec![0, 0], 0), &Point::new(vec![1, 0], 0));

        assert_eq!(start, Point::new(vec![0, 0], 0));
        assert_eq!(end, Point::new(vec![0, 0], 3));
    }

    #[test]
    fn test_unhang_range_from_later_run() {
        let styled = Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![
                Node::Text(Text::new("bold").with_mark(Mark::Bold)),
                Node::Text(Text::new("plain")),
            ],
        ));
        let doc = Document::with_children(vec![paragraph(&["one"]), styled]);
        let (_, end) = doc.unhang_range(&Point::new(vec![0, 0], 0), &Point::new(vec![1, 1], 0));

        assert_eq!(end, Point::new(vec![1, 0], 4));
    }

    #[test]
    fn test_replace_blocks_touches_only_changes() {
        let mut doc = Document::with_children(vec![
            paragraph(&["a"]),
            paragraph(&["b"]),
            paragraph(&["c"]),
        ]);
        doc.replace_blocks(vec![paragraph(&["a"]), paragraph(&["x"]), paragraph(&["c"])])
            .unwrap();

        assert_eq!(doc.plain_text(), "a\nx\nc");
        let ops = doc.take_operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].mutation, Mutation::RemoveNode { path: vec![1] });
    }

    #[test]
    fn test_above_finds_innermost_match() {
        let list = Node::Block(Block::new(
            BlockKind::BulletedList,
            vec![Node::Block(Block::new(
                BlockKind::ListItem,
                vec![Node::Text(Text::new("item"))],
            ))],
        ));
        let doc = Document::with_children(vec![list]);

        let (found, block) = doc.above(&[0, 0, 0], |_| true).unwrap();
        assert_eq!(found, vec![0, 0]);
        assert_eq!(block.kind, BlockKind::ListItem);

        let (found, _) = doc.above(&[0, 0, 0], |b| b.kind.is_list()).unwrap();
        assert_eq!(found, vec![0]);
    }
}

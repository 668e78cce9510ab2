//! # Tree Mutations
//!
//! Primitive operations on the document tree. Every change to a document,
//! whether typed locally, issued by a formatting command, produced by a
//! normalization repair or received from a collaborator, is expressed as a
//! sequence of these.
//!
//! ## Design Principles
//!
//! 1. **Validated**: a mutation is checked against the tree before it touches it
//! 2. **Invertible**: the inverse is computed against the pre-application tree
//! 3. **Transformable**: each mutation defines how paths shift around it, so
//!    selections and pending work survive the edit
//!
//! ## Coordinates
//!
//! - Text offsets and lengths count characters, not bytes
//! - `SplitNode`/`MergeNode` positions are character offsets for texts and
//!   child indices for blocks
//! - `MoveNode::new_path` is expressed in the tree *before* the node is
//!   removed, except between siblings, where it is the final position

use crate::document::{children_at_mut, node_at, node_at_mut};
use crate::node::{byte_index, Align, Block, BlockKind, Mark, Node, Text};
use crate::path::{self, Path};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primitive tree operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert a node so that it ends up at `path`
    InsertNode { path: Path, node: Node },

    /// Remove the node at `path` and its descendants
    RemoveNode { path: Path },

    /// Insert characters into a text node
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },

    /// Remove `len` characters from a text node
    RemoveText {
        path: Path,
        offset: usize,
        len: usize,
    },

    /// Split a node at `position`; the tail becomes the next sibling
    SplitNode { path: Path, position: usize },

    /// Merge a node into its previous sibling, whose length is `position`
    MergeNode { path: Path, position: usize },

    /// Move a node to `new_path`
    MoveNode { path: Path, new_path: Path },

    /// Change the kind of a block
    SetBlockKind { path: Path, kind: BlockKind },

    /// Set or clear the alignment of a block
    SetAlign { path: Path, align: Option<Align> },

    /// Turn a mark on or off for a text node
    SetMark { path: Path, mark: Mark, active: bool },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Node not found at {0:?}")]
    NodeNotFound(Path),

    #[error("Parent not found for {0:?}")]
    ParentNotFound(Path),

    #[error("Node at {0:?} is not text")]
    NotText(Path),

    #[error("Node at {0:?} is not a block")]
    NotBlock(Path),

    #[error("Offset {offset} out of range at {path:?} (length {len})")]
    OffsetOutOfRange {
        path: Path,
        offset: usize,
        len: usize,
    },

    #[error("The root cannot be the target of this mutation")]
    RootTarget,

    #[error("Would move a node into itself")]
    CycleDetected,

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

/// A committed mutation together with the mutation that undoes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMutation {
    pub mutation: Mutation,
    pub inverse: Mutation,
}

impl Mutation {
    /// The node this mutation targets
    pub fn path(&self) -> &[usize] {
        match self {
            Mutation::InsertNode { path, .. }
            | Mutation::RemoveNode { path }
            | Mutation::InsertText { path, .. }
            | Mutation::RemoveText { path, .. }
            | Mutation::SplitNode { path, .. }
            | Mutation::MergeNode { path, .. }
            | Mutation::MoveNode { path, .. }
            | Mutation::SetBlockKind { path, .. }
            | Mutation::SetAlign { path, .. }
            | Mutation::SetMark { path, .. } => path,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::InsertNode { .. } => "insert_node",
            Mutation::RemoveNode { .. } => "remove_node",
            Mutation::InsertText { .. } => "insert_text",
            Mutation::RemoveText { .. } => "remove_text",
            Mutation::SplitNode { .. } => "split_node",
            Mutation::MergeNode { .. } => "merge_node",
            Mutation::MoveNode { .. } => "move_node",
            Mutation::SetBlockKind { .. } => "set_block_kind",
            Mutation::SetAlign { .. } => "set_align",
            Mutation::SetMark { .. } => "set_mark",
        }
    }

    /// Apply to a root child list with validation
    pub(crate) fn apply(&self, root: &mut Vec<Node>) -> Result<(), MutationError> {
        self.validate(root)?;

        match self {
            Mutation::InsertNode { path, node } => {
                let (index, parent) = split_target(path)?;
                let children = children_at_mut(root, parent)
                    .ok_or_else(|| MutationError::ParentNotFound(path.clone()))?;
                children.insert(index, node.clone());
                Ok(())
            }

            Mutation::RemoveNode { path } => {
                Self::take_node(root, path)?;
                Ok(())
            }

            Mutation::InsertText { path, offset, text } => {
                let target = text_at_mut(root, path)?;
                let at = byte_index(&target.text, *offset);
                target.text.insert_str(at, text);
                Ok(())
            }

            Mutation::RemoveText { path, offset, len } => {
                let target = text_at_mut(root, path)?;
                let start = byte_index(&target.text, *offset);
                let end = byte_index(&target.text, offset + len);
                target.text.replace_range(start..end, "");
                Ok(())
            }

            Mutation::SplitNode { path, position } => {
                let node = node_at_mut(root, path)
                    .ok_or_else(|| MutationError::NodeNotFound(path.clone()))?;
                let tail = match node {
                    Node::Text(text) => {
                        let at = byte_index(&text.text, *position);
                        Node::Text(Text {
                            text: text.text.split_off(at),
                            marks: text.marks.clone(),
                        })
                    }
                    Node::Block(block) => Node::Block(Block {
                        kind: block.kind,
                        align: block.align,
                        children: block.children.split_off(*position),
                    }),
                };
                let (index, parent) = split_target(path)?;
                let siblings = children_at_mut(root, parent)
                    .ok_or_else(|| MutationError::ParentNotFound(path.clone()))?;
                siblings.insert(index + 1, tail);
                Ok(())
            }

            Mutation::MergeNode { path, .. } => {
                let node = Self::take_node(root, path)?;
                let previous = path::previous(path)
                    .ok_or_else(|| MutationError::NodeNotFound(path.clone()))?;
                let target = node_at_mut(root, &previous)
                    .ok_or_else(|| MutationError::NodeNotFound(previous.clone()))?;
                match (target, node) {
                    (Node::Text(target), Node::Text(text)) => target.text.push_str(&text.text),
                    (Node::Block(target), Node::Block(block)) => {
                        target.children.extend(block.children)
                    }
                    _ => {
                        return Err(MutationError::InvalidStructure(
                            "cannot merge a text with a block".to_string(),
                        ))
                    }
                }
                Ok(())
            }

            Mutation::MoveNode { .. } => self.move_node(root),

            Mutation::SetBlockKind { path, kind } => {
                block_at_mut(root, path)?.kind = *kind;
                Ok(())
            }

            Mutation::SetAlign { path, align } => {
                block_at_mut(root, path)?.align = *align;
                Ok(())
            }

            Mutation::SetMark { path, mark, active } => {
                text_at_mut(root, path)?.marks.set(*mark, *active);
                Ok(())
            }
        }
    }

    /// Validate without applying
    pub fn validate(&self, root: &[Node]) -> Result<(), MutationError> {
        match self {
            Mutation::InsertNode { path, .. } => {
                let (index, parent) = split_target(path)?;
                let children = children_at(root, parent)
                    .ok_or_else(|| MutationError::ParentNotFound(path.clone()))?;
                if index > children.len() {
                    return Err(MutationError::InvalidStructure(format!(
                        "insert position {:?} is past the end of its parent",
                        path
                    )));
                }
                Ok(())
            }

            Mutation::RemoveNode { path } => {
                if path.is_empty() {
                    return Err(MutationError::RootTarget);
                }
                existing(root, path).map(|_| ())
            }

            Mutation::InsertText { path, offset, .. } => {
                let text = text_at(root, path)?;
                check_offset(path, *offset, text.len())
            }

            Mutation::RemoveText { path, offset, len } => {
                let text = text_at(root, path)?;
                check_offset(path, offset + len, text.len())
            }

            Mutation::SplitNode { path, position } => {
                if path.is_empty() {
                    return Err(MutationError::RootTarget);
                }
                let node = existing(root, path)?;
                check_offset(path, *position, node.split_len())
            }

            Mutation::MergeNode { path, position } => {
                if path.is_empty() {
                    return Err(MutationError::RootTarget);
                }
                let node = existing(root, path)?;
                let previous = path::previous(path).ok_or_else(|| {
                    MutationError::InvalidStructure(format!("{:?} has no previous sibling", path))
                })?;
                let target = existing(root, &previous)?;
                if node.is_text() != target.is_text() {
                    return Err(MutationError::InvalidStructure(
                        "cannot merge a text with a block".to_string(),
                    ));
                }
                if target.split_len() != *position {
                    return Err(MutationError::InvalidStructure(format!(
                        "merge position {} does not match previous sibling length {}",
                        position,
                        target.split_len()
                    )));
                }
                Ok(())
            }

            Mutation::MoveNode { path, new_path } => {
                if path.is_empty() || new_path.is_empty() {
                    return Err(MutationError::RootTarget);
                }
                existing(root, path)?;
                if path::is_ancestor(path, new_path) {
                    return Err(MutationError::CycleDetected);
                }
                let parent = path::parent(new_path).unwrap_or(&[]);
                if children_at(root, parent).is_none() {
                    return Err(MutationError::ParentNotFound(new_path.clone()));
                }
                // the target index is only known once the node is detached
                self.move_node(&mut root.to_vec())
            }

            Mutation::SetBlockKind { path, .. } | Mutation::SetAlign { path, .. } => {
                block_at(root, path).map(|_| ())
            }

            Mutation::SetMark { path, .. } => text_at(root, path).map(|_| ()),
        }
    }

    /// Create the inverse mutation for undo. Must be called before applying.
    pub fn to_inverse(&self, root: &[Node]) -> Result<Mutation, MutationError> {
        self.validate(root)?;

        let inverse = match self {
            Mutation::InsertNode { path, .. } => Mutation::RemoveNode { path: path.clone() },

            Mutation::RemoveNode { path } => Mutation::InsertNode {
                path: path.clone(),
                node: existing(root, path)?.clone(),
            },

            Mutation::InsertText { path, offset, text } => Mutation::RemoveText {
                path: path.clone(),
                offset: *offset,
                len: text.chars().count(),
            },

            Mutation::RemoveText { path, offset, len } => {
                let text = text_at(root, path)?;
                Mutation::InsertText {
                    path: path.clone(),
                    offset: *offset,
                    text: text.text.chars().skip(*offset).take(*len).collect(),
                }
            }

            Mutation::SplitNode { path, position } => Mutation::MergeNode {
                path: path::next(path).ok_or(MutationError::RootTarget)?,
                position: *position,
            },

            Mutation::MergeNode { path, position } => Mutation::SplitNode {
                path: path::previous(path).ok_or(MutationError::RootTarget)?,
                position: *position,
            },

            Mutation::MoveNode { path, new_path } => {
                if path == new_path {
                    self.clone()
                } else if path::is_sibling(path, new_path) {
                    Mutation::MoveNode {
                        path: new_path.clone(),
                        new_path: path.clone(),
                    }
                } else {
                    let next = path::next(path).ok_or(MutationError::RootTarget)?;
                    Mutation::MoveNode {
                        path: transform_path(path, self).ok_or(MutationError::CycleDetected)?,
                        new_path: transform_path(&next, self)
                            .ok_or(MutationError::CycleDetected)?,
                    }
                }
            }

            Mutation::SetBlockKind { path, .. } => Mutation::SetBlockKind {
                path: path.clone(),
                kind: block_at(root, path)?.kind,
            },

            Mutation::SetAlign { path, .. } => Mutation::SetAlign {
                path: path.clone(),
                align: block_at(root, path)?.align,
            },

            Mutation::SetMark { path, mark, .. } => Mutation::SetMark {
                path: path.clone(),
                mark: *mark,
                active: text_at(root, path)?.marks.contains(*mark),
            },
        };

        Ok(inverse)
    }

    /// Paths whose nodes may have become invalid after this mutation
    pub fn dirty_paths(&self) -> Vec<Path> {
        match self {
            Mutation::InsertText { path, .. }
            | Mutation::RemoveText { path, .. }
            | Mutation::SetBlockKind { path, .. }
            | Mutation::SetAlign { path, .. }
            | Mutation::SetMark { path, .. } => with_ancestors(path),

            Mutation::InsertNode { path, node } => {
                let mut dirty = with_ancestors(path);
                collect_descendants(node, path, &mut dirty);
                dirty
            }

            Mutation::RemoveNode { path } => path::ancestors(path).map(<[usize]>::to_vec).collect(),

            Mutation::SplitNode { path, .. } => {
                let mut dirty = with_ancestors(path);
                dirty.extend(path::next(path));
                dirty
            }

            Mutation::MergeNode { path, .. } => {
                let mut dirty: Vec<Path> = path::ancestors(path).map(<[usize]>::to_vec).collect();
                dirty.extend(path::previous(path));
                dirty
            }

            Mutation::MoveNode { path, new_path } => {
                if path == new_path {
                    return Vec::new();
                }
                let mut dirty: Vec<Path> = path::ancestors(path)
                    .filter_map(|ancestor| transform_path(ancestor, self))
                    .collect();
                if let Some(moved) = transform_path(path, self) {
                    dirty.extend(with_ancestors(&moved));
                }
                dirty
            }
        }
    }

    /// This mutation with its paths moved past `other`, which was applied
    /// first. `None` when the target no longer exists.
    pub fn transform(&self, other: &Mutation) -> Option<Mutation> {
        let mut mutation = self.clone();
        match &mut mutation {
            Mutation::MoveNode { path, new_path } => {
                *path = transform_path(path, other)?;
                *new_path = transform_path(new_path, other)?;
            }
            Mutation::InsertNode { path, .. }
            | Mutation::RemoveNode { path }
            | Mutation::InsertText { path, .. }
            | Mutation::RemoveText { path, .. }
            | Mutation::SplitNode { path, .. }
            | Mutation::MergeNode { path, .. }
            | Mutation::SetBlockKind { path, .. }
            | Mutation::SetAlign { path, .. }
            | Mutation::SetMark { path, .. } => {
                *path = transform_path(path, other)?;
            }
        }
        Some(mutation)
    }

    /// Detach the moved node and insert it at its target
    fn move_node(&self, root: &mut Vec<Node>) -> Result<(), MutationError> {
        let Mutation::MoveNode { path, new_path } = self else {
            return Ok(());
        };
        if path == new_path {
            return Ok(());
        }
        let node = Self::take_node(root, path)?;
        let true_path = transform_path(path, self)
            .ok_or_else(|| MutationError::NodeNotFound(path.clone()))?;
        let (index, parent) = split_target(&true_path)?;
        let children = children_at_mut(root, parent)
            .ok_or_else(|| MutationError::ParentNotFound(new_path.clone()))?;
        if index > children.len() {
            return Err(MutationError::InvalidStructure(format!(
                "move target {:?} is past the end of its parent",
                new_path
            )));
        }
        children.insert(index, node);
        Ok(())
    }

    /// Remove and return the node at `path`
    fn take_node(root: &mut Vec<Node>, path: &[usize]) -> Result<Node, MutationError> {
        let (index, parent) = split_target(path)?;
        let children = children_at_mut(root, parent)
            .ok_or_else(|| MutationError::ParentNotFound(path.to_vec()))?;
        if index >= children.len() {
            return Err(MutationError::NodeNotFound(path.to_vec()));
        }
        Ok(children.remove(index))
    }
}

/// Transform a path to account for `mutation` having been applied.
///
/// Returns `None` when the addressed node no longer exists. A node that is
/// split keeps its path (the first half).
pub fn transform_path(path: &[usize], mutation: &Mutation) -> Option<Path> {
    let mut p = path.to_vec();
    if p.is_empty() {
        return Some(p);
    }

    match mutation {
        Mutation::InsertNode { path: op, .. } => {
            if op.as_slice() == p.as_slice() || path::ends_before(op, &p) || path::is_ancestor(op, &p)
            {
                p[op.len() - 1] += 1;
            }
        }

        Mutation::RemoveNode { path: op } => {
            if op.as_slice() == p.as_slice() || path::is_ancestor(op, &p) {
                return None;
            }
            if path::ends_before(op, &p) {
                p[op.len() - 1] -= 1;
            }
        }

        Mutation::MergeNode { path: op, position } => {
            if op.as_slice() == p.as_slice() || path::ends_before(op, &p) {
                p[op.len() - 1] -= 1;
            } else if path::is_ancestor(op, &p) {
                p[op.len() - 1] -= 1;
                p[op.len()] += position;
            }
        }

        Mutation::SplitNode { path: op, position } => {
            if op.as_slice() == p.as_slice() {
                // stays with the first half
            } else if path::ends_before(op, &p) {
                p[op.len() - 1] += 1;
            } else if path::is_ancestor(op, &p) && p[op.len()] >= *position {
                p[op.len() - 1] += 1;
                p[op.len()] -= position;
            }
        }

        Mutation::MoveNode { path: op, new_path: onp } => {
            if op == onp {
                return Some(p);
            }

            if path::is_ancestor(op, &p) || op.as_slice() == p.as_slice() {
                let mut moved = onp.clone();
                if path::ends_before(op, onp) && op.len() < onp.len() {
                    moved[op.len() - 1] -= 1;
                }
                moved.extend_from_slice(&p[op.len()..]);
                return Some(moved);
            } else if path::is_sibling(op, onp)
                && (path::is_ancestor(onp, &p) || onp.as_slice() == p.as_slice())
            {
                if path::ends_before(op, &p) {
                    p[op.len() - 1] -= 1;
                } else {
                    p[op.len() - 1] += 1;
                }
            } else if path::ends_before(onp, &p)
                || onp.as_slice() == p.as_slice()
                || path::is_ancestor(onp, &p)
            {
                if path::ends_before(op, &p) {
                    p[op.len() - 1] -= 1;
                }
                p[onp.len() - 1] += 1;
            } else if path::ends_before(op, &p) {
                if onp.as_slice() == p.as_slice() {
                    p[onp.len() - 1] += 1;
                }
                p[op.len() - 1] -= 1;
            }
        }

        Mutation::InsertText { .. }
        | Mutation::RemoveText { .. }
        | Mutation::SetBlockKind { .. }
        | Mutation::SetAlign { .. }
        | Mutation::SetMark { .. } => {}
    }

    Some(p)
}

/// `path` preceded by all of its ancestors
fn with_ancestors(path: &[usize]) -> Vec<Path> {
    path::ancestors(path)
        .map(<[usize]>::to_vec)
        .chain(std::iter::once(path.to_vec()))
        .collect()
}

fn collect_descendants(node: &Node, at: &[usize], out: &mut Vec<Path>) {
    for (index, child) in node.children().iter().enumerate() {
        let child_path = path::child(at, index);
        collect_descendants(child, &child_path, out);
        out.push(child_path);
    }
}

/// Split a non-root path into (index, parent path)
fn split_target(path: &[usize]) -> Result<(usize, &[usize]), MutationError> {
    path.split_last()
        .map(|(index, parent)| (*index, parent))
        .ok_or(MutationError::RootTarget)
}

fn check_offset(path: &[usize], offset: usize, len: usize) -> Result<(), MutationError> {
    if offset > len {
        return Err(MutationError::OffsetOutOfRange {
            path: path.to_vec(),
            offset,
            len,
        });
    }
    Ok(())
}

fn existing<'a>(root: &'a [Node], path: &[usize]) -> Result<&'a Node, MutationError> {
    node_at(root, path).ok_or_else(|| MutationError::NodeNotFound(path.to_vec()))
}

fn children_at<'a>(root: &'a [Node], path: &[usize]) -> Option<&'a [Node]> {
    if path.is_empty() {
        return Some(root);
    }
    match node_at(root, path)? {
        Node::Block(block) => Some(&block.children),
        Node::Text(_) => None,
    }
}

fn text_at<'a>(root: &'a [Node], path: &[usize]) -> Result<&'a Text, MutationError> {
    existing(root, path)?
        .as_text()
        .ok_or_else(|| MutationError::NotText(path.to_vec()))
}

fn block_at<'a>(root: &'a [Node], path: &[usize]) -> Result<&'a Block, MutationError> {
    existing(root, path)?
        .as_block()
        .ok_or_else(|| MutationError::NotBlock(path.to_vec()))
}

fn text_at_mut<'a>(root: &'a mut [Node], path: &[usize]) -> Result<&'a mut Text, MutationError> {
    node_at_mut(root, path)
        .ok_or_else(|| MutationError::NodeNotFound(path.to_vec()))?
        .as_text_mut()
        .ok_or_else(|| MutationError::NotText(path.to_vec()))
}

fn block_at_mut<'a>(root: &'a mut [Node], path: &[usize]) -> Result<&'a mut Block, MutationError> {
    node_at_mut(root, path)
        .ok_or_else(|| MutationError::NodeNotFound(path.to_vec()))?
        .as_block_mut()
        .ok_or_else(|| MutationError::NotBlock(path.to_vec()))
}

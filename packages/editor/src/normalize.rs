//! # Normalization
//!
//! Every committed mutation may leave the tree structurally invalid. The
//! normalization engine inspects the nodes a mutation touched (its dirty
//! paths) and issues repair mutations until no rule fires.
//!
//! ## Design
//!
//! Rules are:
//! - **Local**: a rule looks at one node and its direct children
//! - **Single-step**: a rule returns at most one repair; the repair's own dirty
//!   paths are fed back, so multi-step fixes happen over several iterations
//! - **Idempotent**: a rule never fires on a node it already considers valid
//!
//! The root rule runs first: the root must always hold at least one block.

use crate::document::node_at;
use crate::mutations::Mutation;
use crate::node::{Block, Node, Text};
use crate::path;

/// A structural rule checked against a node whenever it is dirty
pub trait NormalizeRule: std::fmt::Debug + Send + Sync {
    /// Rule name for logs
    fn name(&self) -> &'static str;

    /// The mutation that repairs `node` (with children `children`) at `path`,
    /// or `None` if this rule is satisfied. `node` is `None` for the root.
    fn repair(&self, path: &[usize], node: Option<&Node>, children: &[Node]) -> Option<Mutation>;
}

/// The root must contain at least one block
#[derive(Debug)]
pub struct EnsureRootBlock;

impl NormalizeRule for EnsureRootBlock {
    fn name(&self) -> &'static str {
        "ensure_root_block"
    }

    fn repair(&self, path: &[usize], node: Option<&Node>, children: &[Node]) -> Option<Mutation> {
        if !path.is_empty() || node.is_some() || !children.is_empty() {
            return None;
        }
        Some(Mutation::InsertNode {
            path: vec![0],
            node: Node::Block(Block::empty_paragraph()),
        })
    }
}

/// Root children must be blocks; block children must all match the first
#[derive(Debug)]
pub struct RemoveMismatchedChildren;

impl NormalizeRule for RemoveMismatchedChildren {
    fn name(&self) -> &'static str {
        "remove_mismatched_children"
    }

    fn repair(&self, path: &[usize], node: Option<&Node>, children: &[Node]) -> Option<Mutation> {
        if matches!(node, Some(Node::Text(_))) {
            return None;
        }
        let expect_blocks = node.is_none() || children.first().is_some_and(Node::is_block);
        children
            .iter()
            .position(|child| child.is_block() != expect_blocks)
            .map(|index| Mutation::RemoveNode {
                path: path::child(path, index),
            })
    }
}

/// A block with no children receives one empty text
#[derive(Debug)]
pub struct EnsureBlockHasChild;

impl NormalizeRule for EnsureBlockHasChild {
    fn name(&self) -> &'static str {
        "ensure_block_has_child"
    }

    fn repair(&self, path: &[usize], node: Option<&Node>, children: &[Node]) -> Option<Mutation> {
        match node {
            Some(Node::Block(_)) if children.is_empty() => Some(Mutation::InsertNode {
                path: path::child(path, 0),
                node: Node::Text(Text::default()),
            }),
            _ => None,
        }
    }
}

/// Adjacent texts with identical marks merge; empty texts between runs go
#[derive(Debug)]
pub struct MergeAdjacentTexts;

impl NormalizeRule for MergeAdjacentTexts {
    fn name(&self) -> &'static str {
        "merge_adjacent_texts"
    }

    fn repair(&self, path: &[usize], node: Option<&Node>, children: &[Node]) -> Option<Mutation> {
        if !matches!(node, Some(Node::Block(_))) {
            return None;
        }

        for (index, pair) in children.windows(2).enumerate() {
            let (Node::Text(previous), Node::Text(current)) = (&pair[0], &pair[1]) else {
                continue;
            };
            let current_path = path::child(path, index + 1);

            if previous.marks == current.marks {
                return Some(Mutation::MergeNode {
                    path: current_path,
                    position: previous.len(),
                });
            }
            if previous.is_empty() {
                return Some(Mutation::RemoveNode {
                    path: path::child(path, index),
                });
            }
            if current.is_empty() {
                return Some(Mutation::RemoveNode { path: current_path });
            }
        }
        None
    }
}

/// Runs every registered rule against dirty nodes
#[derive(Debug)]
pub struct NormalizationEngine {
    rules: Vec<Box<dyn NormalizeRule>>,
}

impl NormalizationEngine {
    /// Create engine with the default rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(EnsureRootBlock),
                Box::new(RemoveMismatchedChildren),
                Box::new(EnsureBlockHasChild),
                Box::new(MergeAdjacentTexts),
            ],
        }
    }

    /// Engine with only the given rules
    pub fn with_rules(rules: Vec<Box<dyn NormalizeRule>>) -> Self {
        Self { rules }
    }

    /// First repair any rule wants for the node at `path`. Paths that no
    /// longer resolve need no repair.
    pub fn repair(&self, root: &[Node], path: &[usize]) -> Option<(&'static str, Mutation)> {
        let (node, children) = if path.is_empty() {
            (None, root)
        } else {
            let node = node_at(root, path)?;
            (Some(node), node.children())
        };

        self.rules
            .iter()
            .find_map(|rule| rule.repair(path, node, children).map(|m| (rule.name(), m)))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for NormalizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BlockKind, Mark};

    #[test]
    fn test_engine_creation() {
        let engine = NormalizationEngine::new();
        assert_eq!(engine.rule_count(), 4);
    }

    #[test]
    fn test_custom_rule_set() {
        let engine = NormalizationEngine::with_rules(vec![Box::new(EnsureBlockHasChild)]);
        assert_eq!(engine.rule_count(), 1);

        // the root rule is not part of this engine
        assert!(engine.repair(&[], &[]).is_none());

        let root = vec![Node::Block(Block::new(BlockKind::Paragraph, Vec::new()))];
        let (rule, repair) = engine.repair(&root, &[0]).unwrap();
        assert_eq!(rule, "ensure_block_has_child");
        assert_eq!(
            repair,
            Mutation::InsertNode {
                path: vec![0, 0],
                node: Node::Text(Text::default()),
            }
        );
    }

    #[test]
    fn test_empty_root_gets_paragraph() {
        let engine = NormalizationEngine::new();
        let (rule, repair) = engine.repair(&[], &[]).unwrap();
        assert_eq!(rule, "ensure_root_block");
        assert_eq!(
            repair,
            Mutation::InsertNode {
                path: vec![0],
                node: Node::Block(Block::empty_paragraph()),
            }
        );
    }

    #[test]
    fn test_valid_root_needs_no_repair() {
        let engine = NormalizationEngine::new();
        let root = vec![Node::Block(Block::empty_paragraph())];
        assert!(engine.repair(&root, &[]).is_none());
        assert!(engine.repair(&root, &[0]).is_none());
        assert!(engine.repair(&root, &[0, 0]).is_none());
    }

    #[test]
    fn test_text_at_root_is_removed() {
        let engine = NormalizationEngine::new();
        let root = vec![
            Node::Block(Block::empty_paragraph()),
            Node::Text(Text::new("stray")),
        ];
        let (_, repair) = engine.repair(&root, &[]).unwrap();
        assert_eq!(repair, Mutation::RemoveNode { path: vec![1] });
    }

    #[test]
    fn test_equal_marks_merge() {
        let engine = NormalizationEngine::new();
        let root = vec![Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![
                Node::Text(Text::new("ab").with_mark(Mark::Bold)),
                Node::Text(Text::new("cd").with_mark(Mark::Bold)),
            ],
        ))];
        let (_, repair) = engine.repair(&root, &[0]).unwrap();
        assert_eq!(
            repair,
            Mutation::MergeNode {
                path: vec![0, 1],
                position: 2
            }
        );
    }

    #[test]
    fn test_different_marks_stay_split() {
        let engine = NormalizationEngine::new();
        let root = vec![Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![
                Node::Text(Text::new("ab").with_mark(Mark::Bold)),
                Node::Text(Text::new("cd")),
            ],
        ))];
        assert!(engine.repair(&root, &[0]).is_none());
    }

    #[test]
    fn test_empty_block_gets_text() {
        let engine = NormalizationEngine::new();
        let root = vec![Node::Block(Block::new(BlockKind::BulletedList, vec![]))];
        let (rule, repair) = engine.repair(&root, &[0]).unwrap();
        assert_eq!(rule, "ensure_block_has_child");
        assert_eq!(
            repair,
            Mutation::InsertNode {
                path: vec![0, 0],
                node: Node::Text(Text::default()),
            }
        );
    }
}

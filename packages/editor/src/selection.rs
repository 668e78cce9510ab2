//! Points and selections in the document tree.

use crate::mutations::{transform_path, Mutation};
use crate::path::{self, Path};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A position inside a text node: its path plus a character offset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

/// An ordered pair of points. The anchor may come after the focus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Point {
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    /// Document-order comparison
    pub fn compare(&self, other: &Point) -> Ordering {
        match path::compare(&self.path, &other.path) {
            Ordering::Equal => self.offset.cmp(&other.offset),
            unequal => unequal,
        }
    }

    pub fn is_before(&self, other: &Point) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn is_after(&self, other: &Point) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// Transform this point to account for `mutation`. Points inside removed
    /// nodes are lost. Points sitting exactly on a split or insertion
    /// position move forward with the inserted content.
    pub fn transform(&self, mutation: &Mutation) -> Option<Point> {
        let mut point = self.clone();

        match mutation {
            Mutation::InsertText { path, offset, text } => {
                if *path == point.path && *offset <= point.offset {
                    point.offset += text.chars().count();
                }
            }

            Mutation::RemoveText { path, offset, len } => {
                if *path == point.path && *offset <= point.offset {
                    point.offset -= (point.offset - offset).min(*len);
                }
            }

            Mutation::MergeNode { path, position } => {
                if *path == point.path {
                    point.offset += position;
                }
                point.path = transform_path(&point.path, mutation)?;
            }

            Mutation::SplitNode { path, position } => {
                if *path == point.path {
                    if *position <= point.offset {
                        point.offset -= position;
                        point.path = path::next(path)?;
                    }
                } else {
                    point.path = transform_path(&point.path, mutation)?;
                }
            }

            Mutation::RemoveNode { path } => {
                if *path == point.path || path::is_ancestor(path, &point.path) {
                    return None;
                }
                point.path = transform_path(&point.path, mutation)?;
            }

            Mutation::InsertNode { .. } | Mutation::MoveNode { .. } => {
                point.path = transform_path(&point.path, mutation)?;
            }

            Mutation::SetBlockKind { .. } | Mutation::SetAlign { .. } | Mutation::SetMark { .. } => {}
        }

        Some(point)
    }
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// A caret: anchor and focus at the same point
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_expanded(&self) -> bool {
        !self.is_collapsed()
    }

    /// Whether the focus comes before the anchor
    pub fn is_backward(&self) -> bool {
        self.anchor.is_after(&self.focus)
    }

    /// The selection's points in document order
    pub fn edges(&self) -> (&Point, &Point) {
        if self.is_backward() {
            (&self.focus, &self.anchor)
        } else {
            (&self.anchor, &self.focus)
        }
    }

    pub fn start(&self) -> &Point {
        self.edges().0
    }

    pub fn end(&self) -> &Point {
        self.edges().1
    }

    /// Transform both points; `None` if either is lost
    pub fn transform(&self, mutation: &Mutation) -> Option<Selection> {
        Some(Selection {
            anchor: self.anchor.transform(mutation)?,
            focus: self.focus.transform(mutation)?,
        })
    }
}

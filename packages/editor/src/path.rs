//! # Paths
//!
//! A path addresses a node by the child indices leading to it from the root.
//! The empty path is the root itself.
//!
//! Ordering follows document order, with one twist shared by every
//! structural editor: an ancestor compares *equal* to its descendants, so a
//! range test against a path includes everything beneath it.

use std::cmp::Ordering;

pub type Path = Vec<usize>;

/// Path of the parent node. The root has no parent.
pub fn parent(path: &[usize]) -> Option<&[usize]> {
    path.split_last().map(|(_, rest)| rest)
}

/// Path of the next sibling
pub fn next(path: &[usize]) -> Option<Path> {
    let (last, rest) = path.split_last()?;
    let mut next = rest.to_vec();
    next.push(last + 1);
    Some(next)
}

/// Path of the previous sibling
pub fn previous(path: &[usize]) -> Option<Path> {
    let (last, rest) = path.split_last()?;
    let index = last.checked_sub(1)?;
    let mut previous = rest.to_vec();
    previous.push(index);
    Some(previous)
}

/// Child path of `path` at `index`
pub fn child(path: &[usize], index: usize) -> Path {
    let mut child = path.to_vec();
    child.push(index);
    child
}

/// Every proper ancestor of `path`, root first
pub fn ancestors(path: &[usize]) -> impl DoubleEndedIterator<Item = &[usize]> {
    (0..path.len()).map(move |len| &path[..len])
}

pub fn is_ancestor(path: &[usize], other: &[usize]) -> bool {
    path.len() < other.len() && other.starts_with(path)
}

pub fn is_sibling(path: &[usize], other: &[usize]) -> bool {
    path.len() == other.len()
        && !path.is_empty()
        && path[..path.len() - 1] == other[..other.len() - 1]
        && path != other
}

/// Whether `path` ends before `other` at the same level. Deeper `other`
/// paths count when they sit under a later sibling.
pub fn ends_before(path: &[usize], other: &[usize]) -> bool {
    let Some(i) = path.len().checked_sub(1) else {
        return false;
    };
    other.len() > i && path[..i] == other[..i] && path[i] < other[i]
}

/// Longest shared prefix of two paths
pub fn common(path: &[usize], other: &[usize]) -> Path {
    path.iter()
        .zip(other)
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| *a)
        .collect()
}

/// Document-order comparison where ancestors equal their descendants
pub fn compare(path: &[usize], other: &[usize]) -> Ordering {
    for (a, b) in path.iter().zip(other) {
        match a.cmp(b) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }
    Ordering::Equal
}

pub fn is_before(path: &[usize], other: &[usize]) -> bool {
    compare(path, other) == Ordering::Less
}

pub fn is_after(path: &[usize], other: &[usize]) -> bool {
    compare(path, other) == Ordering::Greater
}

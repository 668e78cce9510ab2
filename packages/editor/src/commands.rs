//! # Formatting Commands
//!
//! Active-state queries and toggles for marks and blocks, evaluated against
//! the document's current selection.
//!
//! Every query is computed from the tree as it is now; nothing is cached
//! between calls. Every toggle runs as one batch, so the tree is normalized
//! once the whole command has been applied.

use crate::document::Document;
use crate::mutations::{transform_path, Mutation, MutationError};
use crate::node::{Block, BlockKind, Format, Mark, Marks, Node, Text};
use crate::path::{self, Path};
use crate::selection::{Point, Selection};

/// Marks in effect at the selection.
///
/// Pending marks win. A caret takes the marks of the text it sits in, or of
/// the previous text when it sits at the very start of a run. A range takes
/// the marks shared by every run it covers.
pub fn marks(doc: &Document) -> Marks {
    if let Some(pending) = doc.pending_marks() {
        return pending.clone();
    }
    let Some(selection) = doc.selection() else {
        return Marks::new();
    };

    if selection.is_collapsed() {
        let focus = &selection.focus;
        if focus.offset == 0 {
            if let Some(previous) = path::previous(&focus.path).and_then(|p| doc.text(&p)) {
                return previous.marks.clone();
            }
        }
        return doc
            .text(&focus.path)
            .map(|text| text.marks.clone())
            .unwrap_or_default();
    }

    let (start, end) = doc.unhang_range(selection.start(), selection.end());
    covered_texts(doc, &start, &end)
        .into_iter()
        .fold(None, |shared: Option<Marks>, (_, text)| {
            Some(match shared {
                None => text.marks.clone(),
                Some(shared) => shared.intersection(&text.marks),
            })
        })
        .unwrap_or_default()
}

pub fn is_mark_active(doc: &Document, mark: Mark) -> bool {
    marks(doc).contains(mark)
}

pub fn toggle_mark(doc: &mut Document, mark: Mark) -> Result<(), MutationError> {
    if is_mark_active(doc, mark) {
        remove_mark(doc, mark)
    } else {
        add_mark(doc, mark)
    }
}

pub fn add_mark(doc: &mut Document, mark: Mark) -> Result<(), MutationError> {
    set_mark(doc, mark, true)
}

pub fn remove_mark(doc: &mut Document, mark: Mark) -> Result<(), MutationError> {
    set_mark(doc, mark, false)
}

fn set_mark(doc: &mut Document, mark: Mark, active: bool) -> Result<(), MutationError> {
    let Some(collapsed) = doc.selection().map(Selection::is_collapsed) else {
        return Ok(());
    };

    if collapsed {
        let mut pending = marks(doc);
        pending.set(mark, active);
        doc.set_pending_marks(Some(pending));
        return Ok(());
    }

    let Some((start, end)) = doc.selected_range() else {
        return Ok(());
    };

    doc.without_normalizing(|doc| {
        let (start, end) = split_at_edges(doc, start, end)?;
        let targets: Vec<Path> = covered_texts(doc, &start, &end)
            .into_iter()
            .filter(|(_, text)| text.marks.contains(mark) != active)
            .map(|(text_path, _)| text_path)
            .collect();

        for path in targets {
            doc.apply(Mutation::SetMark { path, mark, active })?;
        }
        Ok(())
    })
}

/// Whether any block touched by the selection carries `format`
pub fn is_block_active(doc: &Document, format: Format) -> bool {
    let Some((start, end)) = doc.selected_range() else {
        return false;
    };
    let active = doc
        .nodes_in_range(&start, &end)
        .filter_map(|(_, node)| node.as_block())
        .any(|block| has_format(block, format));
    active
}

/// Toggle a block kind or an alignment on the selected blocks.
///
/// Kind toggles first lift the selected items out of any list container.
/// Alignment toggles leave list nesting alone and never touch `kind`.
pub fn toggle_block(doc: &mut Document, format: Format) -> Result<(), MutationError> {
    let Some((start, end)) = doc.selected_range() else {
        return Ok(());
    };
    let active = is_block_active(doc, format);

    doc.without_normalizing(|doc| {
        if !format.is_align() {
            unwrap_lists(doc, &start, &end)?;
        }

        let Some((start, end)) = doc.selected_range() else {
            return Ok(());
        };
        let blocks = lowest_blocks(doc, &start, &end);

        for block_path in &blocks {
            let Some(block) = doc.block(block_path) else {
                continue;
            };
            let mutation = match format {
                Format::Align(align) => {
                    let align = if active { None } else { Some(align) };
                    if block.align == align {
                        continue;
                    }
                    Mutation::SetAlign {
                        path: block_path.clone(),
                        align,
                    }
                }
                Format::Kind(kind) => {
                    let kind = if active {
                        BlockKind::Paragraph
                    } else if kind.is_list() {
                        BlockKind::ListItem
                    } else {
                        kind
                    };
                    if block.kind == kind {
                        continue;
                    }
                    Mutation::SetBlockKind {
                        path: block_path.clone(),
                        kind,
                    }
                }
            };
            doc.apply(mutation)?;
        }

        match format {
            Format::Kind(kind) if !active && kind.is_list() => wrap_blocks(doc, &blocks, kind),
            _ => Ok(()),
        }
    })
}

/// Insert `text` at the selection, replacing any selected content. Pending
/// marks start a new run when they differ from the run at the caret.
pub fn insert_text(doc: &mut Document, text: &str) -> Result<(), MutationError> {
    if text.is_empty() || doc.selection().is_none() {
        return Ok(());
    }
    let pending = doc.pending_marks().cloned();

    doc.without_normalizing(|doc| {
        delete_selection(doc)?;
        let Some(point) = doc.selection().map(|selection| selection.focus.clone()) else {
            return Ok(());
        };
        let Some(current) = doc.text(&point.path) else {
            return Ok(());
        };

        match pending {
            Some(marks) if marks != current.marks => {
                let len = current.len();
                let at = if point.offset == 0 {
                    point.path.clone()
                } else {
                    if point.offset < len {
                        doc.apply(Mutation::SplitNode {
                            path: point.path.clone(),
                            position: point.offset,
                        })?;
                    }
                    path::next(&point.path).ok_or(MutationError::RootTarget)?
                };

                doc.apply(Mutation::InsertNode {
                    path: at.clone(),
                    node: Node::Text(Text {
                        text: text.to_string(),
                        marks,
                    }),
                })?;
                doc.select(Some(Selection::collapsed(Point::new(
                    at,
                    text.chars().count(),
                ))));
            }
            _ => {
                doc.apply(Mutation::InsertText {
                    path: point.path,
                    offset: point.offset,
                    text: text.to_string(),
                })?;
                doc.set_pending_marks(None);
            }
        }
        Ok(())
    })
}

/// Remove the characters covered by an expanded selection and collapse it
/// to its start. Blocks are never merged; emptied runs are left to
/// normalization.
pub fn delete_selection(doc: &mut Document) -> Result<(), MutationError> {
    let Some(selection) = doc.selection().filter(|s| s.is_expanded()) else {
        return Ok(());
    };
    let (start, end) = (selection.start().clone(), selection.end().clone());
    let pending = doc.pending_marks().cloned();

    doc.without_normalizing(|doc| {
        let removals: Vec<Mutation> = covered_texts(doc, &start, &end)
            .into_iter()
            .filter_map(|(text_path, text)| {
                let from = if text_path == start.path { start.offset } else { 0 };
                let to = if text_path == end.path { end.offset } else { text.len() };
                (from < to).then_some(Mutation::RemoveText {
                    path: text_path,
                    offset: from,
                    len: to - from,
                })
            })
            .collect();

        for removal in removals.into_iter().rev() {
            doc.apply(removal)?;
        }
        Ok::<_, MutationError>(())
    })?;

    doc.select(Some(Selection::collapsed(start)));
    doc.set_pending_marks(pending);
    Ok(())
}

fn has_format(block: &Block, format: Format) -> bool {
    match format {
        Format::Kind(kind) => block.kind == kind,
        Format::Align(align) => block.align == Some(align),
    }
}

/// Text runs holding at least one character of `start..end`. Empty runs
/// only count when the range covers no characters at all.
fn covered_texts<'a>(
    doc: &'a Document,
    start: &'a Point,
    end: &'a Point,
) -> Vec<(Path, &'a Text)> {
    let mut covered = Vec::new();
    let mut empty = Vec::new();
    for (node_path, node) in doc.nodes_in_range(start, end) {
        let Some(text) = node.as_text() else {
            continue;
        };
        let from = if node_path == start.path { start.offset } else { 0 };
        let to = if node_path == end.path { end.offset } else { text.len() };
        if from < to {
            covered.push((node_path, text));
        } else if text.is_empty() {
            empty.push((node_path, text));
        }
    }

    if covered.is_empty() {
        empty
    } else {
        covered
    }
}

/// Split the texts at both edges so that the range covers whole runs.
/// Returns the range in the split tree.
fn split_at_edges(
    doc: &mut Document,
    mut start: Point,
    mut end: Point,
) -> Result<(Point, Point), MutationError> {
    if let Some(len) = doc.text(&end.path).map(Text::len) {
        if end.offset > 0 && end.offset < len {
            doc.apply(Mutation::SplitNode {
                path: end.path.clone(),
                position: end.offset,
            })?;
        }
    }

    if let Some(len) = doc.text(&start.path).map(Text::len) {
        if start.offset > 0 && start.offset < len {
            let split = Mutation::SplitNode {
                path: start.path.clone(),
                position: start.offset,
            };
            doc.apply(split.clone())?;

            let tail = path::next(&start.path).ok_or(MutationError::RootTarget)?;
            if end.path == start.path {
                end = Point::new(tail.clone(), end.offset - start.offset);
            } else if let Some(moved) = transform_path(&end.path, &split) {
                end.path = moved;
            }
            start = Point::new(tail, 0);
        }
    }

    Ok((start, end))
}

/// Blocks in range whose children are text runs
fn lowest_blocks(doc: &Document, start: &Point, end: &Point) -> Vec<Path> {
    doc.nodes_in_range(start, end)
        .filter(|(_, node)| node.as_block().is_some_and(Block::has_inline_children))
        .map(|(block_path, _)| block_path)
        .collect()
}

/// Lift the selected items out of the innermost list containers in range
fn unwrap_lists(doc: &mut Document, start: &Point, end: &Point) -> Result<(), MutationError> {
    let lists: Vec<Path> = doc
        .nodes_in_range(start, end)
        .filter(|(_, node)| node.as_block().is_some_and(|block| block.kind.is_list()))
        .map(|(list_path, _)| list_path)
        .collect();

    let spans: Vec<(Path, usize, usize)> = lists
        .iter()
        .filter(|list| !lists.iter().any(|other| path::is_ancestor(list, other)))
        .filter_map(|list| {
            let items: Vec<usize> = doc
                .nodes_in_range(start, end)
                .filter(|(item_path, _)| {
                    item_path.len() == list.len() + 1 && item_path.starts_with(list)
                })
                .map(|(item_path, _)| item_path[list.len()])
                .collect();
            Some((list.clone(), *items.first()?, *items.last()?))
        })
        .collect();

    // later containers first so earlier paths stay valid
    for (list, first, last) in spans.into_iter().rev() {
        lift_items(doc, list, first, last)?;
    }
    Ok(())
}

/// Move items `first..=last` of the container at `list` out to its level,
/// splitting the container around them and dropping the emptied part
fn lift_items(
    doc: &mut Document,
    list: Path,
    first: usize,
    last: usize,
) -> Result<(), MutationError> {
    let len = doc.node(&list).map_or(0, |node| node.children().len());
    if last + 1 < len {
        doc.apply(Mutation::SplitNode {
            path: list.clone(),
            position: last + 1,
        })?;
    }

    let target = if first > 0 {
        doc.apply(Mutation::SplitNode {
            path: list.clone(),
            position: first,
        })?;
        path::next(&list).ok_or(MutationError::RootTarget)?
    } else {
        list
    };

    let after = path::next(&target).ok_or(MutationError::RootTarget)?;
    for index in (0..=(last - first)).rev() {
        doc.apply(Mutation::MoveNode {
            path: path::child(&target, index),
            new_path: after.clone(),
        })?;
    }
    doc.apply(Mutation::RemoveNode { path: target })
}

/// Wrap the sibling run spanning `blocks` in a new container of `kind`
fn wrap_blocks(doc: &mut Document, blocks: &[Path], kind: BlockKind) -> Result<(), MutationError> {
    let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
        return Ok(());
    };
    let common = if first == last {
        path::parent(first).unwrap_or(&[]).to_vec()
    } else {
        path::common(first, last)
    };
    let depth = common.len();
    let (from, to) = (first[depth], last[depth]);
    let wrapper = path::child(&common, from);

    doc.apply(Mutation::InsertNode {
        path: wrapper.clone(),
        node: Node::Block(Block::new(kind, Vec::new())),
    })?;
    for index in 0..=(to - from) {
        doc.apply(Mutation::MoveNode {
            path: path::child(&common, from + 1),
            new_path: path::child(&wrapper, index),
        })?;
    }
    Ok(())
}

//! # Document Nodes
//!
//! The structural model of a rich-text document.
//!
//! ```text
//! Root ─┬─ Block(paragraph) ── Text("Hello ", {bold}) ── Text("world", {})
//!       └─ Block(bulleted-list) ─┬─ Block(list-item) ── Text("one")
//!                                └─ Block(list-item) ── Text("two")
//! ```
//!
//! Nodes carry no behavior beyond accessors. Structural validity is the job of
//! the normalization engine, not of these types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A node in the document tree (below the root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Block(Block),
    Text(Text),
}

/// Structural element with a kind, optional alignment and children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,

    pub children: Vec<Node>,
}

/// Leaf run of characters sharing one set of marks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Text {
    pub text: String,

    #[serde(default, skip_serializing_if = "Marks::is_empty")]
    pub marks: Marks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    BlockQuote,
    NumberedList,
    BulletedList,
    ListItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Code,
}

/// Set of active marks. A mark that is absent is off.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marks(BTreeSet<Mark>);

/// Target of a block toggle: either a block kind or an alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Format {
    Kind(BlockKind),
    Align(Align),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown format: {0}")]
pub struct UnknownFormat(pub String);

impl Node {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(block) => Some(block),
            Node::Text(_) => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Node::Block(block) => Some(block),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(text) => Some(text),
            Node::Block(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Node::Text(text) => Some(text),
            Node::Block(_) => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Node::Block(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    /// Children of a block; texts have none
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Block(block) => &block.children,
            Node::Text(_) => &[],
        }
    }

    /// Concatenated text content of this node and its descendants
    pub fn plain_text(&self) -> String {
        match self {
            Node::Text(text) => text.text.clone(),
            Node::Block(block) => block.children.iter().map(Node::plain_text).collect(),
        }
    }

    /// Length used by split/merge: characters for texts, children for blocks
    pub fn split_len(&self) -> usize {
        match self {
            Node::Text(text) => text.len(),
            Node::Block(block) => block.children.len(),
        }
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Text> for Node {
    fn from(text: Text) -> Self {
        Node::Text(text)
    }
}

impl Block {
    pub fn new(kind: BlockKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            align: None,
            children,
        }
    }

    /// The default block: a paragraph holding one empty text
    pub fn empty_paragraph() -> Self {
        Self::new(BlockKind::Paragraph, vec![Node::Text(Text::default())])
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    /// Whether this block's children are inline runs rather than blocks
    pub fn has_inline_children(&self) -> bool {
        self.children.first().map_or(true, Node::is_text)
    }
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.insert(mark);
        self
    }

    /// Length in characters (the unit of point offsets)
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl BlockKind {
    pub fn is_list(self) -> bool {
        matches!(self, BlockKind::NumberedList | BlockKind::BulletedList)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::HeadingOne => "heading-one",
            BlockKind::HeadingTwo => "heading-two",
            BlockKind::BlockQuote => "block-quote",
            BlockKind::NumberedList => "numbered-list",
            BlockKind::BulletedList => "bulleted-list",
            BlockKind::ListItem => "list-item",
        }
    }
}

impl Align {
    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }
}

impl Mark {
    pub const ALL: [Mark; 4] = [Mark::Bold, Mark::Italic, Mark::Underline, Mark::Code];

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Bold => "bold",
            Mark::Italic => "italic",
            Mark::Underline => "underline",
            Mark::Code => "code",
        }
    }
}

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, mark: Mark) -> bool {
        self.0.contains(&mark)
    }

    pub fn insert(&mut self, mark: Mark) -> bool {
        self.0.insert(mark)
    }

    pub fn remove(&mut self, mark: Mark) -> bool {
        self.0.remove(&mark)
    }

    pub fn set(&mut self, mark: Mark, active: bool) {
        if active {
            self.0.insert(mark);
        } else {
            self.0.remove(&mark);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Mark> + '_ {
        self.0.iter().copied()
    }

    /// Marks present in both sets
    pub fn intersection(&self, other: &Marks) -> Marks {
        Marks(self.0.intersection(&other.0).copied().collect())
    }
}

impl FromIterator<Mark> for Marks {
    fn from_iter<I: IntoIterator<Item = Mark>>(iter: I) -> Self {
        Marks(iter.into_iter().collect())
    }
}

impl Format {
    pub fn is_align(self) -> bool {
        matches!(self, Format::Align(_))
    }

    pub fn is_list(self) -> bool {
        matches!(self, Format::Kind(kind) if kind.is_list())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Kind(kind) => kind.as_str(),
            Format::Align(align) => align.as_str(),
        }
    }
}

impl From<BlockKind> for Format {
    fn from(kind: BlockKind) -> Self {
        Format::Kind(kind)
    }
}

impl From<Align> for Format {
    fn from(align: Align) -> Self {
        Format::Align(align)
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s {
            "paragraph" => Format::Kind(BlockKind::Paragraph),
            "heading-one" => Format::Kind(BlockKind::HeadingOne),
            "heading-two" => Format::Kind(BlockKind::HeadingTwo),
            "block-quote" => Format::Kind(BlockKind::BlockQuote),
            "numbered-list" => Format::Kind(BlockKind::NumberedList),
            "bulleted-list" => Format::Kind(BlockKind::BulletedList),
            "list-item" => Format::Kind(BlockKind::ListItem),
            "left" => Format::Align(Align::Left),
            "center" => Format::Align(Align::Center),
            "right" => Format::Align(Align::Right),
            "justify" => Format::Align(Align::Justify),
            other => return Err(UnknownFormat(other.to_string())),
        };
        Ok(format)
    }
}

impl FromStr for Mark {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mark::ALL
            .into_iter()
            .find(|mark| mark.as_str() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte index of the `offset`-th character, clamped to the string end
pub(crate) fn byte_index(s: &str, offset: usize) -> usize {
    s.char_indices().nth(offset).map_or(s.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(
            "bulleted-list".parse::<Format>(),
            Ok(Format::Kind(BlockKind::BulletedList))
        );
        assert_eq!("center".parse::<Format>(), Ok(Format::Align(Align::Center)));
        assert!("sideways".parse::<Format>().is_err());
        assert!(Format::Kind(BlockKind::NumberedList).is_list());
        assert!(!Format::Kind(BlockKind::ListItem).is_list());
    }

    #[test]
    fn test_block_serialization_uses_type_key() {
        let block = Block::new(
            BlockKind::HeadingOne,
            vec![Node::Text(Text::new("Title").with_mark(Mark::Bold))],
        )
        .with_align(Align::Right);

        let json = serde_json::to_value(Node::Block(block.clone())).unwrap();
        assert_eq!(json["type"], "heading-one");
        assert_eq!(json["align"], "right");
        assert_eq!(json["children"][0]["marks"][0], "bold");

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, Node::Block(block));
    }

    #[test]
    fn test_text_length_counts_characters() {
        let text = Text::new("héllo");
        assert_eq!(text.len(), 5);
        assert_eq!(byte_index(&text.text, 2), 3);
        assert_eq!(byte_index(&text.text, 9), text.text.len());
    }

    #[test]
    fn test_marks_intersection() {
        let a: Marks = [Mark::Bold, Mark::Italic].into_iter().collect();
        let b: Marks = [Mark::Bold].into_iter().collect();
        let both = a.intersection(&b);
        assert!(both.contains(Mark::Bold));
        assert!(!both.contains(Mark::Italic));
    }
}

//! Structural invariants under arbitrary mutation sequences

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tandem_editor::{
    Align, Block, BlockKind, Document, Mark, Mutation, NormalizationEngine, Node, Path, Text,
};

const KINDS: [BlockKind; 4] = [
    BlockKind::Paragraph,
    BlockKind::HeadingOne,
    BlockKind::BulletedList,
    BlockKind::ListItem,
];

fn random_node(rng: &mut StdRng) -> Node {
    match rng.gen_range(0..4) {
        0 => Node::Text(Text::new("xyz")),
        1 => Node::Block(Block::new(BlockKind::Paragraph, Vec::new())),
        2 => Node::Block(Block::new(
            *KINDS.choose(rng).unwrap_or(&BlockKind::Paragraph),
            vec![Node::Text(Text::new("ab")), Node::Text(Text::new("cd"))],
        )),
        _ => Node::Block(Block::new(
            BlockKind::BulletedList,
            vec![Node::Block(Block::new(
                BlockKind::ListItem,
                vec![Node::Text(Text::new("item"))],
            ))],
        )),
    }
}

fn random_mutation(doc: &Document, rng: &mut StdRng) -> Mutation {
    let nodes: Vec<(Path, Node)> = doc
        .nodes()
        .map(|(path, node)| (path, node.clone()))
        .collect();
    let (path, node) = nodes
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| (vec![0], random_node(rng)));
    let len = node.split_len();

    match rng.gen_range(0..10) {
        0 => Mutation::InsertText {
            path,
            offset: rng.gen_range(0..=len),
            text: "hi".to_string(),
        },
        1 => {
            let offset = rng.gen_range(0..=len);
            Mutation::RemoveText {
                path,
                offset,
                len: rng.gen_range(0..=len - offset),
            }
        }
        2 => Mutation::SplitNode {
            path,
            position: rng.gen_range(0..=len),
        },
        3 => {
            let position = tandem_editor::path::previous(&path)
                .and_then(|previous| doc.node(&previous))
                .map_or(0, Node::split_len);
            Mutation::MergeNode { path, position }
        }
        4 => Mutation::RemoveNode { path },
        5 => Mutation::InsertNode {
            path,
            node: random_node(rng),
        },
        6 => Mutation::MoveNode {
            path,
            new_path: nodes
                .choose(rng)
                .map(|(other, _)| other.clone())
                .unwrap_or_else(|| vec![0]),
        },
        7 => Mutation::SetMark {
            path,
            mark: *Mark::ALL.choose(rng).unwrap_or(&Mark::Bold),
            active: rng.gen_bool(0.5),
        },
        8 => Mutation::SetBlockKind {
            path,
            kind: *KINDS.choose(rng).unwrap_or(&BlockKind::Paragraph),
        },
        _ => Mutation::SetAlign {
            path,
            align: [None, Some(Align::Center), Some(Align::Right)]
                .choose(rng)
                .copied()
                .flatten(),
        },
    }
}

/// No rule wants to repair any node of the document
fn assert_fully_normalized(doc: &Document, engine: &NormalizationEngine, step: usize) {
    let paths = std::iter::once(Vec::new()).chain(doc.nodes().map(|(path, _)| path));
    for path in paths {
        if let Some((rule, repair)) = engine.repair(doc.children(), &path) {
            panic!(
                "step {}: {} still wants {:?} in {}",
                step,
                rule,
                repair,
                doc.to_json().unwrap_or_default()
            );
        }
    }
}

#[test]
fn test_random_sequences_keep_tree_valid() {
    let engine = NormalizationEngine::new();

    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut doc = Document::new();

        for step in 0..200 {
            let mutation = random_mutation(&doc, &mut rng);
            // invalid mutations are rejected without touching the tree
            let before = doc.children().to_vec();
            if doc.apply(mutation).is_err() {
                assert_eq!(doc.children(), before.as_slice());
            }

            assert!(!doc.children().is_empty(), "seed {} step {}", seed, step);
            assert!(doc.children().iter().all(Node::is_block));
            assert_fully_normalized(&doc, &engine, step);
        }
    }
}

#[test]
fn test_normalizing_twice_changes_nothing() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut doc = Document::new();
    for _ in 0..100 {
        let mutation = random_mutation(&doc, &mut rng);
        let _ = doc.apply(mutation);
    }
    doc.take_operations();

    let settled = doc.children().to_vec();
    doc.normalize();
    assert_eq!(doc.children(), settled.as_slice());
    assert!(doc.take_operations().is_empty());
}

#[test]
fn test_empty_root_becomes_one_empty_paragraph() {
    let doc = Document::with_children(Vec::new());
    assert_eq!(
        doc.children(),
        &[Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![Node::Text(Text::new(""))],
        ))]
    );
    assert_eq!(doc.version, 0);
}

#[test]
fn test_removing_every_block_leaves_one_paragraph() {
    let mut doc = Document::with_children(vec![
        Node::Block(Block::new(
            BlockKind::HeadingOne,
            vec![Node::Text(Text::new("Title"))],
        )),
        Node::Block(Block::new(
            BlockKind::Paragraph,
            vec![Node::Text(Text::new("Body"))],
        )),
    ]);

    doc.without_normalizing(|doc| {
        doc.apply(Mutation::RemoveNode { path: vec![1] })?;
        doc.apply(Mutation::RemoveNode { path: vec![0] })
    })
    .unwrap();

    assert_eq!(doc.children().len(), 1);
    assert_eq!(doc.plain_text(), "");
    assert_eq!(doc.block(&[0]).unwrap().kind, BlockKind::Paragraph);
}

//! Integration tests for editor crate

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tandem_editor::{
    Block, BlockKind, ConnectionState, CursorData, EditSession, EventReceiver, Format,
    LoopbackHub, Mark, MemorySnapshotStore, Node, Point, Selection, SnapshotStore, Text,
    YrsReplica,
};

struct Participant {
    session: EditSession,
    events: EventReceiver,
}

impl Participant {
    fn join(hub: &LoopbackHub, store: &Arc<MemorySnapshotStore>, client_id: u64, name: &str) -> Self {
        let (transport, events) = hub.join(client_id);
        let store: Arc<dyn SnapshotStore> = store.clone();
        let session = EditSession::new(YrsReplica::with_client_id(client_id), transport, store)
            .with_cursor_data(CursorData::new(name, "#3cb44b"));
        Self { session, events }
    }

    fn pump(&mut self) -> usize {
        self.session.handle_pending(&mut self.events).unwrap()
    }
}

/// Deliver events until nobody has anything left to handle
fn settle(participants: &mut [&mut Participant]) {
    loop {
        let handled: usize = participants.iter_mut().map(|p| p.pump()).sum();
        if handled == 0 {
            break;
        }
    }
}

fn caret(path: &[usize], offset: usize) -> Option<Selection> {
    Some(Selection::collapsed(Point::new(path.to_vec(), offset)))
}

fn range(anchor: (&[usize], usize), focus: (&[usize], usize)) -> Option<Selection> {
    Some(Selection::new(
        Point::new(anchor.0.to_vec(), anchor.1),
        Point::new(focus.0.to_vec(), focus.1),
    ))
}

fn connected_pair() -> (LoopbackHub, Arc<MemorySnapshotStore>, Participant, Participant) {
    let hub = LoopbackHub::new();
    let store = Arc::new(MemorySnapshotStore::new());
    let mut alice = Participant::join(&hub, &store, 1, "Alice");
    let mut bob = Participant::join(&hub, &store, 2, "Bob");
    alice.session.attach().unwrap();
    bob.session.attach().unwrap();
    settle(&mut [&mut alice, &mut bob]);
    (hub, store, alice, bob)
}

#[test]
fn test_sessions_connect_on_attach() {
    let (hub, _store, alice, bob) = connected_pair();

    assert_eq!(alice.session.connection_state(), ConnectionState::Connected);
    assert_eq!(bob.session.connection_state(), ConnectionState::Connected);
    assert_eq!(hub.connected_count(), 2);

    // each sees the other, never itself
    assert_eq!(alice.session.remote_cursors().len(), 1);
    assert_eq!(alice.session.remote_cursors().get(2).unwrap().name, "Bob");
    assert!(alice.session.remote_cursors().get(1).is_none());
}

#[test]
fn test_local_edits_converge() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();

    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("Hello world").unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.session.document().plain_text(), "Hello world");

    bob.session.select(range((&[0, 0], 0), (&[0, 0], 5)));
    bob.session.toggle_mark(Mark::Bold).unwrap();
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(
        alice.session.document().children(),
        bob.session.document().children()
    );
    assert_eq!(
        alice.session.document().text(&[0, 0]).unwrap(),
        &Text::new("Hello").with_mark(Mark::Bold)
    );
}

#[test]
fn test_concurrent_edits_converge() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("shared").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    // both edit before hearing from each other
    alice.session.select(caret(&[0, 0], 6));
    alice.session.insert_text(" by alice").unwrap();
    bob.session.select(range((&[0, 0], 0), (&[0, 0], 6)));
    bob.session.toggle_block(Format::Kind(BlockKind::HeadingOne)).unwrap();
    settle(&mut [&mut alice, &mut bob]);

    // both changes land on the one shared block
    let expected = [Node::Block(Block::new(
        BlockKind::HeadingOne,
        vec![Node::Text(Text::new("shared by alice"))],
    ))];
    assert_eq!(alice.session.document().children(), &expected);
    assert_eq!(bob.session.document().children(), &expected);
    assert_eq!(
        alice.session.replica().materialize().unwrap(),
        expected.to_vec()
    );
}

#[test]
fn test_concurrent_typing_in_one_paragraph_merges() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("hello").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    alice.session.select(caret(&[0, 0], 5));
    alice.session.insert_text(" A").unwrap();
    bob.session.select(caret(&[0, 0], 0));
    bob.session.insert_text("B ").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(alice.session.document().children().len(), 1);
    assert_eq!(alice.session.document().plain_text(), "B hello A");
    assert_eq!(bob.session.document().plain_text(), "B hello A");
}

#[test]
fn test_remote_selection_becomes_decoration() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("Collaborate").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    bob.session.select(range((&[0, 0], 2), (&[0, 0], 7)));
    settle(&mut [&mut alice, &mut bob]);

    let decorations: Vec<_> = alice.session.decorations().collect();
    assert_eq!(decorations.len(), 1);
    assert_eq!(decorations[0].client_id, 2);
    assert_eq!(decorations[0].name, "Bob");
    assert_eq!(decorations[0].start, Point::new(vec![0, 0], 2));
    assert_eq!(decorations[0].end, Point::new(vec![0, 0], 7));

    // collapsing leaves only a caret
    bob.session.select(caret(&[0, 0], 4));
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.session.decorations().count(), 0);
    assert_eq!(alice.session.carets().count(), 1);
}

#[test]
fn test_departed_participant_loses_decoration() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("Goodbye").unwrap();
    settle(&mut [&mut alice, &mut bob]);
    bob.session.select(range((&[0, 0], 0), (&[0, 0], 4)));
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.session.decorations().count(), 1);

    drop(bob);
    alice.pump();

    assert_eq!(alice.session.decorations().count(), 0);
    assert!(alice.session.remote_cursors().is_empty());
}

#[test]
fn test_server_side_disconnect_is_mirrored() {
    let (hub, _store, mut alice, mut bob) = connected_pair();
    let mut state = bob.session.subscribe_connection();

    hub.sever(2);
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(bob.session.connection_state(), ConnectionState::Disconnected);
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
    assert!(bob.session.remote_cursors().is_empty());
    assert!(alice.session.remote_cursors().is_empty());
}

#[test]
fn test_offline_edits_sync_after_reconnect() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();

    bob.session.toggle_connection();
    settle(&mut [&mut alice, &mut bob]);
    assert!(!bob.session.is_connected());

    bob.session.select(caret(&[0, 0], 0));
    bob.session.insert_text("written offline").unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.session.document().plain_text(), "");

    bob.session.toggle_connection();
    settle(&mut [&mut alice, &mut bob]);

    assert!(bob.session.is_connected());
    assert_eq!(alice.session.document().plain_text(), "written offline");
}

#[test]
fn test_refused_connection_stays_disconnected() {
    let hub = LoopbackHub::new();
    hub.set_refusing(true);
    let store = Arc::new(MemorySnapshotStore::new());
    let mut alice = Participant::join(&hub, &store, 1, "Alice");

    alice.session.attach().unwrap();
    alice.pump();

    assert_eq!(alice.session.connection_state(), ConnectionState::Disconnected);
    assert!(alice.session.is_attached());
}

#[test]
fn test_undo_reverts_toggle_for_everyone() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("Heading").unwrap();
    alice.session.select(range((&[0, 0], 0), (&[0, 0], 7)));
    alice.session.toggle_block(Format::Kind(BlockKind::HeadingTwo)).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.session.document().block(&[0]).unwrap().kind, BlockKind::HeadingTwo);

    assert!(alice.session.undo().unwrap());
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.session.document().block(&[0]).unwrap().kind, BlockKind::Paragraph);
    assert_eq!(bob.session.document().block(&[0]).unwrap().kind, BlockKind::Paragraph);
    assert_eq!(bob.session.document().plain_text(), "Heading");

    assert!(alice.session.redo().unwrap());
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.session.document().block(&[0]).unwrap().kind, BlockKind::HeadingTwo);
}

#[test]
fn test_remote_changes_are_not_undoable_locally() {
    let (_hub, _store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("from alice").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    assert!(alice.session.can_undo());
    assert!(!bob.session.can_undo());
}

#[tokio::test]
async fn test_versions_round_trip_and_restore() {
    let (_hub, store, mut alice, mut bob) = connected_pair();
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("Version one").unwrap();
    settle(&mut [&mut alice, &mut bob]);

    let created = alice.session.create_version().await.unwrap();
    assert_eq!(created.client_id, 1);
    assert_eq!(alice.session.versions(), vec![created.clone()]);
    assert_eq!(store.snapshots(), vec![created.clone()]);

    alice.session.select(range((&[0, 0], 8), (&[0, 0], 11)));
    alice.session.insert_text("two").unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.session.document().plain_text(), "Version two");

    // bob finds alice's version in the store and restores it
    assert_eq!(bob.session.load_versions().await.unwrap(), 1);
    let loaded = bob.session.versions().remove(0);
    assert_eq!(loaded, created);

    bob.session.restore_version(&loaded).unwrap();
    settle(&mut [&mut alice, &mut bob]);

    assert_eq!(bob.session.document().plain_text(), "Version one");
    assert_eq!(alice.session.document().plain_text(), "Version one");
    assert!(bob.session.can_undo());
}

#[tokio::test]
async fn test_failed_save_keeps_version_locally() {
    let (_hub, store, mut alice, _bob) = connected_pair();
    store.set_failing(true);

    assert!(alice.session.create_version().await.is_err());
    assert_eq!(alice.session.versions().len(), 1);

    assert!(alice.session.load_versions().await.is_err());
    assert!(alice.session.versions().is_empty());
}

#[test]
fn test_restoring_empty_version_leaves_one_paragraph() {
    let hub = LoopbackHub::new();
    let store = Arc::new(MemorySnapshotStore::new());
    let mut alice = Participant::join(&hub, &store, 1, "Alice");
    alice.session.attach().unwrap();
    alice.pump();

    let empty = tandem_editor::VersionSnapshot {
        time: 1,
        snapshot: alice.session.replica().snapshot(),
        client_id: 1,
    };
    alice.session.select(caret(&[0, 0], 0));
    alice.session.insert_text("temporary").unwrap();

    alice.session.restore_version(&empty).unwrap();
    assert_eq!(
        alice.session.document().children(),
        &[Node::Block(Block::empty_paragraph())]
    );
}

// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Mailboxes over directory-backed stores.

use std::fs;
use std::path::Path;

use biglist::Error;
use biglist::FileStore;
use biglist::Handle;
use biglist::Inconsistency;
use biglist::MailboxConfig;
use biglist::Node;
use biglist::NodeStore;
use biglist::TreeConfig;
use biglist::mail::Access;
use biglist::mail::Body;
use biglist::mail::Consent;
use biglist::mail::Incoming;
use biglist::mail::Mailbox;
use biglist::mail::MailboxState;
use biglist::mail::Message;
use biglist::mail::NeverYield;
use biglist::mail::Principal;

type DiskMailbox = Mailbox<FileStore<Node<Message>>, FileStore<Body>>;

const OWNER: Principal = Principal(9);

fn open(dir: &Path, state: Option<MailboxState>) -> DiskMailbox {
    let nodes = FileStore::open(dir.join("nodes")).unwrap();
    let bodies = FileStore::open(dir.join("bodies")).unwrap();
    match state {
        Some(state) => return Mailbox::from_state(state, nodes, bodies),
        None => {
            let config = MailboxConfig::new()
                .with_tree(TreeConfig::new().with_leaf_size(4).with_node_size(4))
                .with_quantum(8);
            return Mailbox::new(OWNER, config, nodes, bodies);
        }
    }
}

fn incoming(n: u64) -> Vec<Incoming> {
    return (0..n).map(|i| Incoming::new(i as i64).with_body([format!("body {i}")])).collect();
}

/// Flip one payload byte of a node file so its checksum no longer matches.
fn corrupt(dir: &Path, handle: Handle) {
    let path = dir.join(format!("{}.node", handle.slot_name()));
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x20;
    fs::write(&path, bytes).unwrap();
}

fn first_leaf(mailbox: &DiskMailbox) -> Handle {
    return mailbox
        .list()
        .store()
        .handles()
        .unwrap()
        .into_iter()
        .find(|&handle| matches!(mailbox.list().store().read(handle), Ok(Node::Leaf(_))))
        .unwrap();
}

#[test]
fn mailbox_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let access = Access::new(OWNER);

    let state = {
        let mut mailbox = open(dir.path(), None);
        mailbox.receive_batch(&access, incoming(50), &mut NeverYield).unwrap();
        mailbox.rm_message_seq(&access, &"3-4, 20".parse().unwrap(), &mut NeverYield).unwrap();
        mailbox.keep(&access, &"10".parse().unwrap()).unwrap();
        serde_json::to_string(&mailbox.state()).unwrap()
    };

    let state: MailboxState = serde_json::from_str(&state).unwrap();
    let mut mailbox = open(dir.path(), Some(state));
    assert_eq!(mailbox.len(), 47);
    assert_eq!(mailbox.verify().unwrap(), vec![]);
    assert_eq!(mailbox.staged_count(), 3);
    assert_eq!(mailbox.messages_kept().to_string(), "10");

    mailbox.undo_rmm(&access).unwrap();
    assert_eq!(mailbox.len(), 50);
    assert_eq!(mailbox.body(3).unwrap(), Some(Body { lines: vec!["body 2".to_string()] }));
    assert_eq!(mailbox.messages_kept().to_string(), "12");

    // New messages continue the sequence rather than reusing handles.
    let before = mailbox.list().store().handles().unwrap();
    mailbox.receive(&access, Incoming::new(99)).unwrap();
    let after = mailbox.list().store().handles().unwrap();
    assert!(after.last() > before.last());
    assert_eq!(mailbox.message(51).unwrap().number, 51);
}

#[test]
fn corrupted_node_is_reported_and_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let access = Access::new(OWNER);
    let mut mailbox = open(dir.path(), None);
    mailbox.receive_batch(&access, incoming(30), &mut NeverYield).unwrap();

    let leaf = first_leaf(&mailbox);
    let Ok(Node::Leaf(lost)) = mailbox.list().store().read(leaf) else {
        panic!("expected a leaf");
    };
    corrupt(&dir.path().join("nodes"), leaf);

    assert!(matches!(
        mailbox.list().store().read(leaf),
        Err(Error::MalformedNode { handle, .. }) if handle == leaf
    ));
    let problems = mailbox.verify().unwrap();
    assert!(
        problems
            .iter()
            .any(|problem| matches!(problem, Inconsistency::Malformed { handle, .. } if *handle == leaf))
    );

    let report = mailbox.repair(&access, Consent::confirmed()).unwrap();
    assert_eq!(report.malformed, 1);
    assert_eq!(mailbox.len(), 30 - lost.len() as u64);
    assert_eq!(mailbox.verify().unwrap(), vec![]);
}

#[test]
fn restore_skips_unreadable_slots() {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let access = Access::new(OWNER);

    let mut source = open(source_dir.path(), None);
    source.receive_batch(&access, incoming(30), &mut NeverYield).unwrap();
    let leaf = first_leaf(&source);
    let Ok(Node::Leaf(lost)) = source.list().store().read(leaf) else {
        panic!("expected a leaf");
    };
    corrupt(&source_dir.path().join("nodes"), leaf);

    let mut target = open(target_dir.path(), None);
    let report = target
        .restore_from(&access, Consent::confirmed(), &source, &["lost".to_string()])
        .unwrap();
    assert_eq!(report.unreadable_nodes, 1);
    assert_eq!(report.messages_scanned, 30 - lost.len() as u64);
    assert_eq!(report.sentinel_bodies, 0);
    assert_eq!(target.len(), report.messages_scanned);
    assert_eq!(target.verify().unwrap(), vec![]);
}

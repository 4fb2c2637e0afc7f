// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! End-to-end mailbox behaviour: removal, undo, renumbering, yields,
//! quotas, and restore.

use biglist::BigList;
use biglist::Error;
use biglist::MailboxConfig;
use biglist::MemStore;
use biglist::MessageSeq;
use biglist::Node;
use biglist::NodeStore;
use biglist::Result;
use biglist::TreeConfig;
use biglist::mail::Access;
use biglist::mail::Body;
use biglist::mail::Consent;
use biglist::mail::Incoming;
use biglist::mail::Mailbox;
use biglist::mail::Message;
use biglist::mail::NeverYield;
use biglist::mail::Principal;

type TestMailbox = Mailbox<MemStore<Node<Message>>, MemStore<Body>>;

// =============================================================================
// Test helpers
// =============================================================================

const OWNER: Principal = Principal(42);

fn mailbox(leaf: usize, node: usize, quantum: u64) -> TestMailbox {
    let config = MailboxConfig::new()
        .with_tree(TreeConfig::new().with_leaf_size(leaf).with_node_size(node))
        .with_quantum(quantum);
    return Mailbox::new(OWNER, config, MemStore::new(), MemStore::new());
}

fn incoming(n: u64) -> Vec<Incoming> {
    return (0..n)
        .map(|i| {
            Incoming::new(1_000 + i as i64)
                .with_header("Subject", &format!("message {i}"))
                .with_body([format!("line one of {i}"), "line two".to_string()])
        })
        .collect();
}

fn numbers(mailbox: &TestMailbox) -> Vec<u64> {
    return mailbox.list().to_vec(mailbox.tree()).unwrap().iter().map(|m| m.number).collect();
}

fn seq(text: &str) -> MessageSeq {
    return text.parse().unwrap();
}

fn assert_ascending(mailbox: &TestMailbox) {
    let numbers = numbers(mailbox);
    assert!(numbers.windows(2).all(|pair| pair[0] < pair[1]), "{numbers:?}");
    assert_eq!(mailbox.verify().unwrap(), vec![]);
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn remove_then_renumber() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 8);
    mailbox.receive_batch(&access, incoming(5), &mut NeverYield).unwrap();
    assert_eq!(numbers(&mailbox), vec![1, 2, 3, 4, 5]);

    // Ranks 2 and 3, written as the half-open range [2, 4).
    let report = mailbox
        .rm_message_seq(&access, &MessageSeq::from_range(2, 4), &mut NeverYield)
        .unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(numbers(&mailbox), vec![1, 4, 5]);

    mailbox.expunge_rmm(&access).unwrap();
    mailbox.reap_all().unwrap();
    mailbox.renumber(&access, 1, &mut NeverYield).unwrap();
    assert_eq!(numbers(&mailbox), vec![1, 2, 3]);
    assert_eq!(mailbox.message(2).unwrap().header("subject"), Some("message 3"));
}

#[test]
fn undo_before_expunge_restores_everything() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 8);
    mailbox.receive_batch(&access, incoming(200), &mut NeverYield).unwrap();
    let before = mailbox.list().to_vec(mailbox.tree()).unwrap();

    mailbox.rm_message_seq(&access, &seq("1, 17-60, 99, 150-200"), &mut NeverYield).unwrap();
    assert_eq!(mailbox.len(), 200 - 1 - 44 - 1 - 51);
    mailbox.undo_rmm(&access).unwrap();

    assert_eq!(mailbox.len(), 200);
    assert_eq!(mailbox.list().to_vec(mailbox.tree()).unwrap(), before);
    assert_eq!(mailbox.verify().unwrap(), vec![]);
}

#[test]
fn extract_range_touches_logarithmic_nodes() {
    let mut list: BigList<u64, MemStore<Node<u64>>> = BigList::new(MemStore::new(), TreeConfig::default());
    let tree = list.push_back(&list.empty(), (1..=10_000).collect()).unwrap();
    let height = tree.height as u64;

    list.store().reset_stats();
    let (remaining, detached) = list.extract_range(&tree, 5_000, 5_004).unwrap();
    let touches = list.store().stats().touches();

    assert_eq!(detached.count, 5);
    assert_eq!(remaining.count, 9_995);
    assert!(touches < 500, "extract_range touched {touches} nodes");
    assert!(touches <= 80 * (height + 1), "extract_range touched {touches} nodes at height {height}");

    list.store().reset_stats();
    let restored = list.insert_after(&remaining, detached, 4_999).unwrap();
    let touches = list.store().stats().touches();
    assert!(touches <= 80 * (height + 1), "insert_after touched {touches} nodes at height {height}");
    assert_eq!(list.find_nth(&restored, 5_002).unwrap(), 5_002);
}

#[test]
fn renumber_aborts_on_a_removal_during_a_yield() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 10);
    mailbox.receive_batch(&access, incoming(60), &mut NeverYield).unwrap();
    mailbox.rm_message_seq(&access, &seq("1-5"), &mut NeverYield).unwrap();
    mailbox.expunge_rmm(&access).unwrap();

    let mut yields = 0;
    let mut concurrent_delete = |mailbox: &mut TestMailbox| -> Result<()> {
        yields += 1;
        if yields == 1 {
            mailbox.rm_message_seq(&access, &seq("30-31"), &mut NeverYield)?;
        }
        return Ok(());
    };
    let err = mailbox.renumber(&access, 1, &mut concurrent_delete).unwrap_err();
    assert!(matches!(err, Error::Aborted { processed: 10, .. }), "{err}");
    assert_eq!(yields, 1);
    assert_ascending(&mailbox);
    assert_eq!(mailbox.staged_count(), 2);

    // Once the removal settles, renumbering finishes the job.
    mailbox.expunge_rmm(&access).unwrap();
    mailbox.renumber(&access, 1, &mut NeverYield).unwrap();
    assert_eq!(numbers(&mailbox), (1..=53).collect::<Vec<_>>());
}

#[test]
fn renumber_aborts_when_a_removal_is_expunged_during_a_yield() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 10);
    mailbox.receive_batch(&access, incoming(60), &mut NeverYield).unwrap();
    mailbox.rm_message_seq(&access, &seq("1-5"), &mut NeverYield).unwrap();
    mailbox.expunge_rmm(&access).unwrap();

    // The staging area is empty again by the time renumbering resumes.
    let mut yields = 0;
    let mut delete_and_expunge = |mailbox: &mut TestMailbox| -> Result<()> {
        yields += 1;
        if yields == 1 {
            mailbox.rm_message_seq(&access, &seq("1"), &mut NeverYield)?;
            mailbox.expunge_rmm(&access)?;
        }
        return Ok(());
    };
    let err = mailbox.renumber(&access, 1, &mut delete_and_expunge).unwrap_err();
    assert!(matches!(err, Error::Aborted { processed: 10, .. }), "{err}");
    assert_ascending(&mailbox);
    assert_eq!(mailbox.staged_count(), 0);
    assert_eq!(mailbox.len(), 54);

    mailbox.renumber(&access, 1, &mut NeverYield).unwrap();
    assert_eq!(numbers(&mailbox), (1..=54).collect::<Vec<_>>());
    assert_eq!(mailbox.verify().unwrap(), vec![]);
}

#[test]
fn restore_from_a_damaged_source() {
    let access = Access::new(OWNER);
    let mut source = mailbox(4, 4, 8);
    source.receive_batch(&access, incoming(40), &mut NeverYield).unwrap();
    // Staged messages are still in the store, so a raw scan finds them.
    source.rm_message_seq(&access, &seq("35-40"), &mut NeverYield).unwrap();
    for rank in [2, 11, 12, 30] {
        let body = source.message(rank).unwrap().body.unwrap();
        source.bodies_mut().free(body).unwrap();
    }
    let before = source.list().to_vec(source.tree()).unwrap();

    let mut target = mailbox(8, 8, 16);
    let placeholder = vec!["[lost]".to_string()];
    let report = target
        .restore_from(&access, Consent::confirmed(), &source, &placeholder)
        .unwrap();

    assert_eq!(report.messages_scanned, 40);
    assert_eq!(report.sentinel_bodies, 4);
    assert_eq!(report.recovered + report.sentinel_bodies, report.messages_scanned);
    assert_eq!(target.len(), 40);
    assert_eq!(numbers(&target), (1..=40).collect::<Vec<_>>());
    assert_eq!(target.verify().unwrap(), vec![]);

    assert_eq!(source.len(), 34);
    assert_eq!(source.list().to_vec(source.tree()).unwrap(), before);
    assert_eq!(source.staged_count(), 6);
}

// =============================================================================
// Capabilities, quotas, and cancellation
// =============================================================================

#[test]
fn strangers_are_refused_everywhere() {
    let owner = Access::new(OWNER);
    let stranger = Access::new(Principal(7));
    let mut mailbox = mailbox(4, 4, 8);
    mailbox.receive_batch(&owner, incoming(10), &mut NeverYield).unwrap();

    let denied = |result: Result<()>| matches!(result, Err(Error::PermissionDenied { principal: 7 }));
    assert!(denied(mailbox.receive_batch(&stranger, incoming(1), &mut NeverYield).map(|_| ())));
    assert!(denied(mailbox.rm_message_seq(&stranger, &seq("1"), &mut NeverYield).map(|_| ())));
    assert!(denied(mailbox.undo_rmm(&stranger).map(|_| ())));
    assert!(denied(mailbox.expunge_rmm(&stranger).map(|_| ())));
    assert!(denied(mailbox.renumber(&stranger, 1, &mut NeverYield).map(|_| ())));
    assert!(denied(mailbox.repair(&stranger, Consent::confirmed()).map(|_| ())));
    assert!(denied(mailbox.keep(&stranger, &seq("1"))));
    assert_eq!(mailbox.len(), 10);

    // A wizard may act on anyone's mailbox.
    let wizard = Access::wizard(Principal(7));
    assert_eq!(mailbox.rm_message_seq(&wizard, &seq("1"), &mut NeverYield).unwrap().removed, 1);
}

#[test]
fn quota_exhaustion_reports_partial_progress() {
    let access = Access::new(OWNER);
    let config = MailboxConfig::new()
        .with_tree(TreeConfig::new().with_leaf_size(2).with_node_size(3))
        .with_quantum(4);
    let mut mailbox: TestMailbox = Mailbox::new(OWNER, config, MemStore::new().with_quota(20), MemStore::new());

    let err = mailbox.receive_batch(&access, incoming(100), &mut NeverYield).unwrap_err();
    let processed = err.processed().unwrap();
    assert!(matches!(err.root_cause(), Error::ResourceExhausted { .. }), "{err}");
    assert!(processed > 0 && processed < 100);
    assert_eq!(processed % 4, 0);

    assert_eq!(mailbox.len(), processed);
    assert_eq!(mailbox.bodies().len(), processed);
    assert_ascending(&mailbox);
    assert_eq!(numbers(&mailbox), (1..=processed).collect::<Vec<_>>());
}

#[test]
fn cancellation_keeps_committed_chunks() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 5);
    let mut yields = 0;
    let mut cancel_second = |_: &mut TestMailbox| -> Result<()> {
        yields += 1;
        if yields == 2 {
            return Err(Error::Cancelled);
        }
        return Ok(());
    };
    let err = mailbox.receive_batch(&access, incoming(30), &mut cancel_second).unwrap_err();
    assert_eq!(err.processed(), Some(10));
    assert!(matches!(err.root_cause(), Error::Cancelled));
    assert_eq!(mailbox.len(), 10);
    assert_ascending(&mailbox);
}

#[test]
fn numbers_stay_increasing_when_receiving_during_a_yield() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 4);
    let mut interleave = |mailbox: &mut TestMailbox| -> Result<()> {
        mailbox.receive(&access, Incoming::new(0))?;
        return Ok(());
    };
    let report = mailbox.receive_batch(&access, incoming(12), &mut interleave).unwrap();
    assert_eq!(report.received, 12);
    assert_eq!(mailbox.len(), 14);
    assert_eq!(numbers(&mailbox), (1..=14).collect::<Vec<_>>());
}

#[test]
fn numbers_are_not_reused_while_removals_are_staged() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 8);
    mailbox.receive_batch(&access, incoming(10), &mut NeverYield).unwrap();
    mailbox.rm_message_seq(&access, &seq("8-10"), &mut NeverYield).unwrap();
    assert_eq!(mailbox.receive(&access, Incoming::new(0)).unwrap(), 11);

    mailbox.undo_rmm(&access).unwrap();
    assert_ascending(&mailbox);
    assert_eq!(mailbox.len(), 11);
}

#[test]
fn boundaries_are_range_errors() {
    let access = Access::new(OWNER);
    let mut mailbox = mailbox(4, 4, 8);
    assert!(matches!(mailbox.message(1), Err(Error::OutOfRange { rank: 1, len: 0 })));
    mailbox.receive_batch(&access, incoming(3), &mut NeverYield).unwrap();
    assert!(matches!(mailbox.message(0), Err(Error::OutOfRange { rank: 0, .. })));
    assert!(matches!(mailbox.message(4), Err(Error::OutOfRange { rank: 4, len: 3 })));

    let tree = mailbox.tree().clone();
    let (same, detached) = mailbox.list_mut().extract_range(&tree, 3, 2).unwrap();
    assert_eq!(same, tree);
    assert!(detached.is_empty());
}

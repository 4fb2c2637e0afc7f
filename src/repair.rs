// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Structural repair.
//!
//! Rebuilds a damaged tree from the raw node graph:
//! - counts and first-key summaries are re-derived bottom-up
//! - references to missing, malformed, or already-claimed nodes are dropped
//! - empty nodes are freed
//! - an internal node whose children ended up at different heights is
//!   dissolved and its children joined back together
//! - live nodes reachable from nothing (orphans) are joined onto the end
//!
//! Repair never frees a node that holds elements. On a consistent tree with
//! no orphans it writes nothing.

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::node::Child;
use crate::node::Element;
use crate::node::Node;
use crate::node::Tree;
use crate::store::NodeStore;
use crate::tree::BigList;
use crate::tree::Inconsistency;

/// Counts of what a repair found and changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub nodes_visited: u64,
    /// Child entries whose element count was wrong.
    pub counts_fixed: u64,
    /// Child entries whose first key was wrong.
    pub summaries_fixed: u64,
    /// References to nodes that no longer exist.
    pub dangling_dropped: u64,
    /// Second and later references to the same node.
    pub shared_dropped: u64,
    pub empty_pruned: u64,
    /// Internal nodes dissolved because their children had uneven heights.
    pub rebalanced: u64,
    /// References to nodes that could not be decoded.
    pub malformed: u64,
    pub orphans_reattached: u64,
    pub orphan_elements: u64,
    /// Unreferenced nodes that could not be read, left in place.
    pub unreadable_orphans: u64,
    /// Whether the tree handle itself changed.
    pub root_fixed: bool,
}

impl RepairReport {
    /// True if the repair changed nothing.
    pub fn is_clean(&self) -> bool {
        return self.counts_fixed == 0
            && self.summaries_fixed == 0
            && self.dangling_dropped == 0
            && self.shared_dropped == 0
            && self.empty_pruned == 0
            && self.rebalanced == 0
            && self.malformed == 0
            && self.orphans_reattached == 0
            && !self.root_fixed;
    }
}

impl<T: Element, S: NodeStore<Node<T>>> BigList<T, S> {
    /// Repair `tree` in place, returning the corrected handle.
    ///
    /// `protected` lists roots of other live subtrees sharing the store
    /// (staged deletions, queued teardowns). Their nodes are neither treated
    /// as orphans nor claimed by the repaired tree.
    pub fn repair(&mut self, tree: &Tree<T::Key>, protected: &[Handle]) -> Result<(Tree<T::Key>, RepairReport)> {
        let mut report = RepairReport::default();

        let problems: Vec<Inconsistency> = self
            .verify(tree)?
            .into_iter()
            .filter(|problem| !matches!(problem, Inconsistency::OutOfOrder { .. }))
            .collect();

        let mut claimed = FxHashSet::default();
        for &root in protected {
            self.mark(root, &mut claimed);
        }
        let mut reachable = claimed.clone();
        if let Some(root) = tree.root {
            self.mark(root, &mut reachable);
        }
        let orphans = self.orphan_roots(&reachable, &mut report)?;

        if problems.is_empty() && orphans.is_empty() {
            info!(count = tree.count, "tree is consistent, nothing to repair");
            return Ok((tree.clone(), report));
        }
        for problem in &problems {
            debug!(%problem, "inconsistency");
        }
        warn!(problems = problems.len(), orphans = orphans.len(), "repairing tree");

        let mut seen = claimed;
        let mut result = match tree.root {
            Some(root) => self.rebuild(root, &mut seen, &mut report)?.unwrap_or_default(),
            None => Tree::empty(),
        };
        for orphan in orphans {
            let Some(subtree) = self.rebuild(orphan, &mut seen, &mut report)? else {
                continue;
            };
            report.orphans_reattached += 1;
            report.orphan_elements += subtree.count;
            result = self.join_trees(result, subtree)?;
        }

        report.root_fixed = result != *tree;
        info!(
            count = result.count,
            visited = report.nodes_visited,
            counts_fixed = report.counts_fixed,
            orphans = report.orphans_reattached,
            "repair finished"
        );
        return Ok((result, report));
    }

    /// Collect every node reachable from `handle`, skipping unreadable ones.
    fn mark(&self, handle: Handle, seen: &mut FxHashSet<Handle>) {
        if !seen.insert(handle) {
            return;
        }
        if let Ok(Node::Internal(children)) = self.store().read(handle) {
            for child in children {
                self.mark(child.handle, seen);
            }
        }
    }

    /// Live nodes outside `reachable` that no other such node references,
    /// in ascending handle order.
    fn orphan_roots(&self, reachable: &FxHashSet<Handle>, report: &mut RepairReport) -> Result<Vec<Handle>> {
        let mut referenced = FxHashSet::default();
        let mut readable = Vec::new();
        for handle in self.store().handles()? {
            if reachable.contains(&handle) {
                continue;
            }
            match self.store().read(handle) {
                Ok(Node::Internal(children)) => {
                    referenced.extend(children.iter().map(|child| child.handle));
                    readable.push(handle);
                }
                Ok(Node::Leaf(_)) => readable.push(handle),
                Err(Error::NotFound(_) | Error::MalformedNode { .. }) => {
                    warn!(%handle, "unreadable unreferenced node left in place");
                    report.unreadable_orphans += 1;
                }
                Err(e) => return Err(e),
            }
        }
        readable.retain(|handle| !referenced.contains(handle));
        return Ok(readable);
    }

    /// Rebuild the subtree at `handle`, returning `None` if nothing survives.
    fn rebuild(
        &mut self,
        handle: Handle,
        seen: &mut FxHashSet<Handle>,
        report: &mut RepairReport,
    ) -> Result<Option<Tree<T::Key>>> {
        if !seen.insert(handle) {
            report.shared_dropped += 1;
            return Ok(None);
        }
        report.nodes_visited += 1;
        let node = match self.store().read(handle) {
            Ok(node) => node,
            Err(Error::NotFound(_)) => {
                report.dangling_dropped += 1;
                return Ok(None);
            }
            Err(Error::MalformedNode { reason, .. }) => {
                warn!(%handle, %reason, "dropping malformed node");
                report.malformed += 1;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let children = match node {
            Node::Leaf(elements) => {
                let Some(first) = elements.first().map(Element::key) else {
                    self.store_mut().free(handle)?;
                    report.empty_pruned += 1;
                    return Ok(None);
                };
                return Ok(Some(Tree {
                    root: Some(handle),
                    count: elements.len() as u64,
                    first: Some(first),
                    height: 0,
                }));
            }
            Node::Internal(children) => children,
        };

        let mut subtrees = Vec::with_capacity(children.len());
        for child in &children {
            let Some(subtree) = self.rebuild(child.handle, seen, report)? else {
                continue;
            };
            if subtree.root == Some(child.handle) {
                if subtree.count != child.count {
                    report.counts_fixed += 1;
                }
                if subtree.first.as_ref() != Some(&child.first) {
                    report.summaries_fixed += 1;
                }
            }
            subtrees.push(subtree);
        }

        let Some(height) = subtrees.first().map(|subtree| subtree.height) else {
            self.store_mut().free(handle)?;
            report.empty_pruned += 1;
            return Ok(None);
        };

        if subtrees.iter().all(|subtree| subtree.height == height) {
            let entries: Vec<Child<T::Key>> = subtrees.iter().filter_map(Tree::as_child).collect();
            let count = entries.iter().map(|entry| entry.count).sum();
            let first = entries.first().map(|entry| entry.first.clone());
            if entries != children {
                self.store_mut().write(handle, Node::Internal(entries))?;
            }
            return Ok(Some(Tree {
                root: Some(handle),
                count,
                first,
                height: height + 1,
            }));
        }

        report.rebalanced += 1;
        self.store_mut().free(handle)?;
        let mut joined = Tree::empty();
        for subtree in subtrees {
            joined = self.join_trees(joined, subtree)?;
        }
        return Ok(Some(joined));
    }
}

// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Budgeted teardown of detached subtrees.
//!
//! A [`Reaper`] holds the nodes still to be freed. Each [`Reaper::step`]
//! frees at most `budget` nodes, so a huge expunge can be spread across many
//! yields. The queue is plain data and survives being persisted between
//! steps.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::node::Element;
use crate::node::Node;
use crate::node::Tree;
use crate::store::NodeStore;
use crate::tree::BigList;

/// What one reaping step accomplished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapProgress {
    pub nodes_freed: u64,
    pub elements: u64,
    /// Queued nodes that were already gone.
    pub missing: u64,
    /// True once the queue is empty.
    pub done: bool,
}

/// Queue of nodes waiting to be freed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaper {
    pending: Vec<Handle>,
}

impl Reaper {
    pub fn new() -> Reaper {
        return Reaper::default();
    }

    /// Queue a detached subtree for teardown.
    pub fn push<K>(&mut self, tree: Tree<K>) {
        if let Some(root) = tree.root {
            self.pending.push(root);
        }
    }

    pub fn is_empty(&self) -> bool {
        return self.pending.is_empty();
    }

    /// Roots of the subtrees still queued.
    pub fn pending(&self) -> &[Handle] {
        return &self.pending;
    }

    /// Free up to `budget` nodes, calling `cleanup` once per element of
    /// every freed leaf.
    pub fn step<T, S, F>(
        &mut self,
        list: &mut BigList<T, S>,
        budget: u64,
        mut cleanup: F,
    ) -> Result<ReapProgress>
    where
        T: Element,
        S: NodeStore<Node<T>>,
        F: FnMut(T) -> Result<()>,
    {
        let mut progress = ReapProgress::default();
        while progress.nodes_freed + progress.missing < budget {
            let Some(handle) = self.pending.pop() else {
                break;
            };
            let node = match list.store().read(handle) {
                Ok(node) => node,
                Err(Error::NotFound(_)) => {
                    warn!(%handle, "queued node already freed");
                    progress.missing += 1;
                    continue;
                }
                Err(e) => {
                    self.pending.push(handle);
                    return Err(e);
                }
            };
            list.store_mut().free(handle)?;
            progress.nodes_freed += 1;
            match node {
                Node::Leaf(elements) => {
                    for element in elements {
                        progress.elements += 1;
                        cleanup(element)?;
                    }
                }
                Node::Internal(children) => {
                    self.pending.extend(children.into_iter().rev().map(|child| child.handle));
                }
            }
        }
        progress.done = self.pending.is_empty();
        debug!(
            freed = progress.nodes_freed,
            elements = progress.elements,
            queued = self.pending.len(),
            "reaper step"
        );
        return Ok(progress);
    }
}

impl<T: Element, S: NodeStore<Node<T>>> BigList<T, S> {
    /// Free every node of a detached subtree, calling `cleanup` once per element.
    pub fn kill<F>(&mut self, tree: Tree<T::Key>, mut cleanup: F) -> Result<u64>
    where
        F: FnMut(T) -> Result<()>,
    {
        let mut reaper = Reaper::new();
        reaper.push(tree);
        let mut elements = 0;
        loop {
            let progress = reaper.step(self, u64::MAX, &mut cleanup)?;
            elements += progress.elements;
            if progress.done {
                return Ok(elements);
            }
        }
    }
}

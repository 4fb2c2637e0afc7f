// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Balanced Sequence Tree
//!
//! An order-statistics B-tree whose nodes live in a [`NodeStore`]. Every
//! internal entry caches the element count and first key of its child, so
//! rank lookups and ordered searches read one node per level.
//!
//! Structure:
//! - Leaves hold up to `leaf_size` elements
//! - Internal nodes hold up to `node_size` child entries
//! - All leaves sit at the same depth, recorded in the tree handle
//!
//! The tree is relaxed: nodes are never empty, but they may be under-full
//! after a split. Small neighbours are merged whenever a join touches them.
//!
//! Operations (h = height):
//! - find_nth / set_nth: O(h)
//! - push_back: O(h + k) for k appended elements
//! - split / join: O(h) node touches
//! - extract_range / insert_after: two splits and two joins, O(h)
//!
//! Structural operations check the store's remaining quota before their
//! first write, so running out of space leaves the input tree untouched.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use smallvec::smallvec;
use tracing::debug;
use tracing::trace;

use crate::config::TreeConfig;
use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::node::Child;
use crate::node::Element;
use crate::node::Node;
use crate::node::Tree;
use crate::node::locate;
use crate::store::NodeStore;

/// Handles a rewrite may reuse before allocating fresh ones.
type Reuse = SmallVec<[Handle; 2]>;

/// A sequence tree engine over a node store.
///
/// The engine holds no tree of its own: every operation takes a [`Tree`]
/// handle and returns the new one, and the caller decides where to keep it.
#[derive(Debug)]
pub struct BigList<T, S> {
    store: S,
    config: TreeConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element, S: NodeStore<Node<T>>> BigList<T, S> {
    pub fn new(store: S, config: TreeConfig) -> BigList<T, S> {
        return BigList {
            store,
            config: config.normalized(),
            _marker: PhantomData,
        };
    }

    pub fn store(&self) -> &S {
        return &self.store;
    }

    pub fn store_mut(&mut self) -> &mut S {
        return &mut self.store;
    }

    pub fn config(&self) -> &TreeConfig {
        return &self.config;
    }

    pub fn into_store(self) -> S {
        return self.store;
    }

    /// A tree with no elements. It owns no nodes until the first insert.
    pub fn empty(&self) -> Tree<T::Key> {
        return Tree::empty();
    }

    // ========================================================================
    // Node access
    // ========================================================================

    #[inline]
    fn capacity(&self, height: u32) -> usize {
        if height == 0 {
            return self.config.leaf_size;
        }
        return self.config.node_size;
    }

    /// Read a node and check that its kind matches its height.
    pub(crate) fn read_at(&self, handle: Handle, height: u32) -> Result<Node<T>> {
        let node = self.store.read(handle)?;
        if node.is_leaf() != (height == 0) {
            return Err(Error::malformed(
                handle,
                format!("found {} at height {height}", node.kind()),
            ));
        }
        return Ok(node);
    }

    fn read_leaf(&self, handle: Handle) -> Result<Vec<T>> {
        match self.store.read(handle)? {
            Node::Leaf(elements) => return Ok(elements),
            Node::Internal(_) => {
                return Err(Error::malformed(handle, "expected a leaf, found an internal node"));
            }
        }
    }

    fn read_children(&self, handle: Handle, height: u32) -> Result<Vec<Child<T::Key>>> {
        match self.read_at(handle, height)? {
            Node::Internal(children) => return Ok(children),
            Node::Leaf(_) => return Err(Error::malformed(handle, "expected an internal node")),
        }
    }

    /// Store a non-empty node, reusing `reuse` if given, and return its entry.
    fn put(&mut self, reuse: Option<Handle>, node: Node<T>) -> Result<Child<T::Key>> {
        let Some(first) = node.first_key() else {
            return Err(Error::malformed(
                reuse.unwrap_or_default(),
                "refusing to store an empty node",
            ));
        };
        let count = node.count();
        let handle = match reuse {
            Some(handle) => {
                self.store.write(handle, node)?;
                handle
            }
            None => self.store.allocate(node)?,
        };
        return Ok(Child {
            handle,
            count,
            first,
        });
    }

    /// The entry for a non-empty tree.
    fn entry(&self, tree: &Tree<T::Key>) -> Result<Child<T::Key>> {
        return tree.as_child().ok_or_else(|| {
            Error::malformed(tree.root.unwrap_or_default(), "tree handle has no first key")
        });
    }

    fn check_rank(&self, tree: &Tree<T::Key>, rank: u64) -> Result<()> {
        if rank == 0 || rank > tree.count {
            return Err(Error::OutOfRange {
                rank,
                len: tree.count,
            });
        }
        return Ok(());
    }

    // ========================================================================
    // Quota
    // ========================================================================

    /// Fail up front if the store cannot satisfy `needed` allocations.
    fn reserve(&self, needed: u64) -> Result<()> {
        if let Some(available) = self.store.available() {
            if available < needed {
                return Err(Error::ResourceExhausted { needed, available });
            }
        }
        return Ok(());
    }

    fn join_budget(height: u32) -> u64 {
        return height as u64 + 4;
    }

    fn split_budget(height: u32) -> u64 {
        let h = height as u64;
        return (h + 1) * (2 * h + 8);
    }

    fn append_budget(&self, height: u32, added: u64) -> u64 {
        let half = (self.config.leaf_size as u64 / 2).max(1);
        return added / half + 4 * (height as u64 + 2);
    }

    // ========================================================================
    // Packing
    // ========================================================================

    /// Store `node`, cutting it into evenly sized nodes if it is over capacity.
    ///
    /// Handles in `reuse` are written first; any left over are freed.
    fn pack(&mut self, reuse: Reuse, node: Node<T>, height: u32) -> Result<Vec<Child<T::Key>>> {
        let width = node.width();
        let parts = width.div_ceil(self.capacity(height));
        let mut pieces = Vec::with_capacity(parts);
        if parts > 0 {
            let base = width / parts;
            let extra = width % parts;
            let mut rest = node;
            for i in 0..parts - 1 {
                let size = base + usize::from(i < extra);
                let tail = rest.split_off(size);
                pieces.push(rest);
                rest = tail;
            }
            pieces.push(rest);
        }

        let mut reuse = reuse.into_iter();
        let mut entries = Vec::with_capacity(pieces.len());
        for piece in pieces {
            entries.push(self.put(reuse.next(), piece)?);
        }
        for handle in reuse {
            self.store.free(handle)?;
        }
        return Ok(entries);
    }

    /// Build parent levels over `entries` (all at `height`) until one root remains.
    fn raise(&mut self, mut entries: Vec<Child<T::Key>>, mut height: u32) -> Result<Tree<T::Key>> {
        loop {
            match entries.len() {
                0 => return Ok(Tree::empty()),
                1 => {
                    let Some(root) = entries.pop() else {
                        return Ok(Tree::empty());
                    };
                    return Ok(Tree::from_child(root, height));
                }
                _ => {
                    height += 1;
                    entries = self.pack(SmallVec::new(), Node::Internal(entries), height)?;
                }
            }
        }
    }

    /// Combine two adjacent nodes of the same height.
    ///
    /// Merges them if they fit in one node, leaves them alone if both are at
    /// least half full, and otherwise evens them out.
    fn fuse(
        &mut self,
        left: Child<T::Key>,
        right: Child<T::Key>,
        height: u32,
    ) -> Result<Vec<Child<T::Key>>> {
        let capacity = self.capacity(height);
        let half = capacity / 2;
        let mut node = self.read_at(left.handle, height)?;
        let other = self.read_at(right.handle, height)?;
        let (lw, rw) = (node.width(), other.width());
        if lw + rw > capacity && lw >= half && rw >= half {
            return Ok(vec![left, right]);
        }
        if !node.append(other) {
            return Err(Error::malformed(right.handle, "sibling kinds differ"));
        }
        return self.pack(smallvec![left.handle, right.handle], node, height);
    }

    // ========================================================================
    // Join
    // ========================================================================

    /// Splice `piece` (a subtree of `piece_height`) onto the right edge of
    /// the subtree at `handle`. Returns the replacement entries for `handle`.
    fn graft_right(
        &mut self,
        handle: Handle,
        height: u32,
        piece: Child<T::Key>,
        piece_height: u32,
    ) -> Result<Vec<Child<T::Key>>> {
        let mut children = self.read_children(handle, height)?;
        let Some(last) = children.pop() else {
            return Err(Error::malformed(handle, "internal node has no children"));
        };
        let replaced = if height - 1 == piece_height {
            self.fuse(last, piece, piece_height)?
        } else {
            self.graft_right(last.handle, height - 1, piece, piece_height)?
        };
        children.extend(replaced);
        return self.pack(smallvec![handle], Node::Internal(children), height);
    }

    /// Mirror of [`BigList::graft_right`] for the left edge.
    fn graft_left(
        &mut self,
        handle: Handle,
        height: u32,
        piece: Child<T::Key>,
        piece_height: u32,
    ) -> Result<Vec<Child<T::Key>>> {
        let mut children = self.read_children(handle, height)?;
        if children.is_empty() {
            return Err(Error::malformed(handle, "internal node has no children"));
        }
        let first = children.remove(0);
        let mut merged = if height - 1 == piece_height {
            self.fuse(piece, first, piece_height)?
        } else {
            self.graft_left(first.handle, height - 1, piece, piece_height)?
        };
        merged.extend(children);
        return self.pack(smallvec![handle], Node::Internal(merged), height);
    }

    /// Concatenate two trees, consuming both.
    pub(crate) fn join_trees(
        &mut self,
        left: Tree<T::Key>,
        right: Tree<T::Key>,
    ) -> Result<Tree<T::Key>> {
        if left.is_empty() {
            return Ok(right);
        }
        if right.is_empty() {
            return Ok(left);
        }
        let l = self.entry(&left)?;
        let r = self.entry(&right)?;
        if left.height == right.height {
            let entries = self.fuse(l, r, left.height)?;
            return self.raise(entries, left.height);
        }
        if left.height > right.height {
            let entries = self.graft_right(l.handle, left.height, r, right.height)?;
            return self.raise(entries, left.height);
        }
        let entries = self.graft_left(r.handle, right.height, l, left.height)?;
        return self.raise(entries, right.height);
    }

    // ========================================================================
    // Split
    // ========================================================================

    /// Turn a run of sibling entries at `height` into a tree, collapsing a
    /// single child into its own subtree.
    fn assemble(
        &mut self,
        reuse: Option<Handle>,
        mut children: Vec<Child<T::Key>>,
        height: u32,
    ) -> Result<Tree<T::Key>> {
        if children.len() <= 1 {
            if let Some(handle) = reuse {
                self.store.free(handle)?;
            }
            match children.pop() {
                Some(child) => return Ok(Tree::from_child(child, height - 1)),
                None => return Ok(Tree::empty()),
            }
        }
        let entry = self.put(reuse, Node::Internal(children))?;
        return Ok(Tree::from_child(entry, height));
    }

    /// Split the subtree at `handle` after its first `at` elements.
    /// Requires `0 < at < count`. The node itself is reused or freed.
    fn split_node(
        &mut self,
        handle: Handle,
        height: u32,
        at: u64,
    ) -> Result<(Tree<T::Key>, Tree<T::Key>)> {
        match self.read_at(handle, height)? {
            Node::Leaf(mut elements) => {
                if at == 0 || at as usize >= elements.len() {
                    return Err(Error::malformed(handle, "split point outside leaf"));
                }
                let right = elements.split_off(at as usize);
                let l = self.put(Some(handle), Node::Leaf(elements))?;
                let r = self.put(None, Node::Leaf(right))?;
                return Ok((Tree::from_child(l, 0), Tree::from_child(r, 0)));
            }
            Node::Internal(mut children) => {
                let Some((index, before)) = locate(&children, at) else {
                    return Err(Error::malformed(handle, "entries count fewer elements than recorded"));
                };
                if before == at {
                    let right = children.split_off(index);
                    let left = self.assemble(Some(handle), children, height)?;
                    let right = self.assemble(None, right, height)?;
                    return Ok((left, right));
                }

                let right = children.split_off(index + 1);
                let Some(inner) = children.pop() else {
                    return Err(Error::malformed(handle, "lost the child being split"));
                };
                let (inner_left, inner_right) = self.split_node(inner.handle, height - 1, at - before)?;
                let left_piece = self.assemble(Some(handle), children, height)?;
                let right_piece = self.assemble(None, right, height)?;
                let left = self.join_trees(left_piece, inner_left)?;
                let right = self.join_trees(inner_right, right_piece)?;
                return Ok((left, right));
            }
        }
    }

    fn split_tree(&mut self, tree: Tree<T::Key>, at: u64) -> Result<(Tree<T::Key>, Tree<T::Key>)> {
        if at > tree.count {
            return Err(Error::OutOfRange {
                rank: at,
                len: tree.count,
            });
        }
        if at == 0 {
            return Ok((Tree::empty(), tree));
        }
        if at == tree.count {
            return Ok((tree, Tree::empty()));
        }
        let Some(root) = tree.root else {
            return Err(Error::OutOfRange {
                rank: at,
                len: 0,
            });
        };
        return self.split_node(root, tree.height, at);
    }

    /// Split a tree after its first `at` elements, consuming it.
    pub fn split(&mut self, tree: Tree<T::Key>, at: u64) -> Result<(Tree<T::Key>, Tree<T::Key>)> {
        if at > tree.count {
            return Err(Error::OutOfRange {
                rank: at,
                len: tree.count,
            });
        }
        self.reserve(Self::split_budget(tree.height))?;
        return self.split_tree(tree, at);
    }

    /// Concatenate two trees, consuming both.
    pub fn join(&mut self, left: Tree<T::Key>, right: Tree<T::Key>) -> Result<Tree<T::Key>> {
        self.reserve(Self::join_budget(left.height.max(right.height)))?;
        return self.join_trees(left, right);
    }

    // ========================================================================
    // Range operations
    // ========================================================================

    /// Remove ranks `lo..=hi` as one detached subtree.
    ///
    /// Returns `(remaining, detached)`. When `lo > hi` nothing is touched and
    /// the detached tree is empty.
    pub fn extract_range(
        &mut self,
        tree: &Tree<T::Key>,
        lo: u64,
        hi: u64,
    ) -> Result<(Tree<T::Key>, Tree<T::Key>)> {
        if lo > hi {
            return Ok((tree.clone(), Tree::empty()));
        }
        self.check_rank(tree, lo)?;
        self.check_rank(tree, hi)?;
        self.reserve(2 * Self::split_budget(tree.height) + Self::join_budget(tree.height))?;

        let (left, rest) = self.split_tree(tree.clone(), lo - 1)?;
        let (middle, right) = self.split_tree(rest, hi - lo + 1)?;
        let remaining = self.join_trees(left, right)?;
        debug!(lo, hi, remaining = remaining.count, "extracted range");
        return Ok((remaining, middle));
    }

    /// Splice a detached subtree in after `rank` (0 puts it at the front).
    pub fn insert_after(
        &mut self,
        tree: &Tree<T::Key>,
        subtree: Tree<T::Key>,
        rank: u64,
    ) -> Result<Tree<T::Key>> {
        if rank > tree.count {
            return Err(Error::OutOfRange {
                rank,
                len: tree.count,
            });
        }
        if subtree.is_empty() {
            return Ok(tree.clone());
        }
        let height = tree.height.max(subtree.height);
        self.reserve(Self::split_budget(tree.height) + 2 * Self::join_budget(height + 1))?;

        let added = subtree.count;
        let (left, right) = self.split_tree(tree.clone(), rank)?;
        let joined = self.join_trees(left, subtree)?;
        let result = self.join_trees(joined, right)?;
        debug!(rank, added, count = result.count, "spliced subtree");
        return Ok(result);
    }

    // ========================================================================
    // Appends
    // ========================================================================

    fn append_right(
        &mut self,
        handle: Handle,
        height: u32,
        added: Vec<T>,
    ) -> Result<Vec<Child<T::Key>>> {
        match self.read_at(handle, height)? {
            Node::Leaf(mut elements) => {
                elements.extend(added);
                return self.pack(smallvec![handle], Node::Leaf(elements), 0);
            }
            Node::Internal(mut children) => {
                let Some(last) = children.pop() else {
                    return Err(Error::malformed(handle, "internal node has no children"));
                };
                let replaced = self.append_right(last.handle, height - 1, added)?;
                children.extend(replaced);
                return self.pack(smallvec![handle], Node::Internal(children), height);
            }
        }
    }

    /// Append a batch of elements to the end of the tree.
    pub fn push_back(&mut self, tree: &Tree<T::Key>, elements: Vec<T>) -> Result<Tree<T::Key>> {
        if elements.is_empty() {
            return Ok(tree.clone());
        }
        self.reserve(self.append_budget(tree.height, elements.len() as u64))?;
        trace!(added = elements.len(), count = tree.count, "appending");
        let Some(root) = tree.root else {
            let entries = self.pack(SmallVec::new(), Node::Leaf(elements), 0)?;
            return self.raise(entries, 0);
        };
        let entries = self.append_right(root, tree.height, elements)?;
        return self.raise(entries, tree.height);
    }

    pub fn insert_last(&mut self, tree: &Tree<T::Key>, element: T) -> Result<Tree<T::Key>> {
        return self.push_back(tree, vec![element]);
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find the leaf holding zero-based `offset`, returning the leaf and the
    /// offset within it.
    fn descend(&self, tree: &Tree<T::Key>, mut offset: u64) -> Result<(Handle, u64)> {
        let Some(mut handle) = tree.root else {
            return Err(Error::OutOfRange {
                rank: offset + 1,
                len: 0,
            });
        };
        for height in (1..=tree.height).rev() {
            let children = self.read_children(handle, height)?;
            let Some((index, before)) = locate(&children, offset) else {
                return Err(Error::malformed(handle, "entries count fewer elements than recorded"));
            };
            offset -= before;
            handle = children[index].handle;
        }
        return Ok((handle, offset));
    }

    /// The element at 1-based rank `n`.
    pub fn find_nth(&self, tree: &Tree<T::Key>, n: u64) -> Result<T> {
        self.check_rank(tree, n)?;
        let (handle, offset) = self.descend(tree, n - 1)?;
        let elements = self.read_leaf(handle)?;
        return elements
            .into_iter()
            .nth(offset as usize)
            .ok_or_else(|| Error::malformed(handle, "leaf shorter than its recorded count"));
    }

    /// Count the elements whose key is `less` than `key`.
    ///
    /// Assumes the tree is in sequence with respect to `less`; it descends on
    /// child first-key summaries and reads one node per level.
    pub fn find_ord<F>(&self, tree: &Tree<T::Key>, key: &T::Key, less: F) -> Result<u64>
    where
        F: Fn(&T::Key, &T::Key) -> bool,
    {
        let Some(mut handle) = tree.root else {
            return Ok(0);
        };
        let mut before = 0u64;
        for height in (1..=tree.height).rev() {
            let children = self.read_children(handle, height)?;
            let index = children.partition_point(|child| less(&child.first, key));
            if index == 0 {
                return Ok(before);
            }
            before += children[..index - 1].iter().map(|child| child.count).sum::<u64>();
            handle = children[index - 1].handle;
        }
        let elements = self.read_leaf(handle)?;
        let within = elements.partition_point(|element| less(&element.key(), key));
        return Ok(before + within as u64);
    }

    /// Replace the element at rank `n`.
    ///
    /// Only the leaf is rewritten unless the first key of some node changes,
    /// in which case the ancestors recording that key are rewritten too.
    pub fn set_nth(&mut self, tree: &Tree<T::Key>, n: u64, value: T) -> Result<Tree<T::Key>> {
        self.check_rank(tree, n)?;
        let Some(mut handle) = tree.root else {
            return Err(Error::OutOfRange { rank: n, len: 0 });
        };
        let mut offset = n - 1;
        let mut path: SmallVec<[(Handle, Vec<Child<T::Key>>, usize); 8]> = SmallVec::new();
        for height in (1..=tree.height).rev() {
            let children = self.read_children(handle, height)?;
            let Some((index, before)) = locate(&children, offset) else {
                return Err(Error::malformed(handle, "entries count fewer elements than recorded"));
            };
            offset -= before;
            let next = children[index].handle;
            path.push((handle, children, index));
            handle = next;
        }

        let mut elements = self.read_leaf(handle)?;
        let Some(slot) = elements.get_mut(offset as usize) else {
            return Err(Error::malformed(handle, "leaf shorter than its recorded count"));
        };
        let key = value.key();
        let mut changed = offset == 0 && slot.key() != key;
        *slot = value;
        self.store.write(handle, Node::Leaf(elements))?;

        while changed {
            let Some((parent, mut children, index)) = path.pop() else {
                break;
            };
            children[index].first = key.clone();
            self.store.write(parent, Node::Internal(children))?;
            changed = index == 0;
        }

        let mut result = tree.clone();
        if changed {
            result.first = Some(key);
        }
        return Ok(result);
    }

    fn collect(&self, handle: Handle, height: u32, out: &mut Vec<T>) -> Result<()> {
        match self.read_at(handle, height)? {
            Node::Leaf(elements) => out.extend(elements),
            Node::Internal(children) => {
                for child in children {
                    self.collect(child.handle, height - 1, out)?;
                }
            }
        }
        return Ok(());
    }

    /// Every element in rank order.
    pub fn to_vec(&self, tree: &Tree<T::Key>) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(tree.count as usize);
        if let Some(root) = tree.root {
            self.collect(root, tree.height, &mut out)?;
        }
        return Ok(out);
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Check every structural invariant, reporting what is wrong.
    ///
    /// Reads every reachable node and writes nothing. Store failures other
    /// than missing or malformed nodes are returned as errors.
    pub fn verify(&self, tree: &Tree<T::Key>) -> Result<Vec<Inconsistency>> {
        let mut walk = Walk {
            seen: FxHashSet::default(),
            found: Vec::new(),
            previous: None,
            rank: 0,
        };
        let actual = match tree.root {
            Some(root) => self.check(root, tree.height, None, &mut walk)?,
            None => Some((0, None)),
        };
        if let Some((count, first)) = actual {
            if count != tree.count {
                walk.found.push(Inconsistency::RootMismatch {
                    recorded: tree.count,
                    actual: count,
                });
            }
            if first != tree.first {
                walk.found.push(Inconsistency::RootSummaryMismatch);
            }
        }
        return Ok(walk.found);
    }

    fn check(
        &self,
        handle: Handle,
        height: u32,
        parent: Option<Handle>,
        walk: &mut Walk<T::Key>,
    ) -> Result<Option<(u64, Option<T::Key>)>> {
        if !walk.seen.insert(handle) {
            walk.found.push(Inconsistency::Shared { handle });
            return Ok(None);
        }
        let node = match self.store.read(handle) {
            Ok(node) => node,
            Err(Error::NotFound(_)) => {
                walk.found.push(Inconsistency::Missing { parent, handle });
                return Ok(None);
            }
            Err(Error::MalformedNode { reason, .. }) => {
                walk.found.push(Inconsistency::Malformed { handle, reason });
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if node.is_leaf() != (height == 0) {
            walk.found.push(Inconsistency::HeightMismatch { handle, expected: height });
            return Ok(None);
        }
        if node.is_empty() {
            walk.found.push(Inconsistency::EmptyNode { handle });
        }

        match node {
            Node::Leaf(elements) => {
                let first = elements.first().map(Element::key);
                for element in &elements {
                    walk.rank += 1;
                    let key = element.key();
                    if let Some(previous) = &walk.previous {
                        if previous.partial_cmp(&key) != Some(Ordering::Less) {
                            walk.found.push(Inconsistency::OutOfOrder { rank: walk.rank });
                        }
                    }
                    walk.previous = Some(key);
                }
                return Ok(Some((elements.len() as u64, first)));
            }
            Node::Internal(children) => {
                let mut total = 0u64;
                let mut first = None;
                for (i, child) in children.iter().enumerate() {
                    let Some((count, child_first)) =
                        self.check(child.handle, height - 1, Some(handle), walk)?
                    else {
                        continue;
                    };
                    if count != child.count {
                        walk.found.push(Inconsistency::CountMismatch {
                            parent: handle,
                            child: child.handle,
                            recorded: child.count,
                            actual: count,
                        });
                    }
                    if child_first.as_ref() != Some(&child.first) {
                        walk.found.push(Inconsistency::SummaryMismatch {
                            parent: handle,
                            child: child.handle,
                        });
                    }
                    if i == 0 {
                        first = child_first;
                    }
                    total += count;
                }
                return Ok(Some((total, first)));
            }
        }
    }
}

struct Walk<K> {
    seen: FxHashSet<Handle>,
    found: Vec<Inconsistency>,
    previous: Option<K>,
    rank: u64,
}

/// A broken invariant found by [`BigList::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inconsistency {
    /// A parent entry records the wrong element count for its child.
    CountMismatch {
        parent: Handle,
        child: Handle,
        recorded: u64,
        actual: u64,
    },
    /// A parent entry records the wrong first key for its child.
    SummaryMismatch { parent: Handle, child: Handle },
    /// The tree handle records the wrong element count.
    RootMismatch { recorded: u64, actual: u64 },
    /// The tree handle records the wrong first key.
    RootSummaryMismatch,
    /// A referenced node does not exist.
    Missing {
        parent: Option<Handle>,
        handle: Handle,
    },
    /// A node could not be decoded.
    Malformed { handle: Handle, reason: String },
    /// A leaf above the bottom level, or an internal node at it.
    HeightMismatch { handle: Handle, expected: u32 },
    /// A node with no slots.
    EmptyNode { handle: Handle },
    /// A node referenced more than once.
    Shared { handle: Handle },
    /// The element at `rank` does not sort after its predecessor.
    OutOfOrder { rank: u64 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::CountMismatch {
                parent,
                child,
                recorded,
                actual,
            } => write!(f, "node {parent} records {recorded} elements under {child}, found {actual}"),
            Inconsistency::SummaryMismatch { parent, child } => {
                write!(f, "node {parent} records a stale first key for {child}")
            }
            Inconsistency::RootMismatch { recorded, actual } => {
                write!(f, "tree records {recorded} elements, found {actual}")
            }
            Inconsistency::RootSummaryMismatch => write!(f, "tree records a stale first key"),
            Inconsistency::Missing {
                parent: Some(parent),
                handle,
            } => write!(f, "node {parent} references missing node {handle}"),
            Inconsistency::Missing { parent: None, handle } => {
                write!(f, "root node {handle} is missing")
            }
            Inconsistency::Malformed { handle, reason } => write!(f, "node {handle} is malformed: {reason}"),
            Inconsistency::HeightMismatch { handle, expected } => {
                write!(f, "node {handle} has the wrong kind for height {expected}")
            }
            Inconsistency::EmptyNode { handle } => write!(f, "node {handle} is empty"),
            Inconsistency::Shared { handle } => write!(f, "node {handle} is referenced more than once"),
            Inconsistency::OutOfOrder { rank } => write!(f, "element {rank} is out of order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    type TestList = BigList<u64, MemStore<Node<u64>>>;

    fn small() -> TestList {
        let config = TreeConfig::new().with_leaf_size(4).with_node_size(4);
        return BigList::new(MemStore::new(), config);
    }

    fn build(list: &mut TestList, n: u64) -> Tree<u64> {
        let tree = list.empty();
        return list.push_back(&tree, (1..=n).collect()).unwrap();
    }

    #[test]
    fn bulk_append_is_balanced() {
        let mut list = small();
        let tree = build(&mut list, 100);
        assert_eq!(tree.len(), 100);
        assert!(tree.height >= 3);
        assert_eq!(list.verify(&tree).unwrap(), vec![]);
        assert_eq!(list.to_vec(&tree).unwrap(), (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn single_appends_stay_consistent() {
        let mut list = small();
        let mut tree = list.empty();
        for i in 1..=50 {
            tree = list.insert_last(&tree, i).unwrap();
        }
        assert_eq!(list.verify(&tree).unwrap(), vec![]);
        assert_eq!(list.find_nth(&tree, 37).unwrap(), 37);
    }

    #[test]
    fn find_nth_rejects_out_of_range() {
        let mut list = small();
        let tree = build(&mut list, 10);
        assert!(matches!(list.find_nth(&tree, 0), Err(Error::OutOfRange { rank: 0, len: 10 })));
        assert!(matches!(list.find_nth(&tree, 11), Err(Error::OutOfRange { rank: 11, len: 10 })));
        assert!(matches!(
            list.find_nth(&list.empty(), 1),
            Err(Error::OutOfRange { rank: 1, len: 0 })
        ));
    }

    #[test]
    fn empty_range_touches_nothing() {
        let mut list = small();
        let tree = build(&mut list, 20);
        let before = list.store().stats();
        let (remaining, detached) = list.extract_range(&tree, 5, 4).unwrap();
        assert_eq!(list.store().stats().since(&before).mutations(), 0);
        assert_eq!(remaining, tree);
        assert!(detached.is_empty());
    }

    #[test]
    fn extract_and_restore() {
        let mut list = small();
        let tree = build(&mut list, 60);
        let (remaining, detached) = list.extract_range(&tree, 13, 41).unwrap();
        assert_eq!(remaining.len(), 31);
        assert_eq!(detached.len(), 29);
        assert_eq!(list.verify(&remaining).unwrap(), vec![]);
        assert_eq!(list.verify(&detached).unwrap(), vec![]);
        assert_eq!(list.to_vec(&detached).unwrap(), (13..=41).collect::<Vec<_>>());

        let restored = list.insert_after(&remaining, detached, 12).unwrap();
        assert_eq!(list.verify(&restored).unwrap(), vec![]);
        assert_eq!(list.to_vec(&restored).unwrap(), (1..=60).collect::<Vec<_>>());
    }

    #[test]
    fn extract_everything() {
        let mut list = small();
        let tree = build(&mut list, 17);
        let (remaining, detached) = list.extract_range(&tree, 1, 17).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(detached.len(), 17);
        assert!(matches!(
            list.extract_range(&tree, 0, 3),
            Err(Error::OutOfRange { rank: 0, .. })
        ));
    }

    #[test]
    fn joins_trees_of_different_heights() {
        let mut list = small();
        let tall = build(&mut list, 80);
        let short = list.push_back(&Tree::empty(), vec![100, 101]).unwrap();
        let joined = list.join(tall, short).unwrap();
        assert_eq!(joined.len(), 82);
        assert_eq!(list.verify(&joined).unwrap(), vec![]);

        let front = list.push_back(&Tree::empty(), vec![0]).unwrap();
        let joined = list.join(front, joined).unwrap();
        assert_eq!(list.find_nth(&joined, 1).unwrap(), 0);
        assert_eq!(list.find_nth(&joined, 83).unwrap(), 101);
        assert_eq!(list.verify(&joined).unwrap(), vec![]);
    }

    #[test]
    fn set_nth_refreshes_first_keys() {
        let mut list = small();
        let tree = build(&mut list, 40);
        let tree = list.set_nth(&tree, 1, 0).unwrap();
        assert_eq!(tree.first, Some(0));
        assert_eq!(list.verify(&tree).unwrap(), vec![]);

        let before = list.store().stats();
        let tree = list.set_nth(&tree, 6, 6).unwrap();
        assert_eq!(list.store().stats().since(&before).writes, 1);
        assert_eq!(list.find_nth(&tree, 6).unwrap(), 6);
    }

    #[test]
    fn find_ord_counts_smaller_keys() {
        let mut list = small();
        let tree = list.push_back(&Tree::empty(), (0..50).map(|i| i * 2).collect()).unwrap();
        let less = |a: &u64, b: &u64| a < b;
        assert_eq!(list.find_ord(&tree, &0, less).unwrap(), 0);
        assert_eq!(list.find_ord(&tree, &7, less).unwrap(), 4);
        assert_eq!(list.find_ord(&tree, &8, less).unwrap(), 4);
        assert_eq!(list.find_ord(&tree, &1000, less).unwrap(), 50);
    }

    #[test]
    fn quota_failure_leaves_tree_untouched() {
        let mut list = small();
        let tree = build(&mut list, 30);
        let live = list.store().len();
        list.store_mut().set_quota(Some(live));
        assert!(matches!(
            list.extract_range(&tree, 3, 9),
            Err(Error::ResourceExhausted { .. })
        ));
        assert_eq!(list.store().len(), live);
        assert_eq!(list.to_vec(&tree).unwrap(), (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn verify_reports_corrupted_counts() {
        let mut list = small();
        let tree = build(&mut list, 30);
        let root = tree.root.unwrap();
        let Node::Internal(mut children) = list.store().read(root).unwrap() else {
            panic!("expected internal root");
        };
        children[0].count += 1;
        list.store_mut().write(root, Node::Internal(children)).unwrap();

        let found = list.verify(&tree).unwrap();
        assert!(found.iter().any(|i| matches!(i, Inconsistency::CountMismatch { .. })));
    }

    #[test]
    fn verify_reports_out_of_order_keys() {
        let mut list = small();
        let tree = list.push_back(&Tree::empty(), vec![1, 2, 2, 3]).unwrap();
        assert_eq!(list.verify(&tree).unwrap(), vec![Inconsistency::OutOfOrder { rank: 3 }]);
    }
}

// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Persisted node shapes and the tree handle that points at them.
//!
//! A node is either a leaf holding elements or an internal node holding
//! child entries. Each child entry caches the child's element count and the
//! key of its first element, so ranks and ordered lookups resolve without
//! reading the child.

use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;

use crate::handle::Handle;

/// An element stored in a node list.
pub trait Element: Clone + Debug {
    /// The ordering key summarised in parent entries.
    type Key: Clone + Debug + PartialEq + PartialOrd;

    fn key(&self) -> Self::Key;
}

impl Element for u64 {
    type Key = u64;

    fn key(&self) -> u64 {
        return *self;
    }
}

/// An internal node's reference to one child subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child<K> {
    pub handle: Handle,
    /// Elements in the child's subtree.
    pub count: u64,
    /// Key of the first element in the child's subtree.
    pub first: K,
}

/// A persisted tree node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, T::Key: Serialize",
    deserialize = "T: Deserialize<'de>, T::Key: Deserialize<'de>"
))]
pub enum Node<T: Element> {
    Leaf(Vec<T>),
    Internal(Vec<Child<T::Key>>),
}

impl<T: Element> Node<T> {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        return matches!(self, Node::Leaf(_));
    }

    /// Number of slots used: elements for a leaf, children for an internal node.
    #[inline]
    pub fn width(&self) -> usize {
        match self {
            Node::Leaf(elements) => return elements.len(),
            Node::Internal(children) => return children.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.width() == 0;
    }

    /// Elements in this node's subtree, according to its own entries.
    pub fn count(&self) -> u64 {
        match self {
            Node::Leaf(elements) => return elements.len() as u64,
            Node::Internal(children) => return children.iter().map(|child| child.count).sum(),
        }
    }

    /// Key of the first element under this node.
    pub fn first_key(&self) -> Option<T::Key> {
        match self {
            Node::Leaf(elements) => return elements.first().map(Element::key),
            Node::Internal(children) => return children.first().map(|child| child.first.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Leaf(_) => return "leaf",
            Node::Internal(_) => return "internal node",
        }
    }

    /// Split off the slots from `at` onward into a node of the same kind.
    pub fn split_off(&mut self, at: usize) -> Node<T> {
        match self {
            Node::Leaf(elements) => return Node::Leaf(elements.split_off(at)),
            Node::Internal(children) => return Node::Internal(children.split_off(at)),
        }
    }

    /// Move every slot of `other` onto the end of `self`.
    ///
    /// Returns `false`, leaving `self` untouched, when the kinds differ.
    pub fn append(&mut self, other: Node<T>) -> bool {
        match (self, other) {
            (Node::Leaf(elements), Node::Leaf(more)) => {
                elements.extend(more);
                return true;
            }
            (Node::Internal(children), Node::Internal(more)) => {
                children.extend(more);
                return true;
            }
            _ => return false,
        }
    }
}

/// Find the child holding the element at zero-based `offset`.
/// Returns (child_index, elements_before_child).
#[inline]
pub(crate) fn locate<K>(children: &[Child<K>], offset: u64) -> Option<(usize, u64)> {
    let mut before = 0u64;
    for (i, child) in children.iter().enumerate() {
        let next = before + child.count;
        if next > offset {
            return Some((i, before));
        }
        before = next;
    }
    return None;
}

/// A tree handle: the root of a tree (or detached subtree) plus its cached
/// summary. An empty tree owns no nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree<K> {
    pub root: Option<Handle>,
    pub count: u64,
    pub first: Option<K>,
    /// Distance from the root to the leaves; a lone leaf has height 0.
    pub height: u32,
}

impl<K> Default for Tree<K> {
    fn default() -> Self {
        return Tree::empty();
    }
}

impl<K> Tree<K> {
    pub const fn empty() -> Tree<K> {
        return Tree {
            root: None,
            count: 0,
            first: None,
            height: 0,
        };
    }

    #[inline]
    pub fn len(&self) -> u64 {
        return self.count;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.root.is_none();
    }
}

impl<K: Clone> Tree<K> {
    /// The tree rooted at the child an entry points to.
    pub fn from_child(child: Child<K>, height: u32) -> Tree<K> {
        return Tree {
            root: Some(child.handle),
            count: child.count,
            first: Some(child.first),
            height,
        };
    }

    /// The entry a parent would hold for this tree.
    pub fn as_child(&self) -> Option<Child<K>> {
        let handle = self.root?;
        let first = self.first.clone()?;
        return Some(Child {
            handle,
            count: self.count,
            first,
        });
    }
}

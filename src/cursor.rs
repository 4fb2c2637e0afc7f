// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Forward cursor over a rank range, one leaf at a time.
//!
//! A cursor holds only handles and offsets, never elements, so a long scan
//! can stop between leaves and give control back to a scheduler. It reads
//! nodes lazily through the owning [`BigList`]. A cursor is finite and
//! cannot be rewound; start a new one to scan again.

use smallvec::SmallVec;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::node::Element;
use crate::node::Node;
use crate::node::Tree;
use crate::node::locate;
use crate::store::NodeStore;
use crate::tree::BigList;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Frame {
    handle: Handle,
    height: u32,
    /// Elements of this subtree to skip before the range starts.
    skip: u64,
}

/// Position of a scan in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    stack: SmallVec<[Frame; 16]>,
    remaining: u64,
}

impl Cursor {
    fn finished() -> Cursor {
        return Cursor {
            stack: SmallVec::new(),
            remaining: 0,
        };
    }

    /// Elements the cursor has yet to produce.
    pub fn remaining(&self) -> u64 {
        return self.remaining;
    }

    pub fn is_done(&self) -> bool {
        return self.remaining == 0;
    }
}

impl<T: Element, S: NodeStore<Node<T>>> BigList<T, S> {
    /// Begin a scan over ranks `lo..=hi`. An empty range (`lo > hi`) gives a
    /// cursor that is already done.
    pub fn start(&self, tree: &Tree<T::Key>, lo: u64, hi: u64) -> Result<Cursor> {
        if lo > hi {
            return Ok(Cursor::finished());
        }
        for rank in [lo, hi] {
            if rank == 0 || rank > tree.count {
                return Err(Error::OutOfRange {
                    rank,
                    len: tree.count,
                });
            }
        }
        let Some(root) = tree.root else {
            return Ok(Cursor::finished());
        };
        let mut stack = SmallVec::new();
        stack.push(Frame {
            handle: root,
            height: tree.height,
            skip: lo - 1,
        });
        return Ok(Cursor {
            stack,
            remaining: hi - lo + 1,
        });
    }

    /// The next leaf's worth of elements, or `None` once the range is done.
    pub fn next(&self, cursor: &mut Cursor) -> Result<Option<Vec<T>>> {
        while cursor.remaining > 0 {
            let Some(frame) = cursor.stack.pop() else {
                return Ok(None);
            };
            match self.read_at(frame.handle, frame.height)? {
                Node::Leaf(mut elements) => {
                    let skip = frame.skip as usize;
                    if skip >= elements.len() {
                        return Err(Error::malformed(frame.handle, "leaf shorter than its recorded count"));
                    }
                    let end = elements.len().min(skip + cursor.remaining as usize);
                    elements.truncate(end);
                    let batch = elements.split_off(skip);
                    cursor.remaining -= batch.len() as u64;
                    return Ok(Some(batch));
                }
                Node::Internal(children) => {
                    let Some((index, before)) = locate(&children, frame.skip) else {
                        return Err(Error::malformed(frame.handle, "entries count fewer elements than recorded"));
                    };
                    for child in children[index + 1..].iter().rev() {
                        cursor.stack.push(Frame {
                            handle: child.handle,
                            height: frame.height - 1,
                            skip: 0,
                        });
                    }
                    cursor.stack.push(Frame {
                        handle: children[index].handle,
                        height: frame.height - 1,
                        skip: frame.skip - before,
                    });
                }
            }
        }
        return Ok(None);
    }

    /// Collect ranks `lo..=hi` by draining a cursor.
    pub fn slice(&self, tree: &Tree<T::Key>, lo: u64, hi: u64) -> Result<Vec<T>> {
        let mut cursor = self.start(tree, lo, hi)?;
        let mut out = Vec::with_capacity(cursor.remaining() as usize);
        while let Some(batch) = self.next(&mut cursor)? {
            out.extend(batch);
        }
        return Ok(out);
    }
}

use datafile::RecordPos;
use parking_lot::RwLock;

use crate::{IndexIterator, Indexer, SnapshotIter};

/// Children per node before a sparse node promotes to a dense one.
const SPARSE_MAX: usize = 16;

/// Adaptive radix-tree key directory.
///
/// Keys descend the tree one byte per level. Interior nodes adapt their
/// child representation to their fan-out: a sorted sparse vector while
/// small, a dense 256-slot array once it grows past [`SPARSE_MAX`]. A node
/// carries a value when some key ends at it, so a key that is a strict
/// prefix of another coexists with it.
///
/// The tree itself is not thread-safe; [`RadixIndex`] wraps it in a
/// reader/writer lock, matching the ordered-tree variant.
pub struct RadixIndex {
    tree: RwLock<RadixTree>,
}

impl RadixIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(RadixTree::new()),
        }
    }
}

impl Default for RadixIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for RadixIndex {
    fn put(&self, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.read().get(key)
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.write().remove(key)
    }

    fn len(&self) -> usize {
        self.tree.read().len
    }

    fn iter(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let guard = self.tree.read();
        let mut items = Vec::with_capacity(guard.len);
        let mut prefix = Vec::new();
        collect(&guard.root, &mut prefix, &mut items);
        if reverse {
            items.reverse();
        }
        Box::new(SnapshotIter::new(items, reverse))
    }

    fn close(&self) -> datafile::Result<()> {
        Ok(())
    }
}

struct RadixTree {
    root: Node,
    len: usize,
}

impl RadixTree {
    fn new() -> Self {
        Self {
            root: Node::new(),
            len: 0,
        }
    }

    fn insert(&mut self, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
        let mut node = &mut self.root;
        for &byte in key {
            node = node.children.child_or_insert(byte);
        }
        let old = node.value.replace(pos);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        let mut node = &self.root;
        for &byte in key {
            node = node.children.child(byte)?;
        }
        node.value
    }

    fn remove(&mut self, key: &[u8]) -> Option<RecordPos> {
        let (old, _) = remove_rec(&mut self.root, key);
        if old.is_some() {
            self.len -= 1;
        }
        old
    }
}

/// Removes `key` below `node`, pruning now-empty subtrees on the way back
/// up. Returns the removed value and whether `node` itself became prunable.
fn remove_rec(node: &mut Node, key: &[u8]) -> (Option<RecordPos>, bool) {
    match key.split_first() {
        None => {
            let old = node.value.take();
            (old, node.value.is_none() && node.children.is_leaf())
        }
        Some((&byte, rest)) => {
            let Some(child) = node.children.child_mut(byte) else {
                return (None, false);
            };
            let (old, prune_child) = remove_rec(child, rest);
            if prune_child {
                node.children.remove(byte);
            }
            (old, node.value.is_none() && node.children.is_leaf())
        }
    }
}

/// Depth-first, children in byte order; a node's own value precedes its
/// subtree, which is exactly byte-wise lexicographic key order.
fn collect(node: &Node, prefix: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, RecordPos)>) {
    if let Some(pos) = node.value {
        out.push((prefix.clone(), pos));
    }
    node.children.for_each_ordered(|byte, child| {
        prefix.push(byte);
        collect(child, prefix, out);
        prefix.pop();
    });
}

struct Node {
    value: Option<RecordPos>,
    children: Children,
}

impl Node {
    fn new() -> Self {
        Self {
            value: None,
            children: Children::Sparse(Vec::new()),
        }
    }
}

enum Children {
    /// Sorted by byte; at most [`SPARSE_MAX`] entries.
    Sparse(Vec<(u8, Box<Node>)>),
    /// One slot per possible byte.
    Dense(Box<[Option<Box<Node>>; 256]>),
}

impl Children {
    fn child(&self, byte: u8) -> Option<&Node> {
        match self {
            Children::Sparse(slots) => slots
                .binary_search_by_key(&byte, |(b, _)| *b)
                .ok()
                .map(|i| slots[i].1.as_ref()),
            Children::Dense(slots) => slots[byte as usize].as_deref(),
        }
    }

    fn child_mut(&mut self, byte: u8) -> Option<&mut Node> {
        match self {
            Children::Sparse(slots) => match slots.binary_search_by_key(&byte, |(b, _)| *b) {
                Ok(i) => Some(slots[i].1.as_mut()),
                Err(_) => None,
            },
            Children::Dense(slots) => slots[byte as usize].as_deref_mut(),
        }
    }

    fn child_or_insert(&mut self, byte: u8) -> &mut Node {
        // A full sparse node about to take a new byte promotes first.
        let promote = matches!(
            self,
            Children::Sparse(slots) if slots.len() >= SPARSE_MAX
                && slots.binary_search_by_key(&byte, |(b, _)| *b).is_err()
        );
        if promote {
            self.promote();
        }
        match self {
            Children::Sparse(slots) => {
                let i = match slots.binary_search_by_key(&byte, |(b, _)| *b) {
                    Ok(i) => i,
                    Err(i) => {
                        slots.insert(i, (byte, Box::new(Node::new())));
                        i
                    }
                };
                slots[i].1.as_mut()
            }
            Children::Dense(slots) => slots[byte as usize]
                .get_or_insert_with(|| Box::new(Node::new()))
                .as_mut(),
        }
    }

    /// Rebuilds a full sparse node as a dense one.
    fn promote(&mut self) {
        let Children::Sparse(slots) = self else {
            return;
        };
        let mut dense: Box<[Option<Box<Node>>; 256]> =
            Box::new(std::array::from_fn(|_| None));
        for (b, node) in slots.drain(..) {
            dense[b as usize] = Some(node);
        }
        *self = Children::Dense(dense);
    }

    fn remove(&mut self, byte: u8) {
        match self {
            Children::Sparse(slots) => {
                if let Ok(i) = slots.binary_search_by_key(&byte, |(b, _)| *b) {
                    slots.remove(i);
                }
            }
            Children::Dense(slots) => slots[byte as usize] = None,
        }
    }

    fn is_leaf(&self) -> bool {
        match self {
            Children::Sparse(slots) => slots.is_empty(),
            Children::Dense(slots) => slots.iter().all(|s| s.is_none()),
        }
    }

    fn for_each_ordered(&self, mut f: impl FnMut(u8, &Node)) {
        match self {
            Children::Sparse(slots) => {
                for (b, node) in slots {
                    f(*b, node);
                }
            }
            Children::Dense(slots) => {
                for (b, slot) in slots.iter().enumerate() {
                    if let Some(node) = slot {
                        f(b as u8, node);
                    }
                }
            }
        }
    }
}

use std::collections::BTreeMap;

use datafile::RecordPos;
use parking_lot::RwLock;

use crate::{IndexIterator, Indexer, SnapshotIter};

/// Ordered in-memory key directory — the default.
///
/// A plain ordered map under a reader/writer lock. Lookups take the read
/// side; mutation takes the write side. Iterators copy the map into a
/// sorted array while holding the read lock, then release it.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
        self.tree.write().insert(key.to_vec(), pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.write().remove(key)
    }

    fn len(&self) -> usize {
        self.tree.read().len()
    }

    fn iter(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let guard = self.tree.read();
        let mut items: Vec<(Vec<u8>, RecordPos)> =
            guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
        if reverse {
            items.reverse();
        }
        Box::new(SnapshotIter::new(items, reverse))
    }

    fn close(&self) -> datafile::Result<()> {
        Ok(())
    }
}

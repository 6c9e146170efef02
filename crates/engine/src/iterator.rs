//! Engine-level iterator: a key-directory cursor plus on-disk value
//! resolution, filtered by an optional key prefix.

use crate::{Engine, IteratorOptions, Result};
use keydir::IndexIterator;

/// Cursor over the live keys of an engine.
///
/// Wraps a direction-aware key-directory iterator; `key()` always returns
/// the user key (sequence prefixes never surface), and `value()` resolves
/// the record through the engine's read-locked path at call time.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    index_iter: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl Engine {
    /// Creates an iterator; position it with `rewind` or `seek` first.
    pub fn iterator(&self, options: IteratorOptions) -> EngineIterator<'_> {
        EngineIterator {
            index_iter: self.index.iter(options.reverse),
            engine: self,
            options,
        }
    }
}

impl EngineIterator<'_> {
    /// Moves to the first entry (last, when reversed).
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_prefix();
    }

    /// Moves to the first key `>=` the target (`<=` when reversed).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_prefix();
    }

    /// Advances one entry.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_prefix();
    }

    /// False once iteration is exhausted.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// User key at the cursor.
    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Resolves the value at the cursor from disk.
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.index_iter.value();
        let files = self.engine.files.read();
        self.engine.value_at(&files, pos)
    }

    /// Advances past keys that do not start with the configured prefix.
    fn skip_to_prefix(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }

        while self.index_iter.valid() {
            let key = self.index_iter.key();
            if key.len() >= prefix.len() && &key[..prefix.len()] == prefix.as_slice() {
                break;
            }
            self.index_iter.next();
        }
    }
}

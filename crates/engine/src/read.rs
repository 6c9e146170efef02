//! Read path: `get()`, `list_keys()`, `fold()` and positional value
//! resolution shared with the engine iterator.

use datafile::{RecordKind, RecordPos};
use keydir::IndexIterator;

use crate::{Engine, Error, FileSet, Result};

impl Engine {
    /// Looks up `key` and returns its current value.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;

        let files = self.files.read();
        self.value_at(&files, pos)
    }

    /// Returns every live user key, in ascending order. The iterator
    /// snapshot makes this consistent without holding the engine lock.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iter(false);
        let mut keys = Vec::with_capacity(self.index.len());

        iter.rewind();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        keys
    }

    /// Applies `f` to every live `(key, value)` pair in ascending key order,
    /// stopping early when it returns `false`. The read lock is held for the
    /// whole traversal.
    pub fn fold(&self, mut f: impl FnMut(&[u8], Vec<u8>) -> bool) -> Result<()> {
        let files = self.files.read();
        let mut iter = self.index.iter(false);

        iter.rewind();
        while iter.valid() {
            let value = self.value_at(&files, iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    /// Resolves a positional entry to its record's value. The caller holds
    /// (at least) the read lock, which pins the file table.
    pub(crate) fn value_at(&self, files: &FileSet, pos: RecordPos) -> Result<Vec<u8>> {
        let data_file = match files.active.as_ref() {
            Some(active) if active.file_id == pos.file_id => active,
            _ => files
                .older
                .get(&pos.file_id)
                .ok_or(Error::DataFileNotFound)?,
        };

        // A position the directory vouches for must hold a record; running
        // into the EOF sentinel there means the file was truncated.
        let (record, _) = data_file
            .read_record(pos.offset)?
            .ok_or(Error::CorruptRecord)?;

        if record.kind == RecordKind::Tombstone {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }
}

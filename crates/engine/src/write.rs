//! Write path: `put()`, `delete()` and the locked append machinery they
//! share with batches and merge.
//!
//! Every mutation becomes one record appended to the active file. The write
//! lock is held for the entire append — rotation and sync included — so
//! records land in a total order and the key directory reflects it.

use std::sync::atomic::Ordering;

use datafile::codec::encode_record;
use datafile::{Record, RecordKind, RecordPos};

use crate::batch::{key_with_seq, NON_TXN_SEQ};
use crate::{Engine, Error, FileSet, Result};

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// The stored record's key carries the non-batch sequence prefix (0).
    /// If a prior entry existed, its size accrues to the reclaimable
    /// counter.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let record = Record {
            key: key_with_seq(key, NON_TXN_SEQ),
            value: value.to_vec(),
            kind: RecordKind::Normal,
        };
        let pos = self.append_record(&record)?;

        if let Some(old) = self.index.put(key, pos) {
            self.reclaim_size
                .fetch_add(i64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Deletes `key` by appending a tombstone. Deleting an absent key is a
    /// no-op. Both the tombstone itself and the record it shadows count as
    /// reclaimable — the tombstone is eventual garbage too.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = Record {
            key: key_with_seq(key, NON_TXN_SEQ),
            value: Vec::new(),
            kind: RecordKind::Tombstone,
        };
        let pos = self.append_record(&record)?;
        self.reclaim_size
            .fetch_add(i64::from(pos.size), Ordering::SeqCst);

        match self.index.delete(key) {
            Some(old) => {
                self.reclaim_size
                    .fetch_add(i64::from(old.size), Ordering::SeqCst);
                Ok(())
            }
            // The lookup above saw the key; a vanished entry means the
            // directory update went wrong, not that the key was absent.
            None => Err(Error::IndexUpdateFailed),
        }
    }

    /// Appends one record under the engine write lock.
    pub(crate) fn append_record(&self, record: &Record) -> Result<RecordPos> {
        let mut files = self.files.write();
        self.append_record_locked(&mut files, record)
    }

    /// The append path proper; the caller already holds the write lock.
    ///
    /// 1. Lazily open the active file.
    /// 2. Rotate when this record would push it past `data_file_size`
    ///    (sync the outgoing file first — its contents must be durable
    ///    before it becomes immutable).
    /// 3. Append, remember the start offset, accumulate `bytes_write`.
    /// 4. Sync per `sync_writes` / `bytes_per_sync`.
    pub(crate) fn append_record_locked(
        &self,
        files: &mut FileSet,
        record: &Record,
    ) -> Result<RecordPos> {
        if files.active.is_none() {
            self.set_active_file(files)?;
        }

        let (encoded, size) = encode_record(record);

        if files.active_mut().write_offset + size > self.options.data_file_size {
            files.active_mut().sync()?;
            self.set_active_file(files)?;
        }

        let active = files.active_mut();
        let offset = active.write_offset;
        let file_id = active.file_id;
        active.write(&encoded)?;
        files.bytes_write += size;

        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0
                && files.bytes_write >= self.options.bytes_per_sync);
        if need_sync {
            files.active_mut().sync()?;
            files.bytes_write = 0;
        }

        Ok(RecordPos {
            file_id,
            offset,
            size: size as u32,
        })
    }
}

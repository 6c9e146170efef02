//! Atomic write batches.
//!
//! A batch stages mutations in memory, deduplicated by user key. `commit`
//! allocates one sequence number for the whole batch, appends every staged
//! record with that sequence prefixed to its key, then appends a terminator
//! record. Recovery treats the terminator as the commit point (§ replay in
//! `recovery`): a crash anywhere before it leaves the batch invisible.
//!
//! This module also owns the sequence-prefix key codec shared by the whole
//! engine — every on-disk key is `uvarint(seq) ++ user_key`, with sequence
//! 0 marking non-batch records.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use datafile::codec::{put_uvarint, uvarint};
use datafile::{Record, RecordKind, RecordPos};

use crate::{Engine, Error, IndexType, Result, WriteBatchOptions};

/// Sequence number carried by plain (non-batch) records.
pub(crate) const NON_TXN_SEQ: u64 = 0;

/// Sentinel key of batch terminator records.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prefixes `key` with the varint-encoded sequence number, producing the
/// on-disk key.
pub(crate) fn key_with_seq(key: &[u8], seq: u64) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(key.len() + 10);
    put_uvarint(&mut encoded, seq);
    encoded.extend_from_slice(key);
    encoded
}

/// Splits an on-disk key into the user key and its sequence number.
pub(crate) fn split_seq(key: &[u8]) -> (Vec<u8>, u64) {
    match uvarint(key) {
        Some((seq, n)) => (key[n..].to_vec(), seq),
        None => (key.to_vec(), NON_TXN_SEQ),
    }
}

/// A staged set of writes that commits atomically.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    /// Staged records keyed by user key; a later stage of the same key
    /// supersedes the earlier one.
    pending: Mutex<HashMap<Vec<u8>, Record>>,
}

impl Engine {
    /// Creates an empty write batch.
    ///
    /// On a persistent-index engine whose `seq-no` checkpoint went missing
    /// (and whose directory is not fresh), batches are refused: the engine
    /// cannot know the next safe sequence number, and reusing one would let
    /// recovery stitch two different batches together.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if self.options.index_type == IndexType::Persistent
            && !self.seq_file_exists
            && !self.is_initial
        {
            return Err(Error::BatchUnavailable);
        }

        Ok(WriteBatch {
            engine: self,
            options,
            pending: Mutex::new(HashMap::new()),
        })
    }
}

impl WriteBatch<'_> {
    /// Stages a put. Nothing reaches disk until [`commit`](Self::commit).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        self.pending.lock().insert(
            key.to_vec(),
            Record {
                key: key.to_vec(),
                value: value.to_vec(),
                kind: RecordKind::Normal,
            },
        );
        Ok(())
    }

    /// Stages a delete. When the live directory has no entry for `key`, any
    /// staged write of it is simply dropped — there is nothing on disk the
    /// tombstone would shadow.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let mut pending = self.pending.lock();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }

        pending.insert(
            key.to_vec(),
            Record {
                key: key.to_vec(),
                value: Vec::new(),
                kind: RecordKind::Tombstone,
            },
        );
        Ok(())
    }

    /// Number of currently staged records.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Commits the staged records atomically.
    ///
    /// The engine write lock is held for the entire commit, so batch records
    /// are contiguous in the log up to interleaving with nothing at all.
    /// After the terminator lands (and the optional sync), the staged
    /// mutations are applied to the key directory and the stage is cleared.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::BatchTooLarge);
        }

        let engine = self.engine;
        let mut files = engine.files.write();

        let seq = engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions: HashMap<Vec<u8>, RecordPos> = HashMap::with_capacity(pending.len());
        for (user_key, record) in pending.iter() {
            let pos = engine.append_record_locked(
                &mut files,
                &Record {
                    key: key_with_seq(user_key, seq),
                    value: record.value.clone(),
                    kind: record.kind,
                },
            )?;
            positions.insert(user_key.clone(), pos);
        }

        // The terminator is what makes the batch real; recovery discards
        // every sequence that lacks one.
        engine.append_record_locked(
            &mut files,
            &Record {
                key: key_with_seq(TXN_FIN_KEY, seq),
                value: Vec::new(),
                kind: RecordKind::BatchFinished,
            },
        )?;

        if self.options.sync_on_commit {
            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
        }

        for (user_key, record) in pending.iter() {
            let Some(&pos) = positions.get(user_key) else {
                continue;
            };
            let old = match record.kind {
                RecordKind::Normal => engine.index.put(user_key, pos),
                RecordKind::Tombstone => engine.index.delete(user_key),
                RecordKind::BatchFinished => None,
            };
            if let Some(old) = old {
                engine
                    .reclaim_size
                    .fetch_add(i64::from(old.size), Ordering::SeqCst);
            }
        }

        pending.clear();
        Ok(())
    }
}

use std::path::Path;

use datafile::codec::{decode_pos, encode_pos};
use datafile::RecordPos;
use redb::{
    Database, Durability, ReadableTable, ReadableTableMetadata, TableDefinition,
};

use crate::{IndexIterator, Indexer, SnapshotIter};

/// File the backing store lives in, inside the data directory.
const INDEX_FILE_NAME: &str = "bptree-index";

/// The single table holding encoded positional entries keyed by user key.
const INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("cinderkv-index");

/// Key directory backed by an embedded single-file B+-tree store.
///
/// Unlike the in-memory variants this one survives restarts by itself, which
/// is why the engine skips data-file replay when it is selected. The store
/// does its own locking; operations run inside its transactions and need no
/// lock here. Backing-store failures abort the process — the directory
/// contract has no error channel on the data path, and a half-applied index
/// is worse than a crash.
pub struct PersistentIndex {
    db: Database,
    durability: Durability,
}

impl PersistentIndex {
    /// Opens (creating if needed) the store at `dir/bptree-index`. When
    /// `sync_writes` is off, commits use eventual durability — data reaches
    /// the file but fsync is left to the OS.
    pub fn open(dir: &Path, sync_writes: bool) -> Self {
        let db = Database::create(dir.join(INDEX_FILE_NAME))
            .expect("failed to open the persistent key directory");

        // Make sure the table exists so later read transactions can open it.
        let txn = db
            .begin_write()
            .expect("failed to begin a key directory transaction");
        txn.open_table(INDEX_TABLE)
            .expect("failed to create the key directory table");
        txn.commit()
            .expect("failed to commit the key directory table");

        let durability = if sync_writes {
            Durability::Immediate
        } else {
            Durability::Eventual
        };
        Self { db, durability }
    }

    fn write_txn(&self) -> redb::WriteTransaction {
        let mut txn = self
            .db
            .begin_write()
            .expect("failed to begin a key directory transaction");
        txn.set_durability(self.durability);
        txn
    }
}

impl Indexer for PersistentIndex {
    fn put(&self, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
        let txn = self.write_txn();
        let old = {
            let mut table = txn
                .open_table(INDEX_TABLE)
                .expect("failed to open the key directory table");
            let encoded = encode_pos(&pos);
            table
                .insert(key, encoded.as_slice())
                .expect("failed to write to the key directory")
                .map(|guard| guard.value().to_vec())
        };
        txn.commit().expect("failed to commit a key directory write");

        old.map(|bytes| decode_pos(&bytes).expect("stored positional entry is corrupt"))
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        let txn = self
            .db
            .begin_read()
            .expect("failed to begin a key directory read");
        let table = txn
            .open_table(INDEX_TABLE)
            .expect("failed to open the key directory table");
        table
            .get(key)
            .expect("failed to read from the key directory")
            .map(|guard| decode_pos(guard.value()).expect("stored positional entry is corrupt"))
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPos> {
        let txn = self.write_txn();
        let old = {
            let mut table = txn
                .open_table(INDEX_TABLE)
                .expect("failed to open the key directory table");
            table
                .remove(key)
                .expect("failed to delete from the key directory")
                .map(|guard| guard.value().to_vec())
        };
        txn.commit().expect("failed to commit a key directory delete");

        old.map(|bytes| decode_pos(&bytes).expect("stored positional entry is corrupt"))
    }

    fn len(&self) -> usize {
        let txn = self
            .db
            .begin_read()
            .expect("failed to begin a key directory read");
        let table = txn
            .open_table(INDEX_TABLE)
            .expect("failed to open the key directory table");
        table.len().expect("failed to count the key directory") as usize
    }

    fn iter(&self, reverse: bool) -> Box<dyn IndexIterator> {
        Box::new(PersistentIter::new(&self.db, reverse))
    }

    fn close(&self) -> datafile::Result<()> {
        // Dropping the Database flushes and releases the store; nothing to
        // do eagerly here.
        Ok(())
    }
}

/// Iterator over the persistent directory.
///
/// Holds a read transaction for its whole lifetime so the snapshot it walks
/// stays pinned in the backing store; the entries themselves are
/// materialized up front, giving the same cursor semantics as the in-memory
/// variants. The transaction ends when the iterator is dropped.
struct PersistentIter {
    _txn: redb::ReadTransaction,
    inner: SnapshotIter,
}

impl PersistentIter {
    fn new(db: &Database, reverse: bool) -> Self {
        let txn = db
            .begin_read()
            .expect("failed to begin a key directory read");
        let table = txn
            .open_table(INDEX_TABLE)
            .expect("failed to open the key directory table");

        let mut items = Vec::new();
        for entry in table
            .range::<&[u8]>(..)
            .expect("failed to range over the key directory")
        {
            let (key, value) = entry.expect("failed to read a key directory entry");
            items.push((
                key.value().to_vec(),
                decode_pos(value.value()).expect("stored positional entry is corrupt"),
            ));
        }
        if reverse {
            items.reverse();
        }

        Self {
            _txn: txn,
            inner: SnapshotIter::new(items, reverse),
        }
    }
}

impl IndexIterator for PersistentIter {
    fn rewind(&mut self) {
        self.inner.rewind();
    }

    fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
    }

    fn next(&mut self) {
        self.inner.next();
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn key(&self) -> &[u8] {
        self.inner.key()
    }

    fn value(&self) -> RecordPos {
        self.inner.value()
    }
}

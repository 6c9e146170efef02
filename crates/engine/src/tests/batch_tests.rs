use tempfile::tempdir;

use super::helpers::{open_engine, test_key, test_options};
use crate::batch::key_with_seq;
use crate::{Engine, Error, WriteBatchOptions};

use datafile::codec::encode_record;
use datafile::{DataFile, Record, RecordKind};
use fio::IoKind;

// --------------------- atomic visibility ---------------------

#[test]
fn staged_writes_are_invisible_until_commit() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.put(b"b", b"old").unwrap();

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"a", b"1").unwrap();
    batch.delete(b"b").unwrap();

    assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFound)));
    assert_eq!(engine.get(b"b").unwrap(), b"old");

    batch.commit().unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFound)));
}

#[test]
fn committed_batch_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        engine.put(b"b", b"old").unwrap();

        let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.delete(b"b").unwrap();
        batch.commit().unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFound)));
}

#[test]
fn unterminated_batch_is_invisible_after_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        engine.put(b"committed", b"v").unwrap();
        engine.close().unwrap();
    }

    // Splice records carrying a batch sequence but no terminator onto the
    // end of the log, as a crash mid-commit would leave them.
    {
        let mut data_file = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();
        for key in [&b"ghost-1"[..], b"ghost-2"] {
            let record = Record {
                key: key_with_seq(key, 42),
                value: b"never committed".to_vec(),
                kind: RecordKind::Normal,
            };
            let (encoded, _) = encode_record(&record);
            data_file.write(&encoded).unwrap();
        }
        data_file.sync().unwrap();
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.get(b"committed").unwrap(), b"v");
    assert!(matches!(engine.get(b"ghost-1"), Err(Error::KeyNotFound)));
    assert!(matches!(engine.get(b"ghost-2"), Err(Error::KeyNotFound)));
    assert_eq!(engine.list_keys(), vec![b"committed".to_vec()]);
}

// --------------------- staging semantics ---------------------

#[test]
fn later_stage_supersedes_earlier_one() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"k", b"first").unwrap();
    batch.put(b"k", b"second").unwrap();
    assert_eq!(batch.len(), 1);
    batch.commit().unwrap();

    assert_eq!(engine.get(b"k").unwrap(), b"second");
}

#[test]
fn deleting_unknown_key_cancels_staged_put() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"k", b"staged").unwrap();
    // Not in the live directory, so the stage entry is dropped outright.
    batch.delete(b"k").unwrap();
    assert!(batch.is_empty());
    batch.commit().unwrap();

    assert!(matches!(engine.get(b"k"), Err(Error::KeyNotFound)));
}

#[test]
fn empty_batch_commit_is_noop() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.commit().unwrap();
    assert!(engine.list_keys().is_empty());
}

#[test]
fn batch_rejects_empty_keys() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    assert!(matches!(batch.put(b"", b"v"), Err(Error::KeyEmpty)));
    assert!(matches!(batch.delete(b""), Err(Error::KeyEmpty)));
}

#[test]
fn oversized_batch_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let options = WriteBatchOptions {
        max_batch_num: 3,
        sync_on_commit: false,
    };
    let batch = engine.new_write_batch(options).unwrap();
    for i in 0..4 {
        batch.put(&test_key(i), b"v").unwrap();
    }

    assert!(matches!(batch.commit(), Err(Error::BatchTooLarge)));
}

#[test]
fn batch_commits_interleave_with_plain_writes() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"plain-1", b"v").unwrap();

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    for i in 0..20 {
        batch.put(&test_key(i), b"batched").unwrap();
    }
    batch.commit().unwrap();

    engine.put(b"plain-2", b"v").unwrap();

    assert_eq!(engine.list_keys().len(), 22);
    assert_eq!(engine.get(&test_key(7)).unwrap(), b"batched");
}

#[test]
fn batch_can_be_reused_after_commit() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"first", b"1").unwrap();
    batch.commit().unwrap();
    assert!(batch.is_empty());

    batch.put(b"second", b"2").unwrap();
    batch.commit().unwrap();

    assert_eq!(engine.get(b"first").unwrap(), b"1");
    assert_eq!(engine.get(b"second").unwrap(), b"2");
}

// --------------------- persistent-index guard ---------------------

#[test]
fn persistent_engine_without_checkpoint_refuses_batches() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path());
    options.index_type = crate::IndexType::Persistent;

    {
        let engine = Engine::open(options.clone()).unwrap();
        engine.put(b"k", b"v").unwrap();
        // dropped without close(): no checkpoint lands on disk
    }

    let engine = Engine::open(options).unwrap();
    assert!(matches!(
        engine.new_write_batch(WriteBatchOptions::default()),
        Err(Error::BatchUnavailable)
    ));
}

#[test]
fn persistent_engine_allows_batches_with_checkpoint() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path());
    options.index_type = crate::IndexType::Persistent;

    {
        // Fresh directory: batches are allowed even without a checkpoint.
        let engine = Engine::open(options.clone()).unwrap();
        let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
        batch.put(b"k", b"v").unwrap();
        batch.commit().unwrap();
        engine.close().unwrap();
    }

    // The close above wrote the checkpoint, so the reopened engine accepts
    // batches too.
    let engine = Engine::open(options).unwrap();
    assert!(engine.new_write_batch(WriteBatchOptions::default()).is_ok());
    assert_eq!(engine.get(b"k").unwrap(), b"v");
}

use tempfile::tempdir;

use super::helpers::{test_key, test_options};
use crate::{Engine, Error, Options};

fn merge_options(dir: &std::path::Path) -> Options {
    let mut options = test_options(dir);
    // small files so the merge set spans several, no ratio gate
    options.data_file_size = 32 * 1024;
    options.data_file_merge_ratio = 0.0;
    options
}

const NEW_VALUE: &[u8] = b"some new value to merge";

// --------------------- merge effectiveness ---------------------

#[test]
fn merge_drops_garbage_and_keeps_live_data() {
    let dir = tempdir().unwrap();
    let options = merge_options(dir.path());

    {
        let engine = Engine::open(options.clone()).unwrap();
        // 500 keys, then delete the first 100 and overwrite the last 100.
        for i in 0..500 {
            engine.put(&test_key(i), &super::helpers::random_value(256)).unwrap();
        }
        for i in 0..100 {
            engine.delete(&test_key(i)).unwrap();
        }
        for i in 400..500 {
            engine.put(&test_key(i), NEW_VALUE).unwrap();
        }
        let size_before = engine.stat().unwrap().disk_size;

        engine.merge().unwrap();
        engine.close().unwrap();
        drop(engine);

        // Reopen applies the swap: dead space is gone.
        let engine = Engine::open(options.clone()).unwrap();
        let stat = engine.stat().unwrap();
        assert!(stat.disk_size < size_before, "merge should shrink the directory");
        assert_eq!(stat.key_num, 400);

        let keys = engine.list_keys();
        assert_eq!(keys.len(), 400);

        for i in 0..100 {
            assert!(matches!(engine.get(&test_key(i)), Err(Error::KeyNotFound)));
        }
        for i in 100..400 {
            assert!(engine.get(&test_key(i)).is_ok());
        }
        for i in 400..500 {
            assert_eq!(engine.get(&test_key(i)).unwrap(), NEW_VALUE);
        }
        engine.close().unwrap();
    }
}

#[test]
fn merge_is_idempotent() {
    let dir = tempdir().unwrap();
    let options = merge_options(dir.path());

    let expected: Vec<(Vec<u8>, Vec<u8>)> = (0..200)
        .map(|i| (test_key(i), format!("value-{i}").into_bytes()))
        .collect();

    {
        let engine = Engine::open(options.clone()).unwrap();
        for (key, value) in &expected {
            engine.put(key, value).unwrap();
        }
        for i in 0..50 {
            engine.delete(&test_key(i)).unwrap();
        }

        engine.merge().unwrap();
        engine.merge().unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.list_keys().len(), 150);
    for (key, value) in expected.iter().skip(50) {
        assert_eq!(&engine.get(key).unwrap(), value);
    }
}

#[test]
fn writes_after_merge_survive_restart() {
    let dir = tempdir().unwrap();
    let options = merge_options(dir.path());

    {
        let engine = Engine::open(options.clone()).unwrap();
        for i in 0..100 {
            engine.put(&test_key(i), b"first wave").unwrap();
        }
        engine.merge().unwrap();

        // These land in the post-frontier active file; recovery must replay
        // them on top of the hint-file contents.
        for i in 100..150 {
            engine.put(&test_key(i), b"second wave").unwrap();
        }
        engine.put(&test_key(0), b"overwritten after merge").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.list_keys().len(), 150);
    assert_eq!(engine.get(&test_key(0)).unwrap(), b"overwritten after merge");
    assert_eq!(engine.get(&test_key(120)).unwrap(), b"second wave");
    assert_eq!(engine.get(&test_key(50)).unwrap(), b"first wave");
}

// --------------------- preconditions ---------------------

#[test]
fn merge_on_empty_engine_is_noop() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(merge_options(dir.path())).unwrap();
    engine.merge().unwrap();
}

#[test]
fn merge_below_ratio_is_rejected() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path());
    options.data_file_merge_ratio = 0.9;
    let engine = Engine::open(options).unwrap();

    for i in 0..100 {
        engine.put(&test_key(i), b"live data only").unwrap();
    }

    assert!(matches!(engine.merge(), Err(Error::MergeRatioUnreached)));
}

#[test]
fn merge_ratio_reached_after_churn() {
    let dir = tempdir().unwrap();
    let mut options = merge_options(dir.path());
    options.data_file_merge_ratio = 0.3;
    let engine = Engine::open(options).unwrap();

    for i in 0..200 {
        engine.put(&test_key(i), &[b'x'; 512]).unwrap();
    }
    // Overwrite everything once: at least half the log is now garbage.
    for i in 0..200 {
        engine.put(&test_key(i), &[b'y'; 512]).unwrap();
    }

    engine.merge().unwrap();
}

// --------------------- partial merge directories ---------------------

#[test]
fn merge_directory_without_marker_is_discarded() {
    let dir = tempdir().unwrap();
    let options = merge_options(dir.path());

    {
        let engine = Engine::open(options.clone()).unwrap();
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }

    // Fake a crash mid-merge: scratch directory, data inside, no marker.
    let merge_dir = dir
        .path()
        .parent()
        .unwrap()
        .join(format!(
            "{}-merge",
            dir.path().file_name().unwrap().to_string_lossy()
        ));
    std::fs::create_dir_all(&merge_dir).unwrap();
    std::fs::write(merge_dir.join("000000000.data"), b"partial junk").unwrap();

    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), b"v");
    assert!(!merge_dir.exists(), "unfinished merge directory must be removed");
}

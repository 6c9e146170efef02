use tempfile::tempdir;

use super::helpers::{open_engine, test_key};
use crate::{Engine, Error};

// --------------------- stat ---------------------

#[test]
fn stat_reports_counts_and_sizes() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    for i in 0..10 {
        engine.put(&test_key(i), b"value").unwrap();
    }
    engine.delete(&test_key(0)).unwrap();

    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_num, 9);
    assert_eq!(stat.data_file_num, 1);
    assert!(stat.disk_size > 0);
    assert!(stat.reclaimable_size > 0);
}

// --------------------- fold ---------------------

#[test]
fn fold_visits_live_pairs_in_order() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"b", b"2").unwrap();
    engine.put(b"a", b"1").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.delete(b"b").unwrap();

    let mut seen = Vec::new();
    engine
        .fold(|key, value| {
            seen.push((key.to_vec(), value));
            true
        })
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn fold_stops_when_closure_returns_false() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    for i in 0..10 {
        engine.put(&test_key(i), b"v").unwrap();
    }

    let mut visited = 0;
    engine
        .fold(|_, _| {
            visited += 1;
            visited < 3
        })
        .unwrap();
    assert_eq!(visited, 3);
}

// --------------------- list_keys ---------------------

#[test]
fn list_keys_is_sorted_and_live_only() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"cherry", b"1").unwrap();
    engine.put(b"apple", b"2").unwrap();
    engine.put(b"banana", b"3").unwrap();
    engine.delete(b"banana").unwrap();

    assert_eq!(
        engine.list_keys(),
        vec![b"apple".to_vec(), b"cherry".to_vec()]
    );
}

// --------------------- backup ---------------------

#[test]
fn backup_can_be_opened_as_a_database() {
    let dir = tempdir().unwrap();
    let backup_dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    for i in 0..50 {
        engine.put(&test_key(i), format!("v{i}").as_bytes()).unwrap();
    }
    engine.sync().unwrap();

    let target = backup_dir.path().join("backup");
    engine.backup(&target).unwrap();

    // The lock file must not travel with the backup.
    assert!(!target.join(crate::FILE_LOCK_NAME).exists());

    // A second engine over the copy sees the same data, while the original
    // is still open.
    let restored = Engine::open(super::helpers::test_options(&target)).unwrap();
    assert_eq!(restored.list_keys().len(), 50);
    for i in 0..50 {
        assert_eq!(restored.get(&test_key(i)).unwrap(), format!("v{i}").as_bytes());
    }
}

// --------------------- error surface ---------------------

#[test]
fn get_missing_key_is_key_not_found() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.put(b"present", b"v").unwrap();

    assert!(matches!(engine.get(b"absent"), Err(Error::KeyNotFound)));
}

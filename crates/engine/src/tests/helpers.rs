use std::path::Path;

use rand::RngCore;

use crate::{Engine, IndexType, Options};

/// Options for a throwaway test engine: small files, no forced sync, mmap
/// recovery on so the reset path is exercised constantly.
pub fn test_options(dir: &Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 4 * 1024 * 1024,
        sync_writes: false,
        bytes_per_sync: 0,
        index_type: IndexType::BTree,
        mmap_at_startup: true,
        data_file_merge_ratio: 0.5,
    }
}

pub fn open_engine(dir: &Path) -> Engine {
    Engine::open(test_options(dir)).expect("failed to open test engine")
}

/// A deterministic test key: `key-00042`.
pub fn test_key(i: usize) -> Vec<u8> {
    format!("key-{i:05}").into_bytes()
}

/// A random value of the given size.
pub fn random_value(len: usize) -> Vec<u8> {
    let mut value = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut value);
    value
}

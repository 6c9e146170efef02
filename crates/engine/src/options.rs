use std::path::PathBuf;

pub use keydir::IndexType;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Data directory. Created on open if missing.
    pub dir_path: PathBuf,

    /// Size threshold in bytes; an append that would push the active file
    /// past it triggers rotation to a new file.
    pub data_file_size: u64,

    /// Force `fsync` after every append.
    pub sync_writes: bool,

    /// When non-zero and `sync_writes` is off, sync after this many
    /// accumulated bytes.
    pub bytes_per_sync: u64,

    /// Which key-directory implementation to use.
    pub index_type: IndexType,

    /// Open data files as read-only memory maps for the recovery scan; they
    /// are reset to standard I/O once recovery completes.
    pub mmap_at_startup: bool,

    /// Minimum `reclaimable / total` ratio required to admit a merge,
    /// in `[0, 1]`.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("cinderkv"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: true,
            data_file_merge_ratio: 0.5,
        }
    }
}

/// Engine-iterator configuration.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys beginning with this prefix; empty means no filter.
    pub prefix: Vec<u8>,

    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Write-batch configuration.
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of staged records a single commit accepts.
    pub max_batch_num: usize,

    /// Sync the active file after the terminator record lands.
    pub sync_on_commit: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_on_commit: true,
        }
    }
}

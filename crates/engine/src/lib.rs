//! # engine — CinderKV Storage Engine
//!
//! The central orchestrator tying the [`fio`], [`datafile`] and [`keydir`]
//! crates into a complete Bitcask-style key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                    ENGINE                        │
//! │                                                  │
//! │ write.rs → encode record → append to active file │
//! │               |                                  │
//! │               |  (file-size threshold exceeded?) │
//! │               |            yes                   │
//! │               v                                  │
//! │        rotate → active becomes immutable,        │
//! │                 new active file (id + 1)         │
//! │                                                  │
//! │ read.rs  → key directory → read-at-offset        │
//! │ merge.rs → rewrite live records into a sibling   │
//! │            directory, swapped in on next open    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Purpose |
//! |---|---|
//! | `lib.rs` | `Engine` struct, open/close lifecycle, sync, stats, backup |
//! | `write` | `put()`, `delete()`, the locked append path with rotation |
//! | `read` | `get()`, `list_keys()`, `fold()`, value resolution |
//! | `recovery` | data-file loading, hint-file fast path, record replay |
//! | `merge` | compaction into a scratch directory + artifact swap |
//! | `batch` | atomic write batches over sequence-numbered keys |
//! | `iterator` | prefix/direction iterator with value resolution |
//!
//! ## Crash Safety
//!
//! Every mutation is a single appended record; the in-memory key directory
//! is updated only after the append succeeds. Batches become visible only
//! once their terminator record is on disk — recovery discards any batch
//! without one. Merge never touches the live directory; its artifacts are
//! swapped in atomically on the next open, gated on the `merge-finished`
//! marker.

mod batch;
mod errors;
mod fsutil;
mod iterator;
mod merge;
mod options;
mod read;
mod recovery;
mod write;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use fs2::FileExt;
use parking_lot::RwLock;
use tracing::{debug, info};

use datafile::codec::encode_record;
use datafile::{DataFile, Record, RecordKind};
use keydir::Indexer;

pub use batch::WriteBatch;
pub use errors::{Error, Result};
pub use iterator::EngineIterator;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};

/// Name of the advisory lock file inside the data directory.
pub const FILE_LOCK_NAME: &str = "fLock";

/// Key of the single record inside the `seq-no` checkpoint file.
const SEQ_NO_KEY: &[u8] = b"seq.no";

/// A Bitcask-style storage engine instance.
///
/// All operations take `&self`; an engine-wide reader/writer lock guards the
/// file table and the append path, the key directory locks internally, and
/// the sequence/reclaim counters are atomics. The instance is `Send + Sync`
/// and is normally shared behind an `Arc`.
pub struct Engine {
    pub(crate) options: Options,

    /// Active file, immutable files and the bytes-since-sync counter.
    /// Writers hold the write side for the whole append (rotation and sync
    /// included); readers hold the read side while resolving values.
    pub(crate) files: RwLock<FileSet>,

    /// The key directory.
    pub(crate) index: Box<dyn Indexer>,

    /// Latest allocated sequence number; 0 marks non-batch records.
    pub(crate) seq_no: AtomicU64,

    /// Guard flag: only one merge may run at a time.
    pub(crate) merging: AtomicBool,

    /// Bytes on disk made garbage by overwrites and deletes.
    pub(crate) reclaim_size: AtomicI64,

    /// Whether the `seq-no` checkpoint existed when the engine opened.
    pub(crate) seq_file_exists: bool,

    /// Whether the data directory was created (or empty) at open.
    pub(crate) is_initial: bool,

    /// Holds the advisory lock for the engine's lifetime; dropping the
    /// handle releases the lock on every exit path, panics included.
    lock_file: File,
}

/// Mutable file-table state behind the engine lock.
#[derive(Default)]
pub(crate) struct FileSet {
    pub(crate) active: Option<DataFile>,
    pub(crate) older: HashMap<u32, DataFile>,
    /// Bytes appended since the last sync, for `bytes_per_sync`.
    pub(crate) bytes_write: u64,
}

impl FileSet {
    pub(crate) fn active_mut(&mut self) -> &mut DataFile {
        self.active.as_mut().expect("active data file not open")
    }
}

/// Engine statistics, as reported by [`Engine::stat`].
#[derive(Debug, Clone)]
pub struct Stat {
    /// Live keys in the key directory.
    pub key_num: usize,
    /// Data files on disk, active file included.
    pub data_file_num: u32,
    /// Bytes reclaimable by a merge.
    pub reclaimable_size: i64,
    /// Total size of the data directory on disk.
    pub disk_size: u64,
}

impl Engine {
    /// Opens an engine instance over `options.dir_path`, creating the
    /// directory if needed, acquiring its advisory lock and rebuilding the
    /// key directory from disk.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidOptions`] — empty path, zero file size or a merge
    ///   ratio outside `[0, 1]`.
    /// * [`Error::DirectoryBusy`] — another process holds the lock.
    /// * [`Error::DirectoryCorrupted`] — an unparseable data file name.
    /// * [`Error::CorruptRecord`] — CRC mismatch during replay; the engine
    ///   refuses to open silently degraded.
    pub fn open(options: Options) -> Result<Self> {
        check_options(&options)?;

        let dir = options.dir_path.clone();
        let mut is_initial = !dir.exists();
        if is_initial {
            fs::create_dir_all(&dir)?;
        }
        if fs::read_dir(&dir)?.next().is_none() {
            is_initial = true;
        }

        let lock_file = acquire_dir_lock(&dir)?;

        let index = keydir::new_indexer(options.index_type, &dir, options.sync_writes);

        let mut engine = Engine {
            index,
            files: RwLock::new(FileSet::default()),
            seq_no: AtomicU64::new(0),
            merging: AtomicBool::new(false),
            reclaim_size: AtomicI64::new(0),
            seq_file_exists: false,
            is_initial,
            lock_file,
            options,
        };

        // A completed merge left its artifacts in the sibling directory;
        // swap them in before looking at the data files.
        engine.load_merge_artifacts()?;

        let file_ids = engine.load_data_files()?;

        if engine.options.index_type != IndexType::Persistent {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files(&file_ids)?;
        } else {
            // The persistent directory already knows its keys; it only needs
            // the sequence checkpoint and a write cursor for the active file.
            engine.load_seq_no()?;
            let files = engine.files.get_mut();
            if let Some(active) = files.active.as_mut() {
                active.write_offset = active.size()?;
            }
        }

        if engine.options.mmap_at_startup {
            engine.reset_io_kind()?;
        }

        info!(
            dir = %engine.options.dir_path.display(),
            files = file_ids.len(),
            keys = engine.index.len(),
            "opened database"
        );
        Ok(engine)
    }

    /// Shuts the engine down: persists the sequence checkpoint, syncs and
    /// releases every data file, closes the key directory and drops the
    /// advisory lock.
    pub fn close(&self) -> Result<()> {
        let mut files = self.files.write();

        if files.active.is_some() {
            // The checkpoint is written for every index variant but only
            // consulted by the persistent one, which cannot re-derive the
            // sequence number from a replay it never performs.
            let mut seq_file = DataFile::open_seq_no(&self.options.dir_path)?;
            let record = Record {
                key: SEQ_NO_KEY.to_vec(),
                value: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
                kind: RecordKind::Normal,
            };
            let (encoded, _) = encode_record(&record);
            seq_file.write(&encoded)?;
            seq_file.sync()?;

            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
            files.active = None;
            files.older.clear();
        }

        self.index.close()?;
        self.lock_file.unlock()?;
        debug!(dir = %self.options.dir_path.display(), "closed database");
        Ok(())
    }

    /// Flushes the active file to disk.
    pub fn sync(&self) -> Result<()> {
        let files = self.files.write();
        if let Some(active) = files.active.as_ref() {
            active.sync()?;
        }
        Ok(())
    }

    /// Reports key count, data-file count, reclaimable bytes and the size of
    /// the directory on disk.
    pub fn stat(&self) -> Result<Stat> {
        let files = self.files.read();

        let mut data_file_num = files.older.len() as u32;
        if files.active.is_some() {
            data_file_num += 1;
        }

        Ok(Stat {
            key_num: self.index.len(),
            data_file_num,
            reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: fsutil::dir_size(&self.options.dir_path)?,
        })
    }

    /// Copies the data directory to `dir`, excluding the lock file. Writes
    /// are held off for the duration.
    pub fn backup(&self, dir: impl AsRef<Path>) -> Result<()> {
        let _files = self.files.read();
        fsutil::copy_dir(&self.options.dir_path, dir.as_ref(), &[FILE_LOCK_NAME])?;
        Ok(())
    }

    /// The sibling scratch directory used by merge: `<data-dir>-merge`.
    pub(crate) fn merge_path(&self) -> PathBuf {
        let dir = &self.options.dir_path;
        let mut name = dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push("-merge");
        dir.parent().unwrap_or_else(|| Path::new(".")).join(name)
    }

    /// Opens the next active file (`previous id + 1`, or 0 for a fresh
    /// directory), demoting the current one to the immutable table.
    /// Callers sync the outgoing file first.
    pub(crate) fn set_active_file(&self, files: &mut FileSet) -> Result<()> {
        let next_id = files.active.as_ref().map_or(0, |f| f.file_id + 1);
        let data_file = DataFile::open(&self.options.dir_path, next_id, fio::IoKind::Standard)?;
        if let Some(prev) = files.active.take() {
            files.older.insert(prev.file_id, prev);
        }
        files.active = Some(data_file);
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.options.dir_path)
            .field("index_type", &self.options.index_type)
            .field("data_file_size", &self.options.data_file_size)
            .field("keys", &self.index.len())
            .field("seq_no", &self.seq_no.load(Ordering::SeqCst))
            .field("reclaimable", &self.reclaim_size.load(Ordering::SeqCst))
            .finish()
    }
}

/// Best-effort flush on drop so an engine abandoned without [`Engine::close`]
/// still lands its tail writes. The advisory lock releases with the file
/// handle.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(active) = self.files.get_mut().active.as_ref() {
            let _ = active.sync();
        }
    }
}

fn check_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::InvalidOptions(
            "database directory path is empty".into(),
        ));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions(
            "data file size must be greater than zero".into(),
        ));
    }
    if !(0.0..=1.0).contains(&options.data_file_merge_ratio) {
        return Err(Error::InvalidOptions(
            "merge ratio must be between 0 and 1".into(),
        ));
    }
    Ok(())
}

/// Takes the advisory lock on `dir/fLock`, failing fast when another
/// process already holds it.
fn acquire_dir_lock(dir: &Path) -> Result<File> {
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dir.join(FILE_LOCK_NAME))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| Error::DirectoryBusy)?;
    Ok(lock_file)
}

#[cfg(test)]
mod tests;

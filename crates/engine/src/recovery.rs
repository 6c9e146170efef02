//! Cold-start recovery: discovering data files, the hint-file fast path and
//! the full record replay that rebuilds the key directory.
//!
//! Replay honors batch atomicity. Records with a positive sequence number
//! are buffered per sequence and applied only when that sequence's
//! terminator shows up; a batch that never reached its terminator is
//! discarded — its records stay on disk as orphans but never become
//! visible.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use datafile::codec::decode_pos;
use datafile::{DataFile, Record, RecordKind, RecordPos};
use fio::IoKind;

use crate::batch::{split_seq, NON_TXN_SEQ};
use crate::{Engine, Error, Result};

impl Engine {
    /// Lists `*.data` files, parses their ids and opens them — every id but
    /// the largest as an immutable file, the largest as the active one.
    /// Returns the sorted ids for the replay pass.
    pub(crate) fn load_data_files(&mut self) -> Result<Vec<u32>> {
        let mut file_ids = Vec::new();
        for entry in fs::read_dir(&self.options.dir_path)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(datafile::DATA_FILE_SUFFIX) {
                let id: u32 = stem.parse().map_err(|_| Error::DirectoryCorrupted)?;
                file_ids.push(id);
            }
        }
        file_ids.sort_unstable();

        let io_kind = if self.options.mmap_at_startup {
            IoKind::Mmap
        } else {
            IoKind::Standard
        };

        let files = self.files.get_mut();
        for (i, &file_id) in file_ids.iter().enumerate() {
            let data_file = DataFile::open(&self.options.dir_path, file_id, io_kind)?;
            if i == file_ids.len() - 1 {
                files.active = Some(data_file);
            } else {
                files.older.insert(file_id, data_file);
            }
        }

        Ok(file_ids)
    }

    /// Populates the key directory from the hint file, if one exists. Hint
    /// records carry user keys and encoded positional entries, so no replay
    /// of the covered files is needed.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        let hint_path = self.options.dir_path.join(datafile::HINT_FILE_NAME);
        if !hint_path.exists() {
            return Ok(());
        }

        let hint_file = DataFile::open_hint(&self.options.dir_path)?;
        let mut offset = 0u64;
        let mut loaded = 0usize;
        while let Some((record, size)) = hint_file.read_record(offset)? {
            let pos = decode_pos(&record.value)?;
            self.index.put(&record.key, pos);
            offset += size;
            loaded += 1;
        }

        debug!(keys = loaded, "loaded key directory from hint file");
        Ok(())
    }

    /// Replays data files into the key directory, reconstructing the
    /// reclaimable counter and the latest sequence number along the way.
    /// Files below the merge frontier are skipped — the hint file already
    /// covered them.
    pub(crate) fn load_index_from_data_files(&mut self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }

        let frontier = if self
            .options
            .dir_path
            .join(datafile::MERGE_FINISHED_FILE_NAME)
            .exists()
        {
            Some(read_frontier_id(&self.options.dir_path)?)
        } else {
            None
        };

        let index = &self.index;
        let reclaim = &self.reclaim_size;
        let apply = |key: &[u8], kind: RecordKind, pos: RecordPos| {
            let old = if kind == RecordKind::Tombstone {
                reclaim.fetch_add(i64::from(pos.size), Ordering::SeqCst);
                index.delete(key)
            } else {
                index.put(key, pos)
            };
            if let Some(old) = old {
                reclaim.fetch_add(i64::from(old.size), Ordering::SeqCst);
            }
        };

        // Batches stage here until their terminator proves them committed.
        let mut pending_batches: HashMap<u64, Vec<(Record, RecordPos)>> = HashMap::new();
        let mut current_seq = NON_TXN_SEQ;

        let files = self.files.get_mut();
        for (i, &file_id) in file_ids.iter().enumerate() {
            if frontier.is_some_and(|f| file_id < f) {
                continue;
            }

            let is_active = i == file_ids.len() - 1;
            let mut offset = 0u64;
            {
                let data_file = if is_active {
                    files.active.as_ref().ok_or(Error::DataFileNotFound)?
                } else {
                    files.older.get(&file_id).ok_or(Error::DataFileNotFound)?
                };

                while let Some((record, size)) = data_file.read_record(offset)? {
                    let pos = RecordPos {
                        file_id,
                        offset,
                        size: size as u32,
                    };

                    let (user_key, seq) = split_seq(&record.key);
                    if seq == NON_TXN_SEQ {
                        apply(&user_key, record.kind, pos);
                    } else if record.kind == RecordKind::BatchFinished {
                        for (staged, staged_pos) in
                            pending_batches.remove(&seq).unwrap_or_default()
                        {
                            apply(&staged.key, staged.kind, staged_pos);
                        }
                    } else {
                        pending_batches.entry(seq).or_default().push((
                            Record {
                                key: user_key.clone(),
                                value: record.value,
                                kind: record.kind,
                            },
                            pos,
                        ));
                    }

                    if seq > current_seq {
                        current_seq = seq;
                    }
                    offset += size;
                }
            }

            if is_active {
                if let Some(active) = files.active.as_mut() {
                    active.write_offset = offset;
                }
            }
        }

        if !pending_batches.is_empty() {
            warn!(
                batches = pending_batches.len(),
                "discarded unfinished batches during replay"
            );
        }

        self.seq_no.store(current_seq, Ordering::SeqCst);
        Ok(())
    }

    /// Loads (and removes) the `seq-no` checkpoint. Only the persistent
    /// index variant calls this — it never replays data files, so the
    /// checkpoint is its only source for the sequence counter.
    pub(crate) fn load_seq_no(&mut self) -> Result<()> {
        let path = self.options.dir_path.join(datafile::SEQ_NO_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }

        let seq_file = DataFile::open_seq_no(&self.options.dir_path)?;
        let (record, _) = seq_file.read_record(0)?.ok_or(Error::CorruptRecord)?;
        let seq = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(Error::CorruptRecord)?;

        self.seq_no.store(seq, Ordering::SeqCst);
        self.seq_file_exists = true;
        fs::remove_file(path)?;
        Ok(())
    }

    /// Switches every data file back to standard I/O after a memory-mapped
    /// recovery scan, so appends work and reads go through one code path.
    pub(crate) fn reset_io_kind(&mut self) -> Result<()> {
        let files = self.files.get_mut();
        if files.active.is_none() {
            return Ok(());
        }

        if let Some(active) = files.active.as_mut() {
            active.set_io_kind(&self.options.dir_path, IoKind::Standard)?;
        }
        for data_file in files.older.values_mut() {
            data_file.set_io_kind(&self.options.dir_path, IoKind::Standard)?;
        }
        Ok(())
    }
}

/// Reads the frontier id out of a `merge-finished` marker in `dir`: the
/// smallest file id that did not participate in that merge.
pub(crate) fn read_frontier_id(dir: &std::path::Path) -> Result<u32> {
    let marker = DataFile::open_merge_finished(dir)?;
    let (record, _) = marker.read_record(0)?.ok_or(Error::CorruptRecord)?;
    std::str::from_utf8(&record.value)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or(Error::CorruptRecord)
}

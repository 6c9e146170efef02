//! Merge (compaction): rewrites every live record from the immutable files
//! into a scratch engine rooted at the sibling `<dir>-merge` directory,
//! produces the hint file, and stamps the result with a `merge-finished`
//! marker. The live directory is never touched — the swap happens on the
//! next open, and a crash before the marker lands simply discards the
//! scratch directory.

use std::fs;
use std::sync::atomic::Ordering;

use tracing::{debug, info};

use datafile::codec::encode_record;
use datafile::{DataFile, Record, RecordKind};

use crate::batch::{key_with_seq, split_seq, NON_TXN_SEQ};
use crate::recovery::read_frontier_id;
use crate::{fsutil, Engine, Error, Result};

/// Key of the single record inside a `merge-finished` marker.
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Resets the merge flag even when the merge bails out early.
struct MergeGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Compacts the immutable files, reclaiming space held by overwritten
    /// and deleted records.
    ///
    /// Preconditions, checked under the write lock: no merge already
    /// running, reclaimable bytes at or above `data_file_merge_ratio`, and
    /// enough free disk for the surviving data. The lock is released before
    /// scanning, so writers keep going while the merge runs.
    pub fn merge(&self) -> Result<()> {
        let (frontier, merge_ids, _guard) = {
            let mut files = self.files.write();
            if files.active.is_none() {
                return Ok(());
            }

            if self.merging.load(Ordering::Acquire) {
                return Err(Error::MergeInProgress);
            }

            let total_size = fsutil::dir_size(&self.options.dir_path)?;
            let reclaimable = self.reclaim_size.load(Ordering::SeqCst);
            if (reclaimable as f32) / (total_size as f32) < self.options.data_file_merge_ratio {
                return Err(Error::MergeRatioUnreached);
            }

            let surviving = total_size.saturating_sub(reclaimable.max(0) as u64);
            if surviving >= fsutil::available_disk_space(&self.options.dir_path)? {
                return Err(Error::NoSpaceForMerge);
            }

            self.merging.store(true, Ordering::Release);
            let guard = MergeGuard(&self.merging);

            // Seal the current active file so the merge set is complete up
            // to this instant; everything newer stays out of this merge.
            files.active_mut().sync()?;
            self.set_active_file(&mut files)?;
            let frontier = files.active_mut().file_id;

            let mut merge_ids: Vec<u32> = files.older.keys().copied().collect();
            merge_ids.sort_unstable();
            (frontier, merge_ids, guard)
        };

        info!(frontier, files = merge_ids.len(), "starting merge");

        // Fresh scratch directory next to the data directory.
        let merge_path = self.merge_path();
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        let mut merge_options = self.options.clone();
        merge_options.dir_path = merge_path.clone();
        merge_options.sync_writes = false;
        let merge_engine = Engine::open(merge_options)?;
        let mut hint_file = DataFile::open_hint(&merge_path)?;

        for file_id in merge_ids {
            let mut offset = 0u64;
            loop {
                let next = {
                    let files = self.files.read();
                    let Some(data_file) = files.older.get(&file_id) else {
                        break;
                    };
                    data_file.read_record(offset)?
                };
                let Some((record, size)) = next else {
                    break;
                };

                // A record is live iff the directory still points exactly at
                // it; everything else in these files is garbage.
                let (user_key, _) = split_seq(&record.key);
                let current = self.index.get(&user_key);
                if current.is_some_and(|pos| pos.file_id == file_id && pos.offset == offset) {
                    // The merged log is transactionally flat: committed batch
                    // records are rewritten with the non-batch prefix.
                    let rewritten = Record {
                        key: key_with_seq(&user_key, NON_TXN_SEQ),
                        value: record.value,
                        kind: record.kind,
                    };
                    let merge_pos = merge_engine.append_record(&rewritten)?;
                    hint_file.write_hint_record(&user_key, &merge_pos)?;
                }

                offset += size;
            }
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        // The marker is the commit point: recovery only trusts a scratch
        // directory that carries one.
        let mut finished_file = DataFile::open_merge_finished(&merge_path)?;
        let record = Record {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: frontier.to_string().into_bytes(),
            kind: RecordKind::Normal,
        };
        let (encoded, _) = encode_record(&record);
        finished_file.write(&encoded)?;
        finished_file.sync()?;

        info!(frontier, "merge finished");
        Ok(())
    }

    /// Applies merge artifacts on open: when the sibling scratch directory
    /// holds a `merge-finished` marker, data files below the frontier are
    /// deleted and the merged files (data, hint, marker) move into the data
    /// directory. The scratch directory is removed afterwards either way.
    pub(crate) fn load_merge_artifacts(&self) -> Result<()> {
        let merge_path = self.merge_path();
        if !merge_path.exists() {
            return Ok(());
        }

        let result = self.apply_merge_artifacts(&merge_path);
        let _ = fs::remove_dir_all(&merge_path);
        result
    }

    fn apply_merge_artifacts(&self, merge_path: &std::path::Path) -> Result<()> {
        let mut merge_finished = false;
        let mut artifact_names = Vec::new();
        for entry in fs::read_dir(merge_path)? {
            let name = entry?.file_name();
            if name.as_os_str() == datafile::MERGE_FINISHED_FILE_NAME {
                merge_finished = true;
            }
            // The scratch engine's own bookkeeping stays behind: its
            // checkpoint and lock are meaningless outside the scratch
            // directory, and its (empty) persistent index must not replace
            // the live one.
            if name.as_os_str() == datafile::SEQ_NO_FILE_NAME
                || name.as_os_str() == crate::FILE_LOCK_NAME
                || name.as_os_str() == "bptree-index"
            {
                continue;
            }
            artifact_names.push(name);
        }

        if !merge_finished {
            debug!("ignoring merge directory without a finished marker");
            return Ok(());
        }

        let frontier = read_frontier_id(merge_path)?;

        // Everything below the frontier has been superseded by the merge.
        for file_id in 0..frontier {
            let path = datafile::data_file_path(&self.options.dir_path, file_id);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }

        for name in artifact_names {
            fs::rename(merge_path.join(&name), self.options.dir_path.join(&name))?;
        }

        info!(frontier, "applied merge artifacts");
        Ok(())
    }
}

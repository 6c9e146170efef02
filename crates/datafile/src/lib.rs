//! # datafile — Append-Only Data Files
//!
//! A data file is a concatenation of CRC-framed records in append order (see
//! [`codec`] for the frame layout). Files are named `NNNNNNNNN.data` with a
//! 9-digit zero-padded file id; the largest id in a directory is the active
//! file and every smaller id is immutable.
//!
//! The same frame format backs three auxiliary files:
//!
//! * `hint-index` — written by merge; each record's key is a user key and its
//!   value an encoded [`RecordPos`], letting recovery skip full data scans.
//! * `merge-finished` — a single record naming the smallest file id that did
//!   not participate in the last merge.
//! * `seq-no` — the sequence-number checkpoint written on close.

pub mod codec;

use std::io;
use std::path::{Path, PathBuf};

use fio::{IoKind, IoManager};
use thiserror::Error as ThisError;

pub use codec::{Header, Record, RecordKind, RecordPos, MAX_HEADER_SIZE};

/// Suffix of every data file.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Name of the hint file produced by merge.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Name of the merge-completion marker.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Name of the sequence-number checkpoint.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Errors from the record codec and data-file access.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or decoded to nonsense.
    #[error("corrupt record")]
    CorruptRecord,
}

pub type Result<T> = std::result::Result<T, Error>;

/// An append-only record log with a write cursor.
pub struct DataFile {
    /// Identifier parsed from (and embedded in) the file name.
    pub file_id: u32,
    /// Logical append cursor; advanced by every successful write.
    pub write_offset: u64,
    io: Box<dyn IoManager>,
}

/// Returns the path of the data file with the given id.
pub fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{file_id:09}{DATA_FILE_SUFFIX}"))
}

impl DataFile {
    fn new(path: &Path, file_id: u32, kind: IoKind) -> Result<Self> {
        Ok(Self {
            file_id,
            write_offset: 0,
            io: fio::open(path, kind)?,
        })
    }

    /// Opens the data file with the given id inside `dir`.
    pub fn open(dir: &Path, file_id: u32, kind: IoKind) -> Result<Self> {
        Self::new(&data_file_path(dir, file_id), file_id, kind)
    }

    /// Opens the hint file inside `dir`.
    pub fn open_hint(dir: &Path) -> Result<Self> {
        Self::new(&dir.join(HINT_FILE_NAME), 0, IoKind::Standard)
    }

    /// Opens the merge-finished marker file inside `dir`.
    pub fn open_merge_finished(dir: &Path) -> Result<Self> {
        Self::new(&dir.join(MERGE_FINISHED_FILE_NAME), 0, IoKind::Standard)
    }

    /// Opens the sequence-number checkpoint file inside `dir`.
    pub fn open_seq_no(dir: &Path) -> Result<Self> {
        Self::new(&dir.join(SEQ_NO_FILE_NAME), 0, IoKind::Standard)
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns `Ok(None)` at logical EOF: an all-zero header, or a tail too
    /// short to hold one. Returns [`Error::CorruptRecord`] when the stored
    /// checksum disagrees with the recomputed one.
    pub fn read_record(&self, offset: u64) -> Result<Option<(Record, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // Clamp the header fetch to what the file still holds; reading the
        // full MAX_HEADER_SIZE past the last record would fail outright.
        let header_bytes = (MAX_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_bytes];
        self.io.read_at(&mut header_buf, offset)?;

        let Some((header, header_len)) = codec::decode_header(&header_buf) else {
            return Ok(None);
        };
        if header.is_eof_sentinel() {
            return Ok(None);
        }

        let kind = codec::record_kind(&header)?;
        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;

        let mut record = Record {
            key: Vec::new(),
            value: Vec::new(),
            kind,
        };
        if key_size > 0 || value_size > 0 {
            let mut kv = vec![0u8; key_size + value_size];
            self.io.read_at(&mut kv, offset + header_len as u64)?;
            record.value = kv.split_off(key_size);
            record.key = kv;
        }

        if codec::record_crc(&record, &header_buf[4..header_len]) != header.crc {
            return Err(Error::CorruptRecord);
        }

        let total = (header_len + key_size + value_size) as u64;
        Ok(Some((record, total)))
    }

    /// Appends raw frame bytes, advancing the write cursor.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.append(buf)?;
        self.write_offset += n as u64;
        Ok(())
    }

    /// Appends a hint record: the user key paired with its encoded position.
    pub fn write_hint_record(&mut self, key: &[u8], pos: &RecordPos) -> Result<()> {
        let record = Record {
            key: key.to_vec(),
            value: codec::encode_pos(pos),
            kind: RecordKind::Normal,
        };
        let (encoded, _) = codec::encode_record(&record);
        self.write(&encoded)
    }

    /// Forces pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.io.sync()?;
        Ok(())
    }

    /// Current file size (map length for memory-mapped files).
    pub fn size(&self) -> Result<u64> {
        Ok(self.io.size()?)
    }

    /// Re-opens the backing file with a different I/O backend, keeping the
    /// write cursor. Used to drop out of mmap mode after recovery.
    pub fn set_io_kind(&mut self, dir: &Path, kind: IoKind) -> Result<()> {
        self.io = fio::open(&data_file_path(dir, self.file_id), kind)?;
        Ok(())
    }
}

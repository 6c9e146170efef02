//! # fio — File I/O Manager
//!
//! A uniform read-at-offset / append / sync / size interface over two
//! backends:
//!
//! * [`StandardIo`] — a regular file opened create+read+write+append with
//!   permission `0644`. This is the only backend that accepts appends; the
//!   active data file always uses it.
//! * [`MmapIo`] — a read-only memory map. Used when the engine opts into
//!   mapped recovery scans; once recovery completes every file is reset back
//!   to standard I/O, so `append` is never reached on a map and `sync` has
//!   nothing to flush.
//!
//! The backend is chosen per file via [`IoKind`].

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use memmap2::Mmap;

/// File permission for newly created data files.
const DATA_FILE_MODE: u32 = 0o644;

/// Which I/O backend to open a file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Standard file descriptor I/O.
    Standard,
    /// Read-only memory map.
    Mmap,
}

/// Uniform file access used by data files.
///
/// `read_at` must fill the whole buffer or fail; callers size their reads
/// from the file length beforehand.
pub trait IoManager: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Appends `buf` to the end of the file, returning the number of bytes
    /// written.
    fn append(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Forces written data down to disk.
    fn sync(&self) -> io::Result<()>;

    /// Current file size in bytes (map length for [`MmapIo`]).
    fn size(&self) -> io::Result<u64>;
}

/// Opens the backend of the given kind for `path`.
pub fn open(path: &Path, kind: IoKind) -> io::Result<Box<dyn IoManager>> {
    match kind {
        IoKind::Standard => Ok(Box::new(StandardIo::open(path)?)),
        IoKind::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}

/// Standard file descriptor backend.
pub struct StandardIo {
    file: File,
}

impl StandardIo {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .mode(DATA_FILE_MODE)
            .open(path)?;
        Ok(Self { file })
    }
}

impl IoManager for StandardIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_exact_at(buf, offset)?;
        Ok(buf.len())
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Read-only memory-map backend.
///
/// The file is created first if missing (mapping a nonexistent path is an
/// error, and recovery may probe files that were never written).
pub struct MmapIo {
    map: Mmap,
}

impl MmapIo {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .mode(DATA_FILE_MODE)
            .open(path)?;
        // Safety: the engine only maps files it treats as immutable for the
        // duration of the map; nothing truncates them while mapped.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }
}

impl IoManager for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&e| e <= self.map.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of mapped file")
            })?;
        buf.copy_from_slice(&self.map[start..end]);
        Ok(buf.len())
    }

    fn append(&mut self, _buf: &[u8]) -> io::Result<usize> {
        unreachable!("append on a read-only memory map")
    }

    fn sync(&self) -> io::Result<()> {
        // Nothing to flush: the map is read-only.
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.map.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn standard_append_and_read_at() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("000000001.data");

        let mut io = StandardIo::open(&path)?;
        assert_eq!(io.append(b"hello")?, 5);
        assert_eq!(io.append(b" world")?, 6);
        io.sync()?;

        let mut buf = [0u8; 5];
        io.read_at(&mut buf, 6)?;
        assert_eq!(&buf, b"world");
        assert_eq!(io.size()?, 11);
        Ok(())
    }

    #[test]
    fn read_past_end_fails() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("short.data");

        let mut io = StandardIo::open(&path)?;
        io.append(b"abc")?;

        let mut buf = [0u8; 8];
        assert!(io.read_at(&mut buf, 0).is_err());
        Ok(())
    }

    #[test]
    fn mmap_reads_what_standard_wrote() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mapped.data");

        let mut w = StandardIo::open(&path)?;
        w.append(b"mapped contents")?;
        w.sync()?;

        let m = MmapIo::open(&path)?;
        assert_eq!(m.size()?, 15);
        let mut buf = [0u8; 8];
        m.read_at(&mut buf, 7)?;
        assert_eq!(&buf, b"contents");

        // past-the-end read is rejected rather than truncated
        let mut big = [0u8; 32];
        assert!(m.read_at(&mut big, 0).is_err());
        Ok(())
    }

    #[test]
    fn mmap_of_missing_file_is_empty() -> io::Result<()> {
        let dir = tempdir()?;
        let m = MmapIo::open(&dir.path().join("absent.data"))?;
        assert_eq!(m.size()?, 0);
        Ok(())
    }
}

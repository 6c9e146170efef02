//! Small file-system helpers used by stats, merge admission and backup.

use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of every regular file under `path`, recursively.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Bytes available to unprivileged users on the volume holding `path`.
pub fn available_disk_space(path: &Path) -> io::Result<u64> {
    fs2::available_space(path)
}

/// Recursively copies `src` into `dst` (created if missing), skipping any
/// entry whose file name is in `exclude`.
pub fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name.as_os_str() == *e) {
            continue;
        }

        let target = dst.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&entry.path(), &target, exclude)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

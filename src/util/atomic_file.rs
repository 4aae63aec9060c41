//! Atomic file writes: write to a `.tmp` sibling, then rename into place.
//!
//! Every durable state write in this crate goes through here — signal file
//! transitions (§4.1), `status.json`/`version_info.json` (§6), and the Daily
//! Writer's output files (§4.6) all share this one primitive rather than
//! each hand-rolling their own temp-file dance.

use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Write `contents` to `path` atomically: write to `<path>.tmp`, fsync, then
/// rename over `path`. On most filesystems `rename` is atomic with respect
/// to concurrent readers, so a reader never observes a partially-written
/// file at `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
    let file = fs::File::open(&tmp_path)?;
    file.sync_all()
        .with_context(|| format!("fsync of {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// As [`write_atomic`], but for copying an existing file (used by the Stage
/// Mover, which copies rather than generates content in memory).
pub fn copy_atomic(source: &Path, dest: &Path) -> Result<u64> {
    let tmp_path = tmp_sibling(dest);
    let bytes = fs::copy(source, &tmp_path)
        .with_context(|| format!("copying {} to {}", source.display(), tmp_path.display()))?;
    fs::rename(&tmp_path, dest)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), dest.display()))?;
    Ok(bytes)
}

pub fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_leaves_no_tmp_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn copy_atomic_preserves_content() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("dest.bin");
        fs::write(&src, b"payload").unwrap();
        let n = copy_atomic(&src, &dest).unwrap();
        assert_eq!(n, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }
}

//! Stage Mover (C7, §4.7).
//!
//! Grounded on the producer/receiver daemon pair in
//! `examples/original_source/data-pipeline/clusters/conte/step-2/producer.py`
//! and `receiver.py`: both sides poll a source directory, copy through a
//! `.tmp` suffix, and gate on a destination file-count ceiling. Re-expressed
//! here as one shared module of primitives (`copy_verified`, `wait_stable`,
//! rate-limiting) plus thin `producer`/`receiver` drivers, rather than two
//! independently-duplicated scripts.

pub mod producer;
pub mod receiver;

use crate::error::TransferError;
use crate::util::{atomic_file, checksum};
use crate::Result;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Default cap on files the Stage Mover ever leaves in a consumer's input
/// directory before pausing (§4.7).
pub const MAX_INFLIGHT: usize = 31;
/// Producer poll cadence (§4.7 "ADDED" polling cadence note).
pub const PRODUCER_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Receiver poll cadence.
pub const RECEIVER_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Backoff applied when the destination is at `MAX_INFLIGHT`.
pub const DEST_FULL_WAIT: Duration = Duration::from_secs(30);
/// Receiver retry interval on a failed transfer.
pub const RECEIVER_RETRY_INTERVAL: Duration = Duration::from_secs(60);
/// Default stability window before the producer will transfer a file.
pub const PRODUCER_STABILITY_WINDOW: Duration = Duration::from_secs(3);
/// Default stability window before the receiver will transfer a file.
pub const RECEIVER_STABILITY_WINDOW: Duration = Duration::from_secs(5);
/// Maximum per-file transfer retries before emitting `transfer_failed`.
pub const MAX_RETRIES: u32 = 3;

/// Poll `path`'s size every 250ms until it stops changing for `window`, or
/// until `path` disappears (treated as "never stabilizes" — caller should
/// skip the file on the next pass).
pub fn wait_stable(path: &Path, window: Duration) -> bool {
    let poll = Duration::from_millis(250).min(window);
    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };
    let mut stable_since = Instant::now();
    loop {
        sleep(poll);
        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false,
        };
        if size != last_size {
            last_size = size;
            stable_since = Instant::now();
            continue;
        }
        if stable_since.elapsed() >= window {
            return true;
        }
    }
}

/// Count non-temp files directly under `dir` (the rate-limit denominator).
pub fn count_inflight(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(".tmp") {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Copy `source` into `dest_dir` atomically (temp suffix + rename),
/// verifying an MD5 checksum taken before the copy against one taken on the
/// destination afterward (§4.7). On mismatch the destination temp/final
/// files are removed and the source is left untouched.
pub fn copy_verified(source: &Path, dest_dir: &Path) -> Result<u64> {
    std::fs::create_dir_all(dest_dir)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("source path {} has no file name", source.display()))?;
    let dest = dest_dir.join(file_name);
    if dest.exists() {
        // Already transferred in a prior pass; nothing to do.
        return Ok(std::fs::metadata(&dest)?.len());
    }

    let source_sum = checksum::md5_file(source)?;
    let tmp = atomic_file::tmp_sibling(&dest);
    let _ = std::fs::remove_file(&tmp);
    let bytes = std::fs::copy(source, &tmp)?;
    let dest_sum = checksum::md5_file(&tmp)?;
    if dest_sum != source_sum {
        let _ = std::fs::remove_file(&tmp);
        return Err(TransferError::ChecksumMismatch {
            path: source.display().to_string(),
            source_sum,
            dest_sum,
        }
        .into());
    }
    std::fs::rename(&tmp, &dest).map_err(|e| TransferError::RenameFailed {
        path: dest.display().to_string(),
        source: e,
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_verified_matches_checksums() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.parquet");
        std::fs::write(&src, b"payload").unwrap();
        let dest_dir = dir.path().join("dest");
        let bytes = copy_verified(&src, &dest_dir).unwrap();
        assert_eq!(bytes, 7);
        assert_eq!(std::fs::read(dest_dir.join("a.parquet")).unwrap(), b"payload");
        assert!(!dest_dir.join("a.parquet.tmp").exists());
    }

    #[test]
    fn copy_verified_is_idempotent_when_dest_already_exists() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.parquet");
        std::fs::write(&src, b"payload").unwrap();
        let dest_dir = dir.path().join("dest");
        copy_verified(&src, &dest_dir).unwrap();
        let bytes = copy_verified(&src, &dest_dir).unwrap();
        assert_eq!(bytes, 7);
    }

    #[test]
    fn count_inflight_ignores_temp_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.parquet"), b"x").unwrap();
        std::fs::write(dir.path().join("b.parquet.tmp"), b"x").unwrap();
        assert_eq!(count_inflight(dir.path()).unwrap(), 1);
    }

    #[test]
    fn wait_stable_returns_false_for_missing_file() {
        let dir = tempdir().unwrap();
        assert!(!wait_stable(&dir.path().join("nope"), Duration::from_millis(10)));
    }

    #[test]
    fn wait_stable_detects_stable_file() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("a.bin");
        std::fs::write(&f, b"fixed").unwrap();
        assert!(wait_stable(&f, Duration::from_millis(10)));
    }
}

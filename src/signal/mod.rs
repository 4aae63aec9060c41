//! Signal Directory (C1, §4.1).
//!
//! A flat directory of zero-or-small files named `<key>.<status>`, used as a
//! coordination state machine between pipeline stages. Grounded on
//! `examples/original_source/.../utils/ready_signal_creator.py`'s
//! `JobStatus`/`ReadySignalManager`, re-expressed without an in-memory cache:
//! every query re-derives state from whatever is currently on disk, since the
//! directory itself is the single source of truth and may be mutated by a
//! sibling process (the producer/receiver stages run as separate workers).

use crate::error::StateError;
use crate::util::atomic_file;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The possible states a signal key can be in. Ordered here by the
/// precedence used when more than one status file exists for the same key
/// (SPEC_FULL.md §4.1): later variants win, except for the `Ready`/
/// `Processing` simultaneity rule handled explicitly in [`SignalDirectory::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Unknown,
    Ready,
    Processing,
    Complete,
    Failed,
    Transferred,
    TransferFailed,
}

impl Status {
    fn extension(self) -> &'static str {
        match self {
            Status::Unknown => "",
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Complete => "complete",
            Status::Failed => "failed",
            Status::Transferred => "transferred",
            Status::TransferFailed => "transfer_failed",
        }
    }

    fn from_extension(ext: &str) -> Option<Status> {
        Some(match ext {
            "ready" => Status::Ready,
            "processing" => Status::Processing,
            "complete" => Status::Complete,
            "failed" => Status::Failed,
            "transferred" => Status::Transferred,
            "transfer_failed" => Status::TransferFailed,
            _ => return None,
        })
    }
}

/// A signal directory rooted at `root`.
pub struct SignalDirectory {
    root: PathBuf,
}

impl SignalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating signal directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str, status: Status) -> PathBuf {
        self.root.join(format!("{key}.{}", status.extension()))
    }

    fn existing_statuses(&self, key: &str) -> Result<Vec<(Status, SystemTime)>> {
        let mut found = Vec::new();
        for status in [
            Status::Ready,
            Status::Processing,
            Status::Complete,
            Status::Failed,
            Status::Transferred,
            Status::TransferFailed,
        ] {
            let path = self.path_for(key, status);
            if let Ok(meta) = fs::metadata(&path) {
                found.push((status, meta.modified()?));
            }
        }
        Ok(found)
    }

    /// Resolve the current status for `key`. Simultaneous `ready` and
    /// `processing` collapse to `processing` (ready is defined stale in that
    /// case); otherwise the highest-precedence status present wins.
    pub fn status(&self, key: &str) -> Result<Status> {
        let found = self.existing_statuses(key)?;
        if found.is_empty() {
            return Ok(Status::Unknown);
        }
        let has_ready = found.iter().any(|(s, _)| *s == Status::Ready);
        let has_processing = found.iter().any(|(s, _)| *s == Status::Processing);
        if has_ready && has_processing {
            return Ok(Status::Processing);
        }
        Ok(found.into_iter().map(|(s, _)| s).max().unwrap())
    }

    fn write_status(&self, key: &str, status: Status, message: Option<&str>) -> Result<()> {
        let path = self.path_for(key, status);
        atomic_file::write_atomic(path.as_path(), message.unwrap_or("").as_bytes())
    }

    pub fn mark_ready(&self, key: &str) -> Result<()> {
        self.write_status(key, Status::Ready, None)
    }

    pub fn mark_processing(&self, key: &str) -> Result<()> {
        self.write_status(key, Status::Processing, None)
    }

    /// Transition to `complete`, removing any prior `ready`/`processing`
    /// signal for the same key (§4.1).
    pub fn mark_complete(&self, key: &str) -> Result<()> {
        self.write_status(key, Status::Complete, None)?;
        self.remove_if_present(key, Status::Ready)?;
        self.remove_if_present(key, Status::Processing)?;
        Ok(())
    }

    /// Transition to `failed`, message optional, clearing the same prior
    /// states as `markComplete` (mirrors the original `create_failed_signal`
    /// cleanup behavior).
    pub fn mark_failed(&self, key: &str, message: Option<&str>) -> Result<()> {
        self.write_status(key, Status::Failed, message)?;
        self.remove_if_present(key, Status::Ready)?;
        self.remove_if_present(key, Status::Processing)?;
        Ok(())
    }

    /// Terminal hand-off: the caller must have already durably verified the
    /// corresponding output was copied before calling this (§4.1).
    pub fn mark_transferred(&self, key: &str) -> Result<()> {
        self.write_status(key, Status::Transferred, None)
    }

    pub fn mark_transfer_failed(&self, key: &str, message: &str) -> Result<()> {
        self.write_status(key, Status::TransferFailed, Some(message))
    }

    /// Remove a specific status file for `key`, if present. Used by the
    /// Stage Mover to drop the `complete` signal once `markTransferred` has
    /// been durably recorded (§4.7).
    pub fn clear(&self, key: &str, status: Status) -> Result<()> {
        self.remove_if_present(key, status)
    }

    fn remove_if_present(&self, key: &str, status: Status) -> Result<()> {
        let path = self.path_for(key, status);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("removing stale signal {}", path.display()))?;
        }
        Ok(())
    }

    /// List every key currently in `status`.
    pub fn list_by_status(&self, status: Status) -> Result<Vec<String>> {
        let suffix = format!(".{}", status.extension());
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("reading signal directory {}", self.root.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(&suffix) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// `true` when `state_a`'s mtime is strictly newer than `state_b`'s.
    /// Used by the Stage Mover to detect a stale `transferred` signal
    /// (§4.7): `isStale(complete, transferred)`.
    pub fn is_stale(&self, key: &str, state_a: Status, state_b: Status) -> Result<bool> {
        let a = fs::metadata(self.path_for(key, state_a)).and_then(|m| m.modified());
        let b = fs::metadata(self.path_for(key, state_b)).and_then(|m| m.modified());
        match (a, b) {
            (Ok(a), Ok(b)) => Ok(a > b),
            _ => Ok(false),
        }
    }

    /// Validate the signal-monotonicity invariant (§8): for any key in
    /// `transferred`, mtime(transferred) >= mtime(complete) if a `complete`
    /// signal still exists (it is normally removed on transfer, but a
    /// contradiction here indicates stage-mover corruption).
    pub fn check_monotonic(&self, key: &str) -> Result<()> {
        let transferred = self.path_for(key, Status::Transferred);
        let complete = self.path_for(key, Status::Complete);
        if let (Ok(t), Ok(c)) = (
            fs::metadata(&transferred).and_then(|m| m.modified()),
            fs::metadata(&complete).and_then(|m| m.modified()),
        ) {
            if t < c {
                return Err(StateError {
                    key: key.to_string(),
                    reason: "transferred signal is older than a still-present complete signal"
                        .to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn unknown_key_has_unknown_status() {
        let dir = tempdir().unwrap();
        let sd = SignalDirectory::new(dir.path()).unwrap();
        assert_eq!(sd.status("2016-11").unwrap(), Status::Unknown);
    }

    #[test]
    fn ready_then_processing_resolves_to_processing() {
        let dir = tempdir().unwrap();
        let sd = SignalDirectory::new(dir.path()).unwrap();
        sd.mark_ready("2016-11").unwrap();
        sd.mark_processing("2016-11").unwrap();
        assert_eq!(sd.status("2016-11").unwrap(), Status::Processing);
    }

    #[test]
    fn mark_complete_clears_ready_and_processing() {
        let dir = tempdir().unwrap();
        let sd = SignalDirectory::new(dir.path()).unwrap();
        sd.mark_ready("2016-11").unwrap();
        sd.mark_processing("2016-11").unwrap();
        sd.mark_complete("2016-11").unwrap();
        assert_eq!(sd.status("2016-11").unwrap(), Status::Complete);
        assert!(!dir.path().join("2016-11.ready").exists());
        assert!(!dir.path().join("2016-11.processing").exists());
    }

    #[test]
    fn is_stale_detects_newer_complete() {
        let dir = tempdir().unwrap();
        let sd = SignalDirectory::new(dir.path()).unwrap();
        sd.mark_transferred("2016-11-03").unwrap();
        sleep(Duration::from_millis(20));
        sd.write_status("2016-11-03", Status::Complete, None)
            .unwrap();
        assert!(sd
            .is_stale("2016-11-03", Status::Complete, Status::Transferred)
            .unwrap());
    }

    #[test]
    fn list_by_status_finds_matching_keys() {
        let dir = tempdir().unwrap();
        let sd = SignalDirectory::new(dir.path()).unwrap();
        sd.mark_ready("2016-11").unwrap();
        sd.mark_ready("2016-12").unwrap();
        sd.mark_complete("2017-01").unwrap();
        let ready = sd.list_by_status(Status::Ready).unwrap();
        assert_eq!(ready, vec!["2016-11".to_string(), "2016-12".to_string()]);
    }
}

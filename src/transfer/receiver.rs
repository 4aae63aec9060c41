//! Receiver side of the Stage Mover: pulls files out of the producer's
//! destination directory, verifies them, and cleans up the now-redundant
//! inputs once the transfer is durably recorded.
//!
//! Grounded on `receiver.py`'s retry loop: up to [`super::MAX_RETRIES`]
//! attempts with a fixed retry interval, a stale-transfer check against the
//! `complete`/`transferred` signal pair, and removal of the source files
//! (and the `complete` signal) once the copy is verified.

use super::{copy_verified, wait_stable, RECEIVER_STABILITY_WINDOW};
use crate::signal::{SignalDirectory, Status};
use crate::Result;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one receiver pass over a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already transferred and not stale; nothing to do.
    AlreadyTransferred,
    /// Transferred this pass.
    Transferred,
    /// Exhausted retries; `transfer_failed` was emitted.
    Failed,
}

/// Process one key: detect a stale `transferred` signal (§4.7 — a
/// `complete` signal newer than `transferred` means the prior transfer must
/// be redone), then retry the copy up to [`super::MAX_RETRIES`] times with
/// [`super::RECEIVER_RETRY_INTERVAL`] backoff between attempts.
///
/// On success, removes `source_files` and the `complete` signal. On
/// exhaustion, emits `transfer_failed` and leaves the inputs untouched so
/// the next scheduled pass can retry.
pub fn process_key(
    key: &str,
    source_files: &[PathBuf],
    dest_dir: &Path,
    signals: &SignalDirectory,
    stability_window: Duration,
    retry_interval: Duration,
) -> Result<Outcome> {
    let already_transferred = signals.status(key)? == Status::Transferred;
    let stale = signals.is_stale(key, Status::Complete, Status::Transferred)?;
    if already_transferred && !stale {
        cleanup_inputs(source_files, key, signals)?;
        return Ok(Outcome::AlreadyTransferred);
    }
    if stale {
        warn!(key, "complete signal newer than transferred; re-transferring");
    }

    let mut last_err = None;
    for attempt in 1..=super::MAX_RETRIES {
        match try_transfer(source_files, dest_dir, stability_window) {
            Ok(()) => {
                signals.mark_transferred(key)?;
                signals.clear(key, Status::Complete)?;
                cleanup_inputs(source_files, key, signals)?;
                info!(key, attempt, "transfer verified");
                return Ok(Outcome::Transferred);
            }
            Err(e) => {
                last_err = Some(e.to_string());
                if attempt < super::MAX_RETRIES {
                    sleep(retry_interval);
                }
            }
        }
    }

    let reason = last_err.unwrap_or_else(|| "unknown failure".to_string());
    error!(key, reason, "transfer exhausted retries");
    signals.mark_transfer_failed(key, &reason)?;
    Ok(Outcome::Failed)
}

fn try_transfer(source_files: &[PathBuf], dest_dir: &Path, stability_window: Duration) -> Result<()> {
    for source in source_files {
        if !wait_stable(source, stability_window) {
            anyhow::bail!("file {} did not stabilize", source.display());
        }
        copy_verified(source, dest_dir)?;
    }
    Ok(())
}

/// Remove the now-redundant source files for `key` after a verified
/// transfer. Missing files are not an error — a prior partial cleanup may
/// have already removed them.
fn cleanup_inputs(source_files: &[PathBuf], key: &str, signals: &SignalDirectory) -> Result<()> {
    for f in source_files {
        if f.exists() {
            std::fs::remove_file(f)?;
        }
    }
    signals.clear(key, Status::Complete)?;
    Ok(())
}

/// Default stability window for the receiver side (§4.7).
pub fn default_stability_window() -> Duration {
    RECEIVER_STABILITY_WINDOW
}

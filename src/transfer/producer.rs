//! Producer side of the Stage Mover: moves finished outputs from a local
//! staging directory into the consumer-facing input directory, rate-limited
//! by [`super::MAX_INFLIGHT`].
//!
//! Grounded on `producer.py`'s main loop: re-check the destination file
//! count every pass, wait out `DEST_FULL_WAIT_SECONDS` when full, otherwise
//! walk source files and copy through a `.tmp` suffix.

use super::{copy_verified, count_inflight, wait_stable, MAX_INFLIGHT, PRODUCER_STABILITY_WINDOW};
use crate::signal::{SignalDirectory, Status};
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// One pass over `source_dir`: copies as many stable, checksummed files into
/// `dest_dir` as the `MAX_INFLIGHT` headroom allows, marking `key` as
/// `transferred` in `signals` once its file(s) are durably written and
/// clearing the matching `complete` signal (§4.7).
///
/// Returns the number of files copied this pass.
pub fn run_once(
    key: &str,
    source_files: &[PathBuf],
    dest_dir: &Path,
    signals: &SignalDirectory,
    stability_window: Duration,
) -> Result<usize> {
    let inflight = count_inflight(dest_dir)?;
    if inflight >= MAX_INFLIGHT {
        info!(inflight, limit = MAX_INFLIGHT, "destination full, skipping pass");
        return Ok(0);
    }
    let available_slots = MAX_INFLIGHT - inflight;

    let mut copied = 0usize;
    for source in source_files.iter().take(available_slots) {
        if !wait_stable(source, stability_window) {
            warn!(file = %source.display(), "file vanished before it stabilized, skipping");
            continue;
        }
        copy_verified(source, dest_dir)?;
        copied += 1;
    }

    if copied == source_files.len().min(available_slots) && !source_files.is_empty() {
        signals.mark_transferred(key)?;
        signals.clear(key, Status::Complete)?;
    }
    Ok(copied)
}

/// Default stability window for the producer side (§4.7).
pub fn default_stability_window() -> Duration {
    PRODUCER_STABILITY_WINDOW
}

//! Resource Governor (C10, §4.10).
//!
//! Grounded on the teacher's `src/util/resource.rs` (`/proc` parsing via
//! `ResourceSnapshot`/`ResourceTracker`), adapted here from process CPU/memory
//! accounting to filesystem-free-space accounting, since this component
//! gates folder processing on *disk* headroom, not process resource usage.

use std::path::Path;

/// Disk-space threshold below which the pipeline halts entirely (§4.10).
/// Not configurable down from this value even via `MIN_FREE_DISK_GB` — see
/// [`Thresholds::from_env`].
pub const HARD_DISK_FLOOR_GIB: f64 = 5.0;

const DEFAULT_DISK_WARNING_GIB: f64 = 20.0;
const DEFAULT_W_NET: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub disk_critical_gib: f64,
    pub disk_warning_gib: f64,
    pub max_memory_gib: Option<f64>,
    pub max_workers: Option<usize>,
    pub base_chunk_size: Option<usize>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_critical_gib: HARD_DISK_FLOOR_GIB,
            disk_warning_gib: DEFAULT_DISK_WARNING_GIB,
            max_memory_gib: None,
            max_workers: None,
            base_chunk_size: None,
        }
    }
}

impl Thresholds {
    /// Apply the environment variable overrides named in §6:
    /// `MAX_WORKERS`, `MIN_FREE_MEMORY_GB`, `MIN_FREE_DISK_GB`,
    /// `BASE_CHUNK_SIZE`, `MAX_MEMORY_GB`.
    pub fn from_env() -> Self {
        let mut t = Self::default();
        if let Some(v) = env_f64("MIN_FREE_DISK_GB") {
            // The critical floor never goes below the hardcoded safety
            // minimum: an operator cannot configure the pipeline into
            // deleting the last few GiB of disk (SPEC_FULL.md §4.10).
            t.disk_critical_gib = v.max(HARD_DISK_FLOOR_GIB);
        }
        if let Some(v) = env_f64("MIN_FREE_MEMORY_GB") {
            t.disk_warning_gib = v;
        }
        if let Some(v) = env_f64("MAX_MEMORY_GB") {
            t.max_memory_gib = Some(v);
        }
        if let Some(v) = std::env::var("MAX_WORKERS").ok().and_then(|s| s.parse().ok()) {
            t.max_workers = Some(v);
        }
        if let Some(v) = std::env::var("BASE_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            t.base_chunk_size = Some(v);
        }
        t
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Disk-space reading for a path. Falls back to `0.0` on error rather than
/// propagating, per §4.10 ("fall back to 0.0 on error") — a governor that
/// can't determine free space should behave as if there is none, which is
/// conservative (it halts rather than proceeding blind).
pub fn free_disk_gib(path: &Path) -> f64 {
    match fs2_free_space(path) {
        Some(bytes) => bytes as f64 / GIB,
        None => 0.0,
    }
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[cfg(unix)]
fn fs2_free_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    let c_path = CString::new(path.as_os_str().to_str()?).ok()?;
    unsafe {
        let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
        if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return None;
        }
        let stat = stat.assume_init();
        Some(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(not(unix))]
fn fs2_free_space(_path: &Path) -> Option<u64> {
    None
}

/// The outcome of checking disk space before processing a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskCheck {
    Ok,
    Warning,
    Critical,
}

pub fn check_disk(free_gib: f64, thresholds: &Thresholds) -> DiskCheck {
    if free_gib < thresholds.disk_critical_gib {
        DiskCheck::Critical
    } else if free_gib < thresholds.disk_warning_gib {
        DiskCheck::Warning
    } else {
        DiskCheck::Ok
    }
}

/// Default `W_net` (network worker pool size): `min(cpu, 8)`, or
/// `MAX_WORKERS` if the environment overrides it.
pub fn w_net(thresholds: &Thresholds) -> usize {
    thresholds
        .max_workers
        .unwrap_or_else(|| num_cpus::get().min(DEFAULT_W_NET))
}

/// Default `W_cpu` (CPU worker pool size): `min(cpu, 8)`, or `MAX_WORKERS`
/// if the environment overrides it.
pub fn w_cpu(thresholds: &Thresholds) -> usize {
    thresholds
        .max_workers
        .unwrap_or_else(|| num_cpus::get().min(DEFAULT_W_NET))
}

/// Chunk row-count tier selection from available memory (§4.5): 500k/250k/
/// 100k rows at >30/>15/else GiB, scaled proportionally if `BASE_CHUNK_SIZE`
/// overrides the top tier.
pub fn chunk_rows(available_memory_gib: f64, thresholds: &Thresholds) -> usize {
    let top = thresholds.base_chunk_size.unwrap_or(500_000);
    if available_memory_gib > 30.0 {
        top
    } else if available_memory_gib > 15.0 {
        top / 2
    } else {
        top / 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_disk_tiers() {
        let t = Thresholds::default();
        assert_eq!(check_disk(100.0, &t), DiskCheck::Ok);
        assert_eq!(check_disk(10.0, &t), DiskCheck::Warning);
        assert_eq!(check_disk(1.0, &t), DiskCheck::Critical);
    }

    #[test]
    fn chunk_rows_tiers_match_spec_defaults() {
        let t = Thresholds::default();
        assert_eq!(chunk_rows(40.0, &t), 500_000);
        assert_eq!(chunk_rows(20.0, &t), 250_000);
        assert_eq!(chunk_rows(5.0, &t), 100_000);
    }

    #[test]
    fn min_free_disk_env_cannot_go_below_hard_floor() {
        std::env::set_var("MIN_FREE_DISK_GB", "1.0");
        let t = Thresholds::from_env();
        assert_eq!(t.disk_critical_gib, HARD_DISK_FLOOR_GIB);
        std::env::remove_var("MIN_FREE_DISK_GB");
    }

    #[test]
    fn min_free_disk_env_can_raise_above_hard_floor() {
        std::env::set_var("MIN_FREE_DISK_GB", "50.0");
        let t = Thresholds::from_env();
        assert_eq!(t.disk_critical_gib, 50.0);
        std::env::remove_var("MIN_FREE_DISK_GB");
    }

    #[test]
    fn free_disk_gib_on_existing_dir_is_nonnegative() {
        let gib = free_disk_gib(Path::new("."));
        assert!(gib >= 0.0);
    }
}

//! Raw→Metric Transformers (C3, §4.3).
//!
//! Grounded on `examples/original_source/.../transformers/hpc_transformers.py`
//! (`BlockIOTransformer`/`CPUTransformer`/`MemoryTransformer`/
//! `NFSTransformer`), re-expressed as four small, independently-testable
//! pure functions over `Vec<RawRow>` rather than a class hierarchy — this
//! crate has no dataframe library, so each transformer groups/sorts/deltas
//! with plain `std` collections (matching the teacher's own preference for
//! hand-rolled aggregation over pulling in a dataframe crate, see
//! `src/stats/aggregator.rs`).

pub mod block;
pub mod cpu;
pub mod csv_reader;
pub mod mem;
pub mod nfs;

pub use csv_reader::{normalize_job_id_prefix, parse_timestamp, read_tolerant, RawRow};

pub const SECTOR_SIZE_BYTES: f64 = 512.0;
pub const BYTES_TO_GB: f64 = 1.0 / (1024.0 * 1024.0 * 1024.0);
pub const BYTES_TO_MB: f64 = 1.0 / (1024.0 * 1024.0);
pub const MIN_TIME_DELTA: f64 = 0.1;
pub const CPU_JIFFY_COLUMNS: [&str; 7] = ["user", "nice", "system", "idle", "iowait", "irq", "softirq"];

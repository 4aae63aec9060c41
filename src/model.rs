//! Shared data model types that flow between pipeline stages (§3).
//!
//! These are plain value types: a [`MetricRecord`] or [`AggregatedRow`] exists
//! only within a single pipeline run and is never shared between stages
//! except by being written to an [`OutputFile`] and read back. The one
//! exception is [`JobAccountingRecord`] tables, which are loaded once and
//! fanned out to worker threads as a read-only `Arc` snapshot.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// One raw-counter-derived observation in the unified long-form schema.
///
/// Invariant: `value >= 0.0`, and for `event == Event::CpuUser`,
/// `value <= 100.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub job_id: String,
    pub host: String,
    pub event: Event,
    pub value: f64,
    pub units: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// The metric kinds a transformer can emit. `Gpu` is never produced by any
/// transformer in this crate (see SPEC_FULL.md §9 open question decisions)
/// but is kept here so the aggregate stage's exhaustive match stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Block,
    CpuUser,
    MemUsed,
    MemUsedMinusDiskcache,
    Nfs,
    Gpu,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Block => "block",
            Event::CpuUser => "cpuuser",
            Event::MemUsed => "memused",
            Event::MemUsedMinusDiskcache => "memused_minus_diskcache",
            Event::Nfs => "nfs",
            Event::Gpu => "gpu",
        }
    }
}

/// One deduplicated job record from the batch-scheduler accounting log.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAccountingRecord {
    pub job_id: String,
    pub queue: Option<String>,
    pub account: Option<String>,
    pub user: Option<String>,
    pub jobname: Option<String>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub walltime_limit_seconds: Option<f64>,
    pub nhosts: Option<f64>,
    pub ncores: Option<f64>,
    pub exit_status: Option<i64>,
    pub exec_host_list: String,
}

/// A read-only, dedup'd-by-`job_id` lookup table, fanned out to every chunk
/// worker as a cheap `Arc` clone (see SPEC_FULL.md §5 shared-resource policy).
pub type JobsTable = HashMap<String, JobAccountingRecord>;

/// One row of the frozen, 22-column output schema (§6). Field order here
/// matches the frozen column order; [`crate::writer::schema`] is the single
/// place that order is allowed to matter for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub time: DateTime<Utc>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub timelimit: Option<f64>,
    pub nhosts: Option<f64>,
    pub ncores: Option<f64>,
    pub account: Option<String>,
    pub queue: Option<String>,
    pub host: String,
    pub jid: String,
    pub unit: &'static str,
    pub jobname: Option<String>,
    pub exitcode: String,
    pub host_list: Option<String>,
    pub username: Option<String>,
    pub value_cpuuser: Option<f64>,
    pub value_gpu: Option<f64>,
    pub value_memused: Option<f64>,
    pub value_memused_minus_diskcache: Option<f64>,
    pub value_nfs: Option<f64>,
    pub value_block: Option<f64>,
}

/// One monthly input batch as discovered/downloaded by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderBatch {
    pub name: String,
    pub source_url: String,
    pub required_files: Vec<String>,
    pub accounting_path: Option<String>,
}

/// One finished output artifact, as produced by the Daily Writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub dataset_name: String,
    pub version: String,
    pub day_key: String,
    pub part_index: Option<u32>,
    pub byte_size: u64,
    pub checksum: String,
    pub path: PathBuf,
}

/// One entry in the catalog index (§6, `archives/index.json`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArchiveEntry {
    pub period: String,
    pub path: String,
    pub size: u64,
    pub checksum: String,
    pub start: String,
    pub end: String,
    pub object_count: u64,
}

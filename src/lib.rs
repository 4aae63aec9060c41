//! Crucible ETL - HPC cluster telemetry ETL pipeline
//!
//! Converts raw HPC cluster telemetry (per-core CPU jiffy counters, per-device
//! block I/O sector counters, memory gauges, NFS byte counters) and
//! batch-scheduler accounting records into a uniform, time-bucketed,
//! per-job/per-host performance dataset.
//!
//! # Architecture
//!
//! The pipeline is driven by [`orchestrator::Orchestrator`], which wires
//! together the other modules in dataflow order:
//!
//! `fetch` (discover + download a monthly folder) → `transform` (raw counters
//! to long-form metric records) → `accounting` (load the period's job table)
//! → `aggregate` (chunked join + one-minute bucketing) → `writer` (day
//! partitions, validated and atomic) → `transfer` (stage hand-off with
//! integrity checks) → `catalog` (archive index).
//!
//! `signal` coordinates hand-offs between stages on disk; `governor` gates
//! work on available disk/memory; `config` and `error` are the ambient
//! configuration and error-handling layers shared by every other module.
//!
//! Every worker pool in this crate is a set of blocking OS threads
//! coordinated by bounded `crossbeam-channel` queues (see
//! [`util::worker_pool`]); there is no async runtime anywhere in this crate.

pub mod accounting;
pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod governor;
pub mod model;
pub mod orchestrator;
pub mod signal;
pub mod store;
pub mod transfer;
pub mod transform;
pub mod util;
pub mod writer;

pub use config::Config;

/// The crate-wide result alias: every fallible public function returns this,
/// with `?` folding the per-kind errors in [`error`] into `anyhow::Error`.
pub type Result<T> = anyhow::Result<T>;

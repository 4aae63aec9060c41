//! Error taxonomy for the pipeline.
//!
//! Each variant here corresponds to one of the error *kinds* named in the
//! design spec, not to a single type per call site. Call sites construct the
//! appropriate variant and let `?` fold it into `anyhow::Error`; the
//! orchestrator matches on kind where it needs to decide continue-vs-halt.

use thiserror::Error;

/// Configuration is malformed or references an unknown enum value. Fatal at
/// startup — the process should not proceed past `Config::validate`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("unknown value `{value}` for field `{field}`")]
    UnknownEnumValue { field: String, value: String },
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

/// Folder-fatal: the HTTP index was unreachable, or a required file could not
/// be fetched after retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not reach index at {url}: {source}")]
    IndexUnreachable {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("required file `{file}` missing from folder `{folder}` after {attempts} attempts")]
    MissingFile {
        folder: String,
        file: String,
        attempts: u32,
    },
    #[error("accounting file unreadable for folder `{folder}`: {reason}")]
    AccountingUnreadable { folder: String, reason: String },
}

/// Folder-fatal: a required input column is absent or entirely null.
#[derive(Debug, Error)]
#[error("schema error in `{file}`: {reason}")]
pub struct SchemaError {
    pub file: String,
    pub reason: String,
}

/// Non-fatal: a single transformer produced no rows. The caller skips that
/// metric and continues with the rest.
#[derive(Debug, Error)]
#[error("transformer `{transformer}` produced no rows for `{file}`")]
pub struct TransformError {
    pub transformer: String,
    pub file: String,
}

/// Folder-fatal: the join against the accounting table produced no rows.
#[derive(Debug, Error)]
#[error("join produced no rows for folder `{folder}`")]
pub struct JoinError {
    pub folder: String,
}

/// Folder-fatal: writer validation failed after all configured retries.
#[derive(Debug, Error)]
#[error("write validation failed for `{path}` after {attempts} attempts: {reason}")]
pub struct WriteError {
    pub path: String,
    pub attempts: u32,
    pub reason: String,
}

/// File-fatal with retries: checksum mismatch or destination rename failure.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("checksum mismatch transferring `{path}`: source={source_sum} dest={dest_sum}")]
    ChecksumMismatch {
        path: String,
        source_sum: String,
        dest_sum: String,
    },
    #[error("rename failed for `{path}`: {source}")]
    RenameFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Contradictory signal files observed (e.g. `complete` newer than
/// `transferred`). Recovered automatically by re-transfer; this variant
/// exists so the recovery path can still be logged with structure.
#[derive(Debug, Error)]
#[error("contradictory signal state for key `{key}`: {reason}")]
pub struct StateError {
    pub key: String,
    pub reason: String,
}

/// Pipeline-pause, resumable: disk or memory crossed the critical threshold.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("free disk {free_gib:.2} GiB below critical threshold {threshold_gib:.2} GiB")]
    DiskCritical { free_gib: f64, threshold_gib: f64 },
    #[error("free memory {free_gib:.2} GiB below critical threshold {threshold_gib:.2} GiB")]
    MemoryCritical { free_gib: f64, threshold_gib: f64 },
}

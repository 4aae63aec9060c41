//! Orchestrator (C9, §4.9).
//!
//! Grounded on `examples/original_source/.../core/pipeline.py`'s `Pipeline`
//! (extractor registry keyed by `source.type`, the per-file transformer
//! lookup keyed by filename substring, `process_folder`/`run`) and on
//! `watchers/file_watcher.py` for watch mode's stability-wait-then-retry
//! shape (`wait_delay_seconds`, `max_move_attempts`, `retry_delay_seconds`).

pub mod state;

use crate::accounting;
use crate::aggregate;
use crate::catalog::{self, CatalogSource};
use crate::config::Config;
use crate::governor::{self, Thresholds};
use crate::model::{AggregatedRow, MetricRecord};
use crate::signal::SignalDirectory;
use crate::store::LocalObjectStore;
use crate::transfer::producer;
use crate::transform::{self, RawRow};
use crate::util::worker_pool;
use crate::writer::ColumnarSink;
use crate::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use tracing::{error, info, warn};

/// Which extractor feeds the orchestrator (§4.9/§6 `source.type`, minus
/// `globus` — out of scope per SPEC_FULL.md §1, interface-level only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    RemoteHttp,
    LocalFs,
    SingleFile,
}

/// The four processing modes named in §4.9.
#[derive(Debug, Clone)]
pub enum Mode {
    OneShot,
    SingleFile(PathBuf),
    Directory(PathBuf),
    Watch { source_dir: PathBuf },
}

/// Default wait before processing a newly-seen file in watch mode, and the
/// retry count/backoff applied to a failed processing attempt (grounded on
/// `file_watcher.py`'s `wait_delay_seconds=10`, `max_move_attempts=3`,
/// `retry_delay_seconds=3`).
pub const WATCH_STABILITY_DELAY: Duration = Duration::from_secs(10);
pub const WATCH_MAX_ATTEMPTS: u32 = 3;
pub const WATCH_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Per-folder processing outcome, used by the caller to decide the
/// process's exit code (§6: 0 on >=1 processed, 1 on failure/none, 130 on
/// interrupt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Skipped,
    Failed,
}

/// Requires: each of `block.csv`, `cpu.csv`, `mem.csv`, `llite.csv` (when
/// present in `local_dir`) is run through its matching transformer, per the
/// `HPC_TRANSFORMER_REGISTRY` filename-substring lookup in the original
/// pipeline. A transformer whose file is simply absent is skipped, not an
/// error — not every folder carries every metric.
const TRANSFORMER_FILES: &[(&str, fn(&[RawRow], &str) -> Result<Vec<MetricRecord>>)] = &[
    ("block.csv", transform::block::transform),
    ("cpu.csv", transform::cpu::transform),
    ("mem.csv", transform::mem::transform),
    ("llite.csv", transform::nfs::transform),
];

pub struct Orchestrator {
    pub config: Config,
    pub thresholds: Thresholds,
    pub signals: SignalDirectory,
    pub status_path: PathBuf,
    pub version_path: PathBuf,
    /// Consumer-facing staging directory the Stage Mover (C7) copies
    /// finished day partitions into once a day's signal is `complete`.
    pub transfer_dir: PathBuf,
    /// Catalog Builder (C8) destination for archives and `archives/index.json`.
    pub catalog_store: LocalObjectStore,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        signal_root: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        transfer_dir: impl Into<PathBuf>,
        catalog_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let transfer_dir = transfer_dir.into();
        std::fs::create_dir_all(&transfer_dir)?;
        Ok(Self {
            thresholds: Thresholds::from_env(),
            signals: SignalDirectory::new(signal_root)?,
            status_path: state_dir.join("status.json"),
            version_path: state_dir.join("version_info.json"),
            transfer_dir,
            catalog_store: LocalObjectStore::new(catalog_dir),
            config,
        })
    }

    /// Run every required transformer against the files present in
    /// `local_dir`, load accounting, join/aggregate, and write day
    /// partitions via `sink`. `folder_name` is both the status-tracking key
    /// and the accounting-file lookup key.
    pub fn process_folder(
        &self,
        folder_name: &str,
        local_dir: &Path,
        accounting_path: &Path,
        sink: &dyn ColumnarSink,
        dataset_name: &str,
        version: &str,
    ) -> Result<Outcome> {
        let mut status = state::Status::load(&self.status_path)?;
        if status.is_processed(folder_name) {
            info!(folder = folder_name, "already processed, skipping");
            return Ok(Outcome::Skipped);
        }

        self.signals.mark_processing(folder_name)?;
        match self.process_folder_inner(folder_name, local_dir, accounting_path, sink, dataset_name, version) {
            Ok(rows_written) => {
                self.signals.mark_complete(folder_name)?;
                status.record_success(folder_name, &now_iso8601());
                status.save(&self.status_path)?;
                let mut versions = state::VersionInfo::load(&self.version_path)?;
                versions.bump(folder_name);
                versions.save(&self.version_path)?;
                info!(folder = folder_name, rows_written, "folder processed");
                Ok(Outcome::Processed)
            }
            Err(e) => {
                error!(folder = folder_name, error = %e, "folder processing failed");
                self.signals.mark_failed(folder_name, Some(&e.to_string()))?;
                status.record_failure(folder_name, &now_iso8601());
                status.save(&self.status_path)?;
                Ok(Outcome::Failed)
            }
        }
    }

    fn process_folder_inner(
        &self,
        folder_name: &str,
        local_dir: &Path,
        accounting_path: &Path,
        sink: &dyn ColumnarSink,
        dataset_name: &str,
        version: &str,
    ) -> Result<usize> {
        let mut records: Vec<MetricRecord> = Vec::new();
        for (file_suffix, transform_fn) in TRANSFORMER_FILES {
            let candidate = find_matching_file(local_dir, file_suffix);
            let Some(path) = candidate else { continue };
            let rows = transform::read_tolerant(&path)?;
            // A transformer only ever returns `Err` for a missing/invalid
            // required column (`SchemaError`, §4.3) — that is folder-fatal
            // (§7), not a skip. "No valid rows" is `Ok(vec![])`, not `Err`.
            let mut metric_records = transform_fn(&rows, &path.display().to_string())?;
            records.append(&mut metric_records);
        }

        let jobs = accounting::load(accounting_path, folder_name)?;
        let by_day: BTreeMap<String, Vec<AggregatedRow>> = aggregate::run(
            records,
            std::sync::Arc::new(jobs),
            &self.thresholds,
            self.config.processing.memory_limit_gb,
            governor::w_cpu(&self.thresholds),
            folder_name,
        )?;

        let mut total_rows = 0usize;
        let mut catalog_sources = Vec::new();
        let stability_window = producer::default_stability_window();
        for (day_key, rows) in by_day {
            total_rows += rows.len();
            let outputs = sink.write_day(dataset_name, version, &day_key, &rows)?;
            if outputs.is_empty() {
                continue;
            }

            // C6 has durably written this day; hand it to the Stage Mover
            // (C7) keyed by its own day_key signal, distinct from this
            // folder's monthly `folder_name` signal above (§4.1/§4.7).
            self.signals.mark_complete(&day_key)?;
            let source_files: Vec<PathBuf> = outputs.iter().map(|o| o.path.clone()).collect();
            producer::run_once(&day_key, &source_files, &self.transfer_dir, &self.signals, stability_window)?;

            for output in &outputs {
                let file_name = output
                    .path
                    .file_name()
                    .ok_or_else(|| anyhow::anyhow!("output path {} has no file name", output.path.display()))?;
                catalog_sources.push(CatalogSource {
                    path: self.transfer_dir.join(file_name),
                    day_key: day_key.clone(),
                    byte_size: output.byte_size,
                });
            }
        }

        // C8 indexes whatever this folder just transferred (§4.8). A
        // quarter archive built here only covers the days from this one
        // folder — see DESIGN.md for why cross-folder quarter accumulation
        // is out of scope for this call site.
        if !catalog_sources.is_empty() {
            catalog::run(&catalog_sources, &self.catalog_store, catalog::DEFAULT_MAX_WORKING_DIR_GIB)?;
        }
        Ok(total_rows)
    }

    /// Watch mode: consume `paths`, a receiver fed by a filesystem watcher
    /// (see [`crate::orchestrator::watch_directory`]), waiting
    /// [`WATCH_STABILITY_DELAY`] before each attempt and retrying up to
    /// [`WATCH_MAX_ATTEMPTS`] times with [`WATCH_RETRY_DELAY`] backoff
    /// (grounded on `file_watcher.py`'s `PipelineFileHandler`).
    pub fn process_with_retry<F>(&self, path: &Path, stability_delay: Duration, retry_delay: Duration, mut attempt_fn: F) -> Outcome
    where
        F: FnMut(&Path) -> Result<Outcome>,
    {
        std::thread::sleep(stability_delay);
        for attempt in 1..=WATCH_MAX_ATTEMPTS {
            match attempt_fn(path) {
                Ok(outcome) => return outcome,
                Err(e) => {
                    warn!(file = %path.display(), attempt, error = %e, "processing attempt failed");
                    if attempt < WATCH_MAX_ATTEMPTS {
                        std::thread::sleep(retry_delay);
                    }
                }
            }
        }
        Outcome::Failed
    }
}

fn find_matching_file(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.to_lowercase().contains(suffix) {
            return Some(entry.path());
        }
    }
    None
}

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Watch a directory for new files, enqueuing at most one processing task
/// per path (§4.9). A single worker thread drains the channel so
/// `Orchestrator::process_with_retry` never runs two attempts for the same
/// watch session concurrently; this mirrors the original `FileWatcher`'s
/// single-observer-thread model rather than fanning out per-event.
pub fn watch_directory<F>(source_dir: &Path, cancel: worker_pool::CancelToken, mut on_path: F) -> Result<()>
where
    F: FnMut(&Path),
{
    use notify::{RecursiveMode, Watcher};

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(source_dir, RecursiveMode::NonRecursive)?;

    let mut seen = std::collections::HashSet::new();
    while !cancel.is_cancelled() {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => {
                if matches!(event.kind, notify::EventKind::Create(_)) {
                    for path in event.paths {
                        if seen.insert(path.clone()) {
                            on_path(&path);
                        }
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, OutputConfig, OutputFormat, ProcessingConfig, SourceConfig, SourceType, TransformationConfig, ValidationConfig};
    use crate::model::OutputFile;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn minimal_config() -> Config {
        Config {
            dataset: DatasetConfig {
                name: "crucible".to_string(),
                dataset_type: "timeseries".to_string(),
                version: "v1".to_string(),
            },
            source: SourceConfig {
                source_type: SourceType::LocalFs,
                base_url: None,
                base_path: Some(PathBuf::from(".")),
                endpoint_id: None,
                folder_pattern: r"^\d{4}-\d{2}/?$".to_string(),
                file_patterns: vec!["block.csv".to_string()],
            },
            processing: ProcessingConfig::default(),
            output: OutputConfig {
                format: OutputFormat::Parquet,
                compression: "snappy".to_string(),
                chunking: Default::default(),
                path_template: "{dataset_name}/{timestamp}.{format}".to_string(),
            },
            transformations: Vec::<TransformationConfig>::new(),
            validation: ValidationConfig::default(),
        }
    }

    struct RecordingSink {
        written: Mutex<Vec<(String, usize)>>,
    }

    impl ColumnarSink for RecordingSink {
        fn write_day(&self, _dataset_name: &str, _version: &str, day_key: &str, rows: &[AggregatedRow]) -> Result<Vec<OutputFile>> {
            self.written.lock().unwrap().push((day_key.to_string(), rows.len()));
            Ok(Vec::new())
        }
    }

    #[test]
    fn repeat_processing_of_same_folder_is_skipped() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            minimal_config(),
            dir.path().join("signals"),
            dir.path().join("state"),
            dir.path().join("transfer"),
            dir.path().join("catalog"),
        )
        .unwrap();

        let mut status = state::Status::default();
        status.record_success("2016-11", "2016-01-01T00:00:00Z");
        status.save(&orchestrator.status_path).unwrap();

        let sink = RecordingSink { written: Mutex::new(Vec::new()) };
        let outcome = orchestrator
            .process_folder(
                "2016-11",
                dir.path(),
                &dir.path().join("missing.csv"),
                &sink,
                "crucible",
                "v1",
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped);
    }

    #[test]
    fn missing_accounting_file_marks_folder_failed() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            minimal_config(),
            dir.path().join("signals"),
            dir.path().join("state"),
            dir.path().join("transfer"),
            dir.path().join("catalog"),
        )
        .unwrap();
        let sink = RecordingSink { written: Mutex::new(Vec::new()) };

        let outcome = orchestrator
            .process_folder(
                "2016-12",
                dir.path(),
                &dir.path().join("nope.csv"),
                &sink,
                "crucible",
                "v1",
            )
            .unwrap();

        assert_eq!(outcome, Outcome::Failed);
        let status = state::Status::load(&orchestrator.status_path).unwrap();
        assert!(status.failed_folders.contains(&"2016-12".to_string()));
    }

    #[test]
    fn process_with_retry_gives_up_after_max_attempts() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            minimal_config(),
            dir.path().join("signals"),
            dir.path().join("state"),
            dir.path().join("transfer"),
            dir.path().join("catalog"),
        )
        .unwrap();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let outcome = orchestrator.process_with_retry(
            Path::new("/tmp/whatever"),
            Duration::from_millis(1),
            Duration::from_millis(1),
            |_p| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                anyhow::bail!("always fails")
            },
        );
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), WATCH_MAX_ATTEMPTS);
    }
}

//! `crucible-etl` CLI entry point (§6).

use crucible_etl::config::cli::Cli;
use crucible_etl::config::validator::validate_config;
use crucible_etl::config::{Config, SourceType};
use crucible_etl::fetch::{discover_folders, fetch_folder};
use crucible_etl::governor;
use crucible_etl::orchestrator::{self, Orchestrator, Outcome};
use crucible_etl::util::worker_pool::CancelToken;
use crucible_etl::writer::ParquetSink;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    if let Err(e) = cli.validate() {
        eprintln!("invalid arguments: {e}");
        return ExitCode::from(1);
    }
    init_logging(&cli);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        // ctrlc registers one process-wide handler; a second call to run()
        // within the same process (e.g. in tests) would error, which is why
        // this is confined to the binary entry point rather than
        // `Orchestrator` itself.
        let _ = ctrlc::set_handler(move || cancel.cancel());
    }

    match run(&cli, cancel.clone()) {
        Ok(processed) if cancel.is_cancelled() => {
            tracing::warn!(processed, "interrupted");
            ExitCode::from(130)
        }
        Ok(processed) if processed > 0 => ExitCode::from(0),
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            ExitCode::from(1)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::new(cli.log_level.as_tracing_filter());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match &cli.log_file {
        Some(path) => {
            if let Ok(file) = std::fs::File::create(path) {
                subscriber.with_writer(move || file.try_clone().expect("clone log file handle")).init();
                return;
            }
        }
        None => {}
    }
    subscriber.init();
}

/// Returns the number of folders/files successfully processed.
fn run(cli: &Cli, cancel: CancelToken) -> crucible_etl::Result<usize> {
    let config = Config::from_file(&cli.config)?;
    validate_config(&config)?;

    let state_dir = config.processing.temp_directory.join("state");
    let signal_dir = config.processing.temp_directory.join("signals");
    let output_dir = config.processing.temp_directory.join("output");
    let transfer_dir = config.processing.temp_directory.join("transfer");
    let catalog_dir = config.processing.temp_directory.join("catalog");
    let orchestrator = Orchestrator::new(config.clone(), signal_dir, state_dir, transfer_dir, catalog_dir)?;
    let sink = ParquetSink::new(output_dir);

    if let Some(file) = &cli.file {
        return run_single_file(&orchestrator, &sink, &config, file);
    }
    if let Some(folder) = &cli.folder {
        return run_directory(&orchestrator, &sink, &config, folder);
    }
    if cli.watch {
        let source_dir = cli.source_dir.clone().expect("validated by Cli::validate");
        return run_watch(&orchestrator, &sink, &config, &source_dir, cancel);
    }
    run_one_shot(&orchestrator, &sink, &config, cancel)
}

/// Single-file mode: process exactly one metric file against the
/// accounting CSV conventionally alongside it (`accounting.csv` in the same
/// directory) — this crate's join-based aggregation has no meaning without
/// an accounting table, so single-file mode still needs one (Open Question
/// resolution, see DESIGN.md).
fn run_single_file(
    orchestrator: &Orchestrator,
    sink: &ParquetSink,
    config: &Config,
    file: &Path,
) -> crucible_etl::Result<usize> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let folder_name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "single-file".to_string());
    let accounting_path = dir.join("accounting.csv");
    let outcome = orchestrator.process_folder(
        &folder_name,
        dir,
        &accounting_path,
        sink,
        &config.dataset.name,
        &config.dataset.version,
    )?;
    Ok(if outcome == Outcome::Processed { 1 } else { 0 })
}

/// Directory mode: process every matching file in one folder as a single
/// logical batch (§4.9).
fn run_directory(
    orchestrator: &Orchestrator,
    sink: &ParquetSink,
    config: &Config,
    folder: &Path,
) -> crucible_etl::Result<usize> {
    let folder_name = folder.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "folder".to_string());
    let accounting_path = folder.join("accounting.csv");
    let outcome = orchestrator.process_folder(
        &folder_name,
        folder,
        &accounting_path,
        sink,
        &config.dataset.name,
        &config.dataset.version,
    )?;
    Ok(if outcome == Outcome::Processed { 1 } else { 0 })
}

/// Watch mode: subscribe to `source_dir` and process each new file's
/// containing folder after the stability delay, with retries (§4.9,
/// grounded on `file_watcher.py`).
fn run_watch(
    orchestrator: &Orchestrator,
    sink: &ParquetSink,
    config: &Config,
    source_dir: &Path,
    cancel: CancelToken,
) -> crucible_etl::Result<usize> {
    let processed = std::sync::atomic::AtomicUsize::new(0);
    orchestrator::watch_directory(source_dir, cancel, |path| {
        let dir = path.parent().unwrap_or(source_dir).to_path_buf();
        let outcome = orchestrator.process_with_retry(
            &dir,
            orchestrator::WATCH_STABILITY_DELAY,
            orchestrator::WATCH_RETRY_DELAY,
            |dir| {
                let folder_name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "watch".to_string());
                let accounting_path = dir.join("accounting.csv");
                orchestrator.process_folder(&folder_name, dir, &accounting_path, sink, &config.dataset.name, &config.dataset.version)
            },
        );
        if outcome == Outcome::Processed {
            processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    })?;
    Ok(processed.load(std::sync::atomic::Ordering::SeqCst))
}

/// One-shot mode: discover every candidate folder from the configured
/// source, fetch each one not already in `status.json`, and process it
/// (§4.9).
fn run_one_shot(
    orchestrator: &Orchestrator,
    sink: &ParquetSink,
    config: &Config,
    cancel: CancelToken,
) -> crucible_etl::Result<usize> {
    let thresholds = governor::Thresholds::from_env();
    let mut processed = 0usize;

    match config.source.source_type {
        SourceType::RemoteHttp => {
            let base_url = config
                .source
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("source.base_url required for remote_http"))?;
            let client = reqwest::blocking::Client::new();
            let index_html = crucible_etl::fetch::discovery::fetch_index(&client, base_url)?;
            let folders = discover_folders(&index_html, &config.source.folder_pattern)?;

            for folder_name in folders {
                if cancel.is_cancelled() {
                    break;
                }
                let dest_dir = config.processing.temp_directory.join(&folder_name);
                let mut required = config.source.file_patterns.clone();
                required.push("accounting.csv".to_string());
                if let Err(e) = fetch_folder(&client, base_url, &folder_name, &required, &dest_dir, governor::w_net(&thresholds)) {
                    tracing::error!(folder = %folder_name, error = %e, "fetch failed, skipping folder");
                    continue;
                }
                let accounting_path = dest_dir.join("accounting.csv");
                let result = orchestrator.process_folder(
                    &folder_name,
                    &dest_dir,
                    &accounting_path,
                    sink,
                    &config.dataset.name,
                    &config.dataset.version,
                )?;
                if result == Outcome::Processed {
                    processed += 1;
                }
            }
        }
        SourceType::LocalFs => {
            let base_path = config
                .source
                .base_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.base_path required for local_fs"))?;
            processed += run_local_fs_one_shot(orchestrator, sink, config, &base_path, &cancel)?;
        }
        SourceType::Globus => {
            anyhow::bail!("globus source is interface-level only in this crate (SPEC_FULL.md §1 scope note)");
        }
    }

    Ok(processed)
}

fn run_local_fs_one_shot(
    orchestrator: &Orchestrator,
    sink: &ParquetSink,
    config: &Config,
    base_path: &Path,
    cancel: &CancelToken,
) -> crucible_etl::Result<usize> {
    let pattern = regex::Regex::new(&config.source.folder_pattern)?;
    let mut processed = 0usize;
    let Ok(entries) = std::fs::read_dir(base_path) else {
        return Ok(0);
    };
    let mut folders: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| p.file_name().map(|n| pattern.is_match(&n.to_string_lossy())).unwrap_or(false))
        .collect();
    folders.sort();

    for folder in folders {
        if cancel.is_cancelled() {
            break;
        }
        let folder_name = folder.file_name().unwrap().to_string_lossy().into_owned();
        let accounting_path = folder.join("accounting.csv");
        let outcome = orchestrator.process_folder(&folder_name, &folder, &accounting_path, sink, &config.dataset.name, &config.dataset.version)?;
        if outcome == Outcome::Processed {
            processed += 1;
        }
    }
    Ok(processed)
}

//! CLI surface for the orchestrator (§6), grounded on the teacher's
//! `clap`-derive usage in its own `config/cli.rs`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// `crucible-etl` — HPC cluster telemetry ETL pipeline.
#[derive(Debug, Parser)]
#[command(name = "crucible-etl", version, about)]
pub struct Cli {
    /// Path to the pipeline configuration TOML file.
    #[arg(long, env = "CRUCIBLE_CONFIG")]
    pub config: PathBuf,

    /// Process a single file and exit.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Process every matching file in a folder and exit.
    #[arg(long)]
    pub folder: Option<PathBuf>,

    /// Run in watch mode, processing new files as they stabilize.
    #[arg(long)]
    pub watch: bool,

    /// Directory to watch (required with `--watch`).
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Restrict the extractor to a specific named source.
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Cross-field validation that `clap`'s declarative attributes can't
    /// express: `--watch` requires `--source-dir`, and exactly one mode
    /// (file/folder/watch/one-shot) should be selected.
    pub fn validate(&self) -> crate::Result<()> {
        if self.watch && self.source_dir.is_none() {
            anyhow::bail!("--watch requires --source-dir");
        }
        if self.file.is_some() && self.folder.is_some() {
            anyhow::bail!("--file and --folder are mutually exclusive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_without_source_dir_fails_validation() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            file: None,
            folder: None,
            watch: true,
            source_dir: None,
            source: None,
            log_level: LogLevel::Info,
            log_file: None,
        };
        assert!(cli.validate().is_err());
    }

    #[test]
    fn file_and_folder_together_fails_validation() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            file: Some(PathBuf::from("a.csv")),
            folder: Some(PathBuf::from("dir")),
            watch: false,
            source_dir: None,
            source: None,
            log_level: LogLevel::Info,
            log_file: None,
        };
        assert!(cli.validate().is_err());
    }
}

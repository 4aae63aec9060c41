//! Declarative pipeline configuration (§6).
//!
//! Mirrors the teacher's config layer shape: a typed `serde`-deserializable
//! tree loaded from TOML, overlaid with CLI flags, and checked by a single
//! `validate()` pass before the orchestrator starts.

pub mod cli;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub dataset_type: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    RemoteHttp,
    LocalFs,
    Globus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub base_url: Option<String>,
    pub base_path: Option<PathBuf>,
    pub endpoint_id: Option<String>,
    #[serde(default = "default_folder_pattern")]
    pub folder_pattern: String,
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,
}

fn default_folder_pattern() -> String {
    r"^\d{4}-\d{2}/?$".to_string()
}

fn default_file_patterns() -> Vec<String> {
    vec![
        "block.csv".to_string(),
        "cpu.csv".to_string(),
        "mem.csv".to_string(),
        "llite.csv".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_memory_limit_gb")]
    pub memory_limit_gb: f64,
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,
}

fn default_max_workers() -> usize {
    num_cpus::get().min(8)
}
fn default_batch_size() -> usize {
    500_000
}
fn default_memory_limit_gb() -> f64 {
    0.0
}
fn default_temp_directory() -> PathBuf {
    std::env::temp_dir().join("crucible-etl")
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            memory_limit_gb: default_memory_limit_gb(),
            temp_directory: default_temp_directory(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Parquet,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: f64,
    #[serde(default = "default_min_rows_per_chunk")]
    pub min_rows_per_chunk: usize,
}

fn default_max_size_gb() -> f64 {
    2.0
}
fn default_min_rows_per_chunk() -> usize {
    500_000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_gb: default_max_size_gb(),
            min_rows_per_chunk: default_min_rows_per_chunk(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default = "default_path_template")]
    pub path_template: String,
}

fn default_compression() -> String {
    "snappy".to_string()
}
fn default_path_template() -> String {
    "{dataset_name}/{version}/{timestamp}.{format}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformationConfig {
    SuffixTransform { suffix: String },
    JobIdNormalization,
    StandardizeColumns { mapping: std::collections::HashMap<String, String> },
    AddUnitColumn { unit: String },
    NormalizeTimestamps { format: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
    #[serde(default = "default_max_file_size_gb")]
    pub max_file_size_gb: f64,
}

fn default_min_rows() -> usize {
    1
}
fn default_max_file_size_gb() -> f64 {
    10.0
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_rows: default_min_rows(),
            max_file_size_gb: default_max_file_size_gb(),
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

//! Configuration validation (§7 `ConfigurationError` — fatal at startup).
//!
//! Grounded on the teacher's `config/validator.rs` convention of a single
//! `validate_config` entry point returning a descriptive error rather than
//! panicking deep inside construction.

use super::{Config, SourceType};
use crate::error::ConfigError;
use crate::Result;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.dataset.name.trim().is_empty() {
        return Err(ConfigError::MissingField("dataset.name".to_string()).into());
    }
    if config.dataset.version.trim().is_empty() {
        return Err(ConfigError::MissingField("dataset.version".to_string()).into());
    }

    match config.source.source_type {
        SourceType::RemoteHttp if config.source.base_url.is_none() => {
            return Err(ConfigError::Invalid {
                field: "source.base_url".to_string(),
                reason: "required when source.type = remote_http".to_string(),
            }
            .into());
        }
        SourceType::LocalFs if config.source.base_path.is_none() => {
            return Err(ConfigError::Invalid {
                field: "source.base_path".to_string(),
                reason: "required when source.type = local_fs".to_string(),
            }
            .into());
        }
        SourceType::Globus if config.source.endpoint_id.is_none() => {
            return Err(ConfigError::Invalid {
                field: "source.endpoint_id".to_string(),
                reason: "required when source.type = globus".to_string(),
            }
            .into());
        }
        _ => {}
    }

    if regex::Regex::new(&config.source.folder_pattern).is_err() {
        return Err(ConfigError::Invalid {
            field: "source.folder_pattern".to_string(),
            reason: "not a valid regular expression".to_string(),
        }
        .into());
    }

    if config.processing.max_workers == 0 {
        return Err(ConfigError::Invalid {
            field: "processing.max_workers".to_string(),
            reason: "must be at least 1".to_string(),
        }
        .into());
    }

    if config.output.chunking.max_size_gb <= 0.0 {
        return Err(ConfigError::Invalid {
            field: "output.chunking.max_size_gb".to_string(),
            reason: "must be positive".to_string(),
        }
        .into());
    }

    if config.validation.min_rows == 0 {
        return Err(ConfigError::Invalid {
            field: "validation.min_rows".to_string(),
            reason: "must be at least 1 (zero-row outputs are never valid, §8)".to_string(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, OutputConfig, OutputFormat, ProcessingConfig, SourceConfig, ValidationConfig};

    fn base_config() -> Config {
        Config {
            dataset: DatasetConfig {
                name: "hpc-telemetry".to_string(),
                dataset_type: "timeseries".to_string(),
                version: "v1".to_string(),
            },
            source: SourceConfig {
                source_type: SourceType::RemoteHttp,
                base_url: Some("https://example.invalid/".to_string()),
                base_path: None,
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
            transformations: vec![],
            validation: ValidationConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn remote_http_without_base_url_fails() {
        let mut config = base_config();
        config.source.base_url = None;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn empty_dataset_name_fails() {
        let mut config = base_config();
        config.dataset.name = "".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_max_workers_fails() {
        let mut config = base_config();
        config.processing.max_workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn invalid_folder_pattern_regex_fails() {
        let mut config = base_config();
        config.source.folder_pattern = "(unclosed".to_string();
        assert!(validate_config(&config).is_err());
    }
}

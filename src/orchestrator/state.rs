//! Persisted orchestrator state (§4.9/§6): `status.json` and
//! `version_info.json`, atomically rewritten after every folder's outcome is
//! known so a restarted process can resume without reprocessing finished
//! folders (§8 idempotence property).

use crate::util::atomic_file;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub processed_folders: Vec<String>,
    #[serde(default)]
    pub failed_folders: Vec<String>,
    #[serde(default)]
    pub last_processed_index: i64,
    #[serde(default)]
    pub last_updated: String,
}

impl Status {
    /// Load `path`, treating a missing file as empty state (§4.9) rather
    /// than an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        atomic_file::write_atomic(path, &bytes)
    }

    pub fn is_processed(&self, folder: &str) -> bool {
        self.processed_folders.iter().any(|f| f == folder)
    }

    pub fn record_success(&mut self, folder: &str, now_iso8601: &str) {
        self.failed_folders.retain(|f| f != folder);
        if !self.is_processed(folder) {
            self.processed_folders.push(folder.to_string());
        }
        self.last_processed_index += 1;
        self.last_updated = now_iso8601.to_string();
    }

    pub fn record_failure(&mut self, folder: &str, now_iso8601: &str) {
        if !self.failed_folders.iter().any(|f| f == folder) {
            self.failed_folders.push(folder.to_string());
        }
        self.last_updated = now_iso8601.to_string();
    }
}

/// `{<folder_name>: int, ...}` — a per-folder processing generation,
/// bumped each time a folder is (re)processed, so downstream consumers can
/// detect a folder was reprocessed from scratch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo(#[serde(flatten)] pub HashMap<String, i64>);

impl VersionInfo {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.0)?;
        atomic_file::write_atomic(path, &bytes)
    }

    pub fn bump(&mut self, folder: &str) {
        *self.0.entry(folder.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_status_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let status = Status::load(&dir.path().join("status.json")).unwrap();
        assert!(status.processed_folders.is_empty());
    }

    #[test]
    fn record_success_moves_folder_out_of_failed() {
        let mut status = Status::default();
        status.record_failure("2016-11", "2016-01-01T00:00:00Z");
        status.record_success("2016-11", "2016-01-01T00:01:00Z");
        assert!(status.is_processed("2016-11"));
        assert!(!status.failed_folders.contains(&"2016-11".to_string()));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut status = Status::default();
        status.record_success("2016-11", "2016-01-01T00:00:00Z");
        status.save(&path).unwrap();
        let loaded = Status::load(&path).unwrap();
        assert_eq!(loaded.processed_folders, vec!["2016-11".to_string()]);
    }

    #[test]
    fn version_info_bump_increments_per_folder() {
        let mut v = VersionInfo::default();
        v.bump("2016-11");
        v.bump("2016-11");
        v.bump("2016-12");
        assert_eq!(v.0["2016-11"], 2);
        assert_eq!(v.0["2016-12"], 1);
    }
}

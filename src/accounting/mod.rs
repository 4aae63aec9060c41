//! Accounting Loader (C4, §4.4).
//!
//! Grounded on the column projection and walltime/record-type handling in
//! `examples/original_source/data-pipeline/clusters/conte/step-2/consumer.py`
//! (`convert_walltime_to_seconds`, the `needed_columns` projection, and the
//! "3rd column is record type, filter == E" rule), re-expressed as a plain
//! `csv` read since this crate has no dataframe library.

use crate::error::SourceError;
use crate::model::{JobAccountingRecord, JobsTable};
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Load a folder's accounting CSV into a deduplicated, read-only jobs table.
///
/// Fails with [`SourceError::AccountingUnreadable`] only if the file is
/// missing or structurally unreadable (no header, no columns); individual
/// malformed rows are skipped rather than fatal.
pub fn load(path: &Path, folder: &str) -> Result<JobsTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| SourceError::AccountingUnreadable {
            folder: folder.to_string(),
            reason: e.to_string(),
        })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SourceError::AccountingUnreadable {
            folder: folder.to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if headers.len() < 3 {
        return Err(SourceError::AccountingUnreadable {
            folder: folder.to_string(),
            reason: "fewer than 3 columns; no record-type column available".to_string(),
        }
        .into());
    }
    let record_type_col = headers[2].clone();

    let mut table: JobsTable = JobsTable::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => continue,
        };
        if record.len() != headers.len() {
            continue;
        }
        let row: std::collections::HashMap<&str, &str> = headers
            .iter()
            .map(|s| s.as_str())
            .zip(record.iter())
            .collect();

        if let Some(rt) = row.get(record_type_col.as_str()) {
            if *rt != "E" {
                continue;
            }
        }

        let Some(raw_job_id) = row.get("jobID") else {
            continue;
        };
        let job_id = normalize_job_id(raw_job_id);
        let end_time = row.get("end").and_then(|s| parse_timestamp(s));

        let candidate = JobAccountingRecord {
            job_id: job_id.clone(),
            queue: row.get("queue").map(|s| s.to_string()).filter(|s| !s.is_empty()),
            account: row.get("account").map(|s| s.to_string()).filter(|s| !s.is_empty()),
            user: row.get("user").map(|s| s.to_string()).filter(|s| !s.is_empty()),
            jobname: row.get("jobname").map(|s| s.to_string()).filter(|s| !s.is_empty()),
            submit_time: row.get("qtime").and_then(|s| parse_timestamp(s)),
            start_time: row.get("start").and_then(|s| parse_timestamp(s)),
            end_time,
            walltime_limit_seconds: row
                .get("Resource_List.walltime")
                .and_then(|s| parse_walltime(s)),
            nhosts: row.get("Resource_List.nodect").and_then(|s| s.trim().parse().ok()),
            ncores: row.get("Resource_List.ncpus").and_then(|s| s.trim().parse().ok()),
            exit_status: row.get("Exit_status").and_then(|s| s.trim().parse().ok()),
            exec_host_list: row.get("exec_host").map(|s| s.to_string()).unwrap_or_default(),
        };

        // Dedup by jobId keeping the record with the latest end time.
        match table.get(&job_id) {
            Some(existing) if existing.end_time.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC) >= end_time.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC) => {}
            _ => {
                table.insert(job_id, candidate);
            }
        }
    }

    Ok(table)
}

fn normalize_job_id(raw: &str) -> String {
    if raw.len() >= 5 && raw[..5].eq_ignore_ascii_case("jobid") {
        format!("job{}", &raw[5..])
    } else {
        raw.to_string()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Accepts `HH:MM:SS`, `MM:SS`, `SS`, or a bare numeric seconds value;
/// anything else is `None` (§4.4).
fn parse_walltime(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.len() {
        3 => {
            let h: f64 = parts[0].parse().ok()?;
            let m: f64 = parts[1].parse().ok()?;
            let s: f64 = parts[2].parse().ok()?;
            Some(h * 3600.0 + m * 60.0 + s)
        }
        2 => {
            let m: f64 = parts[0].parse().ok()?;
            let s: f64 = parts[1].parse().ok()?;
            Some(m * 60.0 + s)
        }
        1 => parts[0].parse().ok(),
        _ => None,
    }
}

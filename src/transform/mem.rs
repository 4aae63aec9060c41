//! Memory usage transformer (GB), §4.3.
//!
//! Unlike block/cpu/nfs this is not a rate: each raw row is a point-in-time
//! snapshot, and each valid row emits TWO output records (`memused` and
//! `memused_minus_diskcache`) rather than one.

use super::{normalize_job_id_prefix, parse_timestamp, RawRow, BYTES_TO_GB};
use crate::error::SchemaError;
use crate::model::{Event, MetricRecord};
use crate::Result;

const REQUIRED: [&str; 6] = ["MemTotal", "MemFree", "FilePages", "jobID", "node", "timestamp"];

pub fn transform(rows: &[RawRow], source_file: &str) -> Result<Vec<MetricRecord>> {
    for col in REQUIRED {
        if !rows.iter().any(|r| r.contains_key(col)) {
            return Err(SchemaError {
                file: source_file.to_string(),
                reason: format!("missing required column `{col}`"),
            }
            .into());
        }
    }

    let mut out = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        let (Some(job_id), Some(node), Some(timestamp)) = (
            row.get("jobID").map(|s| normalize_job_id_prefix(s)),
            row.get("node").cloned(),
            row.get("timestamp").and_then(|s| parse_timestamp(s)),
        ) else {
            continue;
        };
        let (Some(mem_total), Some(mem_free), Some(file_pages)) = (
            row.get("MemTotal").and_then(|s| s.trim().parse::<f64>().ok()),
            row.get("MemFree").and_then(|s| s.trim().parse::<f64>().ok()),
            row.get("FilePages").and_then(|s| s.trim().parse::<f64>().ok()),
        ) else {
            continue;
        };

        let mem_total = mem_total.max(0.0);
        let mem_free = mem_free.max(0.0).min(mem_total);
        let memory_used = mem_total - mem_free;
        let file_pages = file_pages.max(0.0).min(mem_total).min(memory_used);

        out.push(MetricRecord {
            job_id: job_id.clone(),
            host: node.clone(),
            event: Event::MemUsed,
            value: memory_used * BYTES_TO_GB,
            units: "GB",
            timestamp,
        });
        out.push(MetricRecord {
            job_id,
            host: node,
            event: Event::MemUsedMinusDiskcache,
            value: (memory_used - file_pages) * BYTES_TO_GB,
            units: "GB",
            timestamp,
        });
    }
    Ok(out)
}

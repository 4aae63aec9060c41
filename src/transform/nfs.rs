//! NFS throughput transformer (MB/s), §4.3.
//!
//! Unlike block I/O this is keyed per (jobID, node) — NFS mounts are not
//! per-device in the source data, so there is no device-level fan-in step.

use super::{normalize_job_id_prefix, parse_timestamp, RawRow, BYTES_TO_MB, MIN_TIME_DELTA};
use crate::error::SchemaError;
use crate::model::{Event, MetricRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const REQUIRED: [&str; 5] = ["read_bytes", "write_bytes", "jobID", "node", "timestamp"];

struct Parsed {
    job_id: String,
    node: String,
    timestamp: DateTime<Utc>,
    bytes: f64,
}

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

    let mut parsed: Vec<Parsed> = rows
        .iter()
        .filter_map(|row| {
            let job_id = normalize_job_id_prefix(row.get("jobID")?);
            let node = row.get("node")?.clone();
            let timestamp = parse_timestamp(row.get("timestamp")?)?;
            let read: f64 = row.get("read_bytes")?.trim().parse().ok()?;
            let write: f64 = row.get("write_bytes")?.trim().parse().ok()?;
            Some(Parsed {
                job_id,
                node,
                timestamp,
                bytes: read + write,
            })
        })
        .collect();

    parsed.sort_by(|a, b| (&a.job_id, &a.node, a.timestamp).cmp(&(&b.job_id, &b.node, b.timestamp)));

    // Aggregate by (job, node, timestamp): sums duplicate-timestamp records
    // for the same node (§4.3).
    let mut rates: BTreeMap<(String, String, DateTime<Utc>), f64> = BTreeMap::new();
    let mut prev: Option<(String, String, DateTime<Utc>, f64)> = None;
    for p in &parsed {
        if let Some((pj, pn, pt, pbytes)) = &prev {
            if pj == &p.job_id && pn == &p.node {
                let time_delta = (p.timestamp - *pt).num_milliseconds() as f64 / 1000.0;
                let byte_delta = p.bytes - pbytes;
                if time_delta >= MIN_TIME_DELTA && byte_delta >= 0.0 {
                    let rate = (byte_delta * BYTES_TO_MB / time_delta).max(0.0);
                    *rates
                        .entry((p.job_id.clone(), p.node.clone(), p.timestamp))
                        .or_insert(0.0) += rate;
                }
            }
        }
        prev = Some((p.job_id.clone(), p.node.clone(), p.timestamp, p.bytes));
    }

    Ok(rates
        .into_iter()
        .map(|((job_id, node, timestamp), value)| MetricRecord {
            job_id,
            host: node,
            event: Event::Nfs,
            value,
            units: "MB/s",
            timestamp,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(job: &str, node: &str, ts: &str, read: &str, write: &str) -> RawRow {
        [
            ("jobID", job),
            ("node", node),
            ("timestamp", ts),
            ("read_bytes", read),
            ("write_bytes", write),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn computes_rate_in_mb_per_second() {
        let rows = vec![
            row("job1", "n1", "11/03/2016 12:00:00", "0", "0"),
            row("job1", "n1", "11/03/2016 12:00:10", "10485760", "0"), // 10 MiB over 10s
        ];
        let out = transform(&rows, "llite.csv").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].units, "MB/s");
        assert!((out[0].value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn successive_intervals_yield_independent_rates() {
        let rows = vec![
            row("job1", "n1", "11/03/2016 12:00:00", "0", "0"),
            row("job1", "n1", "11/03/2016 12:00:10", "1048576", "0"),
            row("job1", "n1", "11/03/2016 12:00:20", "3145728", "0"),
        ];
        let out = transform(&rows, "llite.csv").unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[0].value - 1.0).abs() < 1e-9);
        assert!((out[1].value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn negative_byte_delta_is_dropped() {
        let rows = vec![
            row("job1", "n1", "11/03/2016 12:00:00", "1000", "0"),
            row("job1", "n1", "11/03/2016 12:00:10", "0", "0"),
        ];
        let out = transform(&rows, "llite.csv").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let mut r = row("job1", "n1", "11/03/2016 12:00:00", "0", "0");
        r.remove("read_bytes");
        assert!(transform(&[r], "llite.csv").is_err());
    }
}

//! Block I/O rate transformer (GB/s), §4.3.

use super::{normalize_job_id_prefix, parse_timestamp, RawRow, MIN_TIME_DELTA, SECTOR_SIZE_BYTES};
use crate::error::SchemaError;
use crate::model::{Event, MetricRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const REQUIRED: [&str; 6] = ["rd_sectors", "wr_sectors", "jobID", "node", "device", "timestamp"];

struct Parsed {
    job_id: String,
    node: String,
    device: String,
    timestamp: DateTime<Utc>,
    sectors: f64,
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
            let device = row.get("device")?.clone();
            let timestamp = parse_timestamp(row.get("timestamp")?)?;
            let rd: f64 = row.get("rd_sectors")?.trim().parse().ok()?;
            let wr: f64 = row.get("wr_sectors")?.trim().parse().ok()?;
            Some(Parsed {
                job_id,
                node,
                device,
                timestamp,
                sectors: rd + wr,
            })
        })
        .collect();

    parsed.sort_by(|a, b| {
        (&a.job_id, &a.node, &a.device, a.timestamp).cmp(&(&b.job_id, &b.node, &b.device, b.timestamp))
    });

    // Per-(job, node, device) series: delta and rate.
    let mut per_device_rates: BTreeMap<(String, String, DateTime<Utc>), f64> = BTreeMap::new();
    let mut prev: Option<(String, String, String, DateTime<Utc>, f64)> = None;
    for p in &parsed {
        if let Some((pj, pn, pd, _pt, psectors)) = &prev {
            if pj == &p.job_id && pn == &p.node && pd == &p.device {
                let time_delta = (p.timestamp - *pt).num_milliseconds() as f64 / 1000.0;
                let sector_delta = p.sectors - psectors;
                if time_delta >= MIN_TIME_DELTA && sector_delta >= 0.0 {
                    let rate = (sector_delta * SECTOR_SIZE_BYTES / time_delta / (1024f64.powi(3))).max(0.0);
                    *per_device_rates
                        .entry((p.job_id.clone(), p.node.clone(), p.timestamp))
                        .or_insert(0.0) += rate;
                }
            }
        }
        prev = Some((p.job_id.clone(), p.node.clone(), p.device.clone(), p.timestamp, p.sectors));
    }

    Ok(per_device_rates
        .into_iter()
        .map(|((job_id, node, timestamp), value)| MetricRecord {
            job_id,
            host: node,
            event: Event::Block,
            value,
            units: "GB/s",
            timestamp,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(job: &str, node: &str, device: &str, ts: &str, rd: &str, wr: &str) -> RawRow {
        [
            ("jobID", job),
            ("node", node),
            ("device", device),
            ("timestamp", ts),
            ("rd_sectors", rd),
            ("wr_sectors", wr),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn aggregates_rates_across_devices_matching_spec_scenario() {
        let rows = vec![
            row("job2", "n2", "sda", "11/03/2016 12:00:00", "0", "0"),
            row("job2", "n2", "sda", "11/03/2016 12:00:10", "2048000", "0"),
            row("job2", "n2", "sdb", "11/03/2016 12:00:00", "0", "0"),
            row("job2", "n2", "sdb", "11/03/2016 12:00:10", "0", "1024000"),
        ];
        let out = transform(&rows, "block.csv").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event, Event::Block);
        assert_eq!(out[0].units, "GB/s");
        assert!((out[0].value - 0.14648437_5).abs() < 1e-6);
    }

    #[test]
    fn first_row_of_series_yields_no_rate() {
        let rows = vec![row("job1", "n1", "sda", "11/03/2016 12:00:00", "0", "0")];
        let out = transform(&rows, "block.csv").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn negative_time_delta_is_dropped() {
        let rows = vec![
            row("job1", "n1", "sda", "11/03/2016 12:00:10", "0", "0"),
            row("job1", "n1", "sda", "11/03/2016 12:00:00", "100", "0"),
        ];
        // sorted by timestamp before delta, so this is well-ordered; no
        // negative-delta case arises here, covering the sort precondition.
        let out = transform(&rows, "block.csv").unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let mut r = row("job1", "n1", "sda", "11/03/2016 12:00:00", "0", "0");
        r.remove("rd_sectors");
        let rows = vec![r];
        assert!(transform(&rows, "block.csv").is_err());
    }

    #[test]
    fn all_values_are_nonnegative() {
        let rows = vec![
            row("job1", "n1", "sda", "11/03/2016 12:00:00", "100", "0"),
            row("job1", "n1", "sda", "11/03/2016 12:00:10", "0", "0"),
        ];
        let out = transform(&rows, "block.csv").unwrap();
        for rec in out {
            assert!(rec.value >= 0.0);
        }
    }
}

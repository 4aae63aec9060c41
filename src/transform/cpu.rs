//! CPU user-percent transformer (%), §4.3.

use super::{normalize_job_id_prefix, parse_timestamp, RawRow, CPU_JIFFY_COLUMNS};
use crate::error::SchemaError;
use crate::model::{Event, MetricRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const REQUIRED_EXTRA: [&str; 4] = ["jobID", "node", "device", "timestamp"];

struct Parsed {
    job_id: String,
    node: String,
    device: String,
    timestamp: DateTime<Utc>,
    jiffies: [f64; 7],
}

pub fn transform(rows: &[RawRow], source_file: &str) -> Result<Vec<MetricRecord>> {
    for col in CPU_JIFFY_COLUMNS.iter().chain(REQUIRED_EXTRA.iter()) {
        if !rows.iter().any(|r| r.contains_key(*col)) {
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
            let mut jiffies = [0.0; 7];
            for (i, col) in CPU_JIFFY_COLUMNS.iter().enumerate() {
                jiffies[i] = row.get(*col)?.trim().parse().ok()?;
            }
            Some(Parsed {
                job_id,
                node,
                device,
                timestamp,
                jiffies,
            })
        })
        .collect();

    parsed.sort_by(|a, b| {
        (&a.job_id, &a.node, &a.device, a.timestamp).cmp(&(&b.job_id, &b.node, &b.device, b.timestamp))
    });

    // node-level accumulation of valid core deltas: (user_sum, nice_sum, total_sum)
    let mut node_level: BTreeMap<(String, String, DateTime<Utc>), (f64, f64, f64)> = BTreeMap::new();
    let mut prev: Option<(String, String, String, DateTime<Utc>, [f64; 7])> = None;
    for p in &parsed {
        if let Some((pj, pn, pd, _pt, pj_jiffies)) = &prev {
            if pj == &p.job_id && pn == &p.node && pd == &p.device {
                let mut deltas = [0.0; 7];
                for i in 0..7 {
                    deltas[i] = p.jiffies[i] - pj_jiffies[i];
                }
                let user_delta = deltas[0];
                let nice_delta = deltas[1];
                let total_delta: f64 = deltas.iter().sum();
                if user_delta >= 0.0 && nice_delta >= 0.0 && total_delta > 0.0 {
                    let entry = node_level
                        .entry((p.job_id.clone(), p.node.clone(), p.timestamp))
                        .or_insert((0.0, 0.0, 0.0));
                    entry.0 += user_delta;
                    entry.1 += nice_delta;
                    entry.2 += total_delta;
                }
            }
        }
        prev = Some((p.job_id.clone(), p.node.clone(), p.device.clone(), p.timestamp, p.jiffies));
    }

    Ok(node_level
        .into_iter()
        .map(|((job_id, node, timestamp), (user_sum, nice_sum, total_sum))| {
            let pct = ((user_sum + nice_sum) / total_sum * 100.0).clamp(0.0, 100.0);
            MetricRecord {
                job_id,
                host: node,
                event: Event::CpuUser,
                value: pct,
                units: "CPU %",
                timestamp,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(job: &str, node: &str, device: &str, ts: &str, vals: [&str; 7]) -> RawRow {
        let mut m: RawRow = [
            ("jobID", job),
            ("node", node),
            ("device", device),
            ("timestamp", ts),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (i, col) in CPU_JIFFY_COLUMNS.iter().enumerate() {
            m.insert(col.to_string(), vals[i].to_string());
        }
        m
    }

    #[test]
    fn two_core_aggregation_matches_manual_computation() {
        let rows = vec![
            row("job1", "n1", "c0", "11/03/2016 12:00:00", ["100", "10", "20", "900", "0", "0", "0"]),
            row("job1", "n1", "c0", "11/03/2016 12:00:30", ["130", "10", "25", "910", "0", "0", "0"]),
            row("job1", "n1", "c1", "11/03/2016 12:00:00", ["50", "0", "10", "950", "0", "0", "0"]),
            row("job1", "n1", "c1", "11/03/2016 12:00:30", ["80", "0", "12", "968", "0", "0", "0"]),
        ];
        let out = transform(&rows, "cpu.csv").unwrap();
        assert_eq!(out.len(), 1);
        // c0 deltas: user=30 nice=0 system=5 idle=10 -> total=45
        // c1 deltas: user=30 nice=0 system=2 idle=18 -> total=50
        // node: user_sum=60 nice_sum=0 total_sum=95 -> 60/95*100
        let expected = 60.0 / 95.0 * 100.0;
        assert!((out[0].value - expected).abs() < 1e-9);
        assert_eq!(out[0].units, "CPU %");
    }

    #[test]
    fn clamps_to_100_percent() {
        // total_delta deliberately smaller than user+nice delta to force clamping.
        let rows = vec![
            row("job1", "n1", "c0", "11/03/2016 12:00:00", ["0", "0", "0", "0", "0", "0", "0"]),
            row("job1", "n1", "c0", "11/03/2016 12:00:30", ["200", "0", "0", "0", "0", "0", "0"]),
        ];
        let out = transform(&rows, "cpu.csv").unwrap();
        assert_eq!(out[0].value, 100.0);
    }

    #[test]
    fn zero_total_delta_is_excluded() {
        let rows = vec![
            row("job1", "n1", "c0", "11/03/2016 12:00:00", ["0", "0", "0", "0", "0", "0", "0"]),
            row("job1", "n1", "c0", "11/03/2016 12:00:30", ["0", "0", "0", "0", "0", "0", "0"]),
        ];
        let out = transform(&rows, "cpu.csv").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn missing_jiffy_column_is_schema_error() {
        let mut r = row("job1", "n1", "c0", "11/03/2016 12:00:00", ["0", "0", "0", "0", "0", "0", "0"]);
        r.remove("softirq");
        assert!(transform(&[r], "cpu.csv").is_err());
    }
}

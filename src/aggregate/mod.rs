//! Join/Aggregate Engine (C5, §4.5).
//!
//! Grounded on `hpc_transformers.py`'s long-form schema and
//! `examples/original_source/.../step-2/consumer.py`'s group-by-minute join
//! (`group_by(["jobID", "host", "time"])`, the exit-status mapping, and the
//! per-chunk worker-pool shape), re-expressed over plain `std` collections
//! per chunk rather than a dataframe library — the teacher's own
//! `src/stats/aggregator.rs` takes the same hand-rolled approach rather than
//! reaching for a crate.

use crate::error::JoinError;
use crate::governor::Thresholds;
use crate::model::{AggregatedRow, Event, JobAccountingRecord, JobsTable, MetricRecord};
use crate::util::host_list;
use crate::util::worker_pool::WorkerPool;
use crate::{governor, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Join `records` against `jobs` and produce day-partitioned aggregated rows.
///
/// `available_memory_gib` selects the chunk row-count tier (§4.5);
/// `workers` is typically [`governor::w_cpu`]. Fails with [`JoinError`] only
/// when every chunk produced zero rows.
pub fn run(
    records: Vec<MetricRecord>,
    jobs: Arc<JobsTable>,
    thresholds: &Thresholds,
    available_memory_gib: f64,
    workers: usize,
    folder: &str,
) -> Result<BTreeMap<String, Vec<AggregatedRow>>> {
    let chunk_size = governor::chunk_rows(available_memory_gib, thresholds);
    let chunks: Vec<Vec<MetricRecord>> = records
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect();

    let pool = WorkerPool::new(workers.max(1), chunks.len().max(1));
    let results: Arc<Mutex<Vec<Vec<AggregatedRow>>>> = Arc::new(Mutex::new(Vec::new()));

    for chunk in chunks {
        let jobs = jobs.clone();
        let results = results.clone();
        pool.submit(move || {
            // A chunk-level I/O or parse failure is logged and skipped
            // (§4.5); in this in-memory pipeline the only failure mode left
            // is "produced nothing", which is not itself an error.
            let rows = process_chunk(&chunk, &jobs);
            results.lock().unwrap().push(rows);
        });
    }
    pool.join();

    let results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
    let mut by_day: BTreeMap<String, Vec<AggregatedRow>> = BTreeMap::new();
    let mut total = 0usize;
    for rows in results {
        total += rows.len();
        for row in rows {
            let day_key = row.time.format("%Y-%m-%d").to_string();
            by_day.entry(day_key).or_default().push(row);
        }
    }

    if total == 0 {
        return Err(JoinError {
            folder: folder.to_string(),
        }
        .into());
    }
    Ok(by_day)
}

/// Normalize a jobId for cross-stage join matching: purely numeric ids get a
/// `job` prefix, anything else is lowercased (§4.5 step 1).
fn normalize_join_key(raw: &str) -> String {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("job{raw}")
    } else {
        raw.to_lowercase()
    }
}

fn process_chunk(chunk: &[MetricRecord], jobs: &JobsTable) -> Vec<AggregatedRow> {
    // Step 1-3: normalize, inner-join, filter by job window.
    struct Joined<'a> {
        job_id: String,
        host: String,
        time: DateTime<Utc>,
        event: Event,
        value: f64,
        job: &'a JobAccountingRecord,
    }

    let mut joined: Vec<Joined> = Vec::with_capacity(chunk.len());
    for record in chunk {
        let key = normalize_join_key(&record.job_id);
        let Some(job) = jobs.get(&key) else { continue };
        let (Some(start), Some(end)) = (job.start_time, job.end_time) else {
            continue;
        };
        if record.timestamp < start || record.timestamp > end {
            continue;
        }
        // Step 4: truncate timestamp to the minute.
        let time = truncate_to_minute(record.timestamp);
        joined.push(Joined {
            job_id: key,
            host: record.host.clone(),
            time,
            event: record.event,
            value: record.value,
            job,
        });
    }

    // Ties within a group break by (jobId, host, time, event); a stable sort
    // on that key before grouping realizes that ordering deterministically.
    joined.sort_by(|a, b| {
        (&a.job_id, &a.host, a.time, event_rank(a.event)).cmp(&(
            &b.job_id,
            &b.host,
            b.time,
            event_rank(b.event),
        ))
    });

    // Step 5: group by (jobId, host, time).
    let mut groups: BTreeMap<(String, String, DateTime<Utc>), GroupAccum> = BTreeMap::new();
    for j in &joined {
        let accum = groups
            .entry((j.job_id.clone(), j.host.clone(), j.time))
            .or_insert_with(|| GroupAccum::new(j.job));
        accum.add(j.event, j.value);
    }

    groups
        .into_iter()
        .map(|((job_id, host, time), accum)| accum.into_row(job_id, host, time))
        .collect()
}

fn event_rank(e: Event) -> u8 {
    match e {
        Event::Block => 0,
        Event::CpuUser => 1,
        Event::MemUsed => 2,
        Event::MemUsedMinusDiskcache => 3,
        Event::Nfs => 4,
        Event::Gpu => 5,
    }
}

fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - Duration::seconds(ts.timestamp() % 60)
}

struct GroupAccum<'a> {
    job: &'a JobAccountingRecord,
    sums: std::collections::HashMap<Event, (f64, u32)>,
}

impl<'a> GroupAccum<'a> {
    fn new(job: &'a JobAccountingRecord) -> Self {
        Self {
            job,
            sums: std::collections::HashMap::new(),
        }
    }

    fn add(&mut self, event: Event, value: f64) {
        let entry = self.sums.entry(event).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    fn mean(&self, event: Event) -> Option<f64> {
        self.sums.get(&event).map(|(sum, n)| sum / *n as f64)
    }

    fn into_row(self, job_id: String, host: String, time: DateTime<Utc>) -> AggregatedRow {
        let host_list = host_list::canonicalize(&self.job.exec_host_list);
        AggregatedRow {
            time,
            submit_time: self.job.submit_time,
            start_time: self.job.start_time,
            end_time: self.job.end_time,
            timelimit: self.job.walltime_limit_seconds,
            nhosts: self.job.nhosts,
            ncores: self.job.ncores,
            account: self.job.account.clone(),
            queue: self.job.queue.clone(),
            host,
            jid: job_id,
            unit: "mixed",
            jobname: self.job.jobname.clone(),
            exitcode: exit_status_to_string(self.job.exit_status),
            host_list,
            username: self.job.user.clone(),
            value_cpuuser: self.mean(Event::CpuUser),
            value_gpu: self.mean(Event::Gpu),
            value_memused: self.mean(Event::MemUsed),
            value_memused_minus_diskcache: self.mean(Event::MemUsedMinusDiskcache),
            value_nfs: self.mean(Event::Nfs),
            value_block: self.mean(Event::Block),
        }
    }
}

/// Maps a raw PBS exit status to its cleaned-up status string directly
/// (§9 decision: the intermediate `"FAILED:<n>"` form is never observed
/// outside this function — the letters-only cleanup is folded in here).
fn exit_status_to_string(status: Option<i64>) -> String {
    match status {
        Some(0) => "COMPLETED".to_string(),
        Some(_) => "FAILED".to_string(),
        None => "UNKNOWN".to_string(),
    }
}

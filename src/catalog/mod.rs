//! Catalog Builder (C8, §4.8).
//!
//! Groups finalized [`OutputFile`]s by the month and quarter embedded in
//! their `day_key`, writes one gzip-compressed archive per group via an
//! [`ObjectStore`], and appends a describing [`ArchiveEntry`] to a single
//! `archives/index.json`. Grounded on the month/day extraction regex in
//! `examples/original_source/.../step-2/producer.py`'s
//! `extract_year_month_day_from_metric_file`, re-purposed here to group
//! outputs rather than to route individual files.

use crate::error::ResourceError;
use crate::model::ArchiveEntry;
use crate::store::ObjectStore;
use crate::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Disk-space ceiling for a single archive group's working directory
/// (§4.8). Exceeding this mid-assembly aborts the group.
pub const DEFAULT_MAX_WORKING_DIR_GIB: f64 = 28.0;

/// One finalized output file plus the day key it was written for, as
/// produced by [`crate::writer::ColumnarSink`].
#[derive(Debug, Clone)]
pub struct CatalogSource {
    pub path: std::path::PathBuf,
    pub day_key: String,
    pub byte_size: u64,
}

/// Parse `YYYY-MM-DD` out of a day key (the Daily Writer always uses this
/// format, §4.6), returning `(year, month, day)`.
fn split_day_key(day_key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = day_key.splitn(3, '-');
    let year = parts.next()?;
    let month = parts.next()?;
    let day = parts.next()?;
    if year.len() == 4 && month.len() == 2 && day.len() == 2 {
        Some((year, month, day))
    } else {
        None
    }
}

fn month_key(day_key: &str) -> Option<String> {
    let (y, m, _) = split_day_key(day_key)?;
    Some(format!("{y}-{m}"))
}

fn quarter_key(day_key: &str) -> Option<String> {
    let (y, m, _) = split_day_key(day_key)?;
    let month_num: u32 = m.parse().ok()?;
    let quarter = (month_num.saturating_sub(1)) / 3 + 1;
    Some(format!("{y}-Q{quarter}"))
}

/// Group `sources` by month key and by quarter key (§4.8 "by month and
/// quarter"): every source participates in exactly one month group and
/// exactly one quarter group.
pub fn group_periods(sources: &[CatalogSource]) -> BTreeMap<String, Vec<CatalogSource>> {
    let mut groups: BTreeMap<String, Vec<CatalogSource>> = BTreeMap::new();
    for source in sources {
        if let Some(key) = month_key(&source.day_key) {
            groups.entry(key).or_default().push(source.clone());
        }
        if let Some(key) = quarter_key(&source.day_key) {
            groups.entry(key).or_default().push(source.clone());
        }
    }
    groups
}

/// Build and persist one period's archive: concatenate its member files'
/// bytes into a gzip stream, checksum it, upload it through `store`, and
/// return the [`ArchiveEntry`] describing it (not yet appended to the
/// index — see [`append_to_index`]).
///
/// Aborts with [`ResourceError::DiskCritical`] if the cumulative
/// uncompressed size of the group exceeds `max_working_dir_gib` at any
/// point while assembling it (§4.8).
pub fn build_archive(
    period: &str,
    mut members: Vec<CatalogSource>,
    store: &dyn ObjectStore,
    max_working_dir_gib: f64,
) -> Result<ArchiveEntry> {
    members.sort_by(|a, b| a.day_key.cmp(&b.day_key));

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut cumulative_bytes: u64 = 0;
    const GIB: u64 = 1024 * 1024 * 1024;
    let ceiling_bytes = (max_working_dir_gib * GIB as f64) as u64;

    let mut start = members.first().map(|m| m.day_key.clone()).unwrap_or_default();
    let mut end = start.clone();
    for member in &members {
        cumulative_bytes += member.byte_size;
        if cumulative_bytes > ceiling_bytes {
            return Err(ResourceError::DiskCritical {
                free_gib: max_working_dir_gib - (cumulative_bytes as f64 / GIB as f64),
                threshold_gib: max_working_dir_gib,
            }
            .into());
        }
        if member.day_key < start {
            start = member.day_key.clone();
        }
        if member.day_key > end {
            end = member.day_key.clone();
        }
        let contents = std::fs::read(&member.path)?;
        encoder.write_all(&(contents.len() as u64).to_le_bytes())?;
        encoder.write_all(&contents)?;
    }
    let archive_bytes = encoder.finish()?;

    let mut hasher = Sha256::new();
    hasher.update(&archive_bytes);
    let checksum = hex(&hasher.finalize());

    let archive_key = format!("archives/{period}.tar.gz");
    store.put(&archive_key, &archive_bytes)?;

    Ok(ArchiveEntry {
        period: period.to_string(),
        path: archive_key,
        size: archive_bytes.len() as u64,
        checksum,
        start,
        end,
        object_count: members.len() as u64,
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

const INDEX_KEY: &str = "archives/index.json";

/// Append `entry` to the single catalog index, reading the existing index
/// (an absent index is treated as empty, matching the orchestrator's
/// `status.json`/`version_info.json` convention) and rewriting it whole.
pub fn append_to_index(store: &dyn ObjectStore, entry: ArchiveEntry) -> Result<()> {
    let mut entries: Vec<ArchiveEntry> = match store.get(INDEX_KEY) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    };
    entries.retain(|e| e.period != entry.period);
    entries.push(entry);
    entries.sort_by(|a, b| a.period.cmp(&b.period));
    let bytes = serde_json::to_vec_pretty(&entries)?;
    store.put(INDEX_KEY, &bytes)
}

/// Run the full Catalog Builder over one batch of newly-written output
/// files: group by period, build and upload each archive, and append every
/// resulting entry to the index. Returns the entries written.
///
/// `max_working_dir_gib` is normally [`DEFAULT_MAX_WORKING_DIR_GIB`]; callers
/// may shrink it for constrained deployments, matching
/// [`crate::governor::Thresholds`]'s `MAX_MEMORY_GB`-style override pattern.
pub fn run(
    sources: &[CatalogSource],
    store: &dyn ObjectStore,
    max_working_dir_gib: f64,
) -> Result<Vec<ArchiveEntry>> {
    let groups = group_periods(sources);
    let mut entries = Vec::with_capacity(groups.len());
    for (period, members) in groups {
        let entry = build_archive(&period, members, store, max_working_dir_gib)?;
        append_to_index(store, entry.clone())?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalObjectStore;
    use tempfile::tempdir;

    fn write_source(dir: &Path, day_key: &str, contents: &[u8]) -> CatalogSource {
        let path = dir.join(format!("{day_key}.parquet"));
        std::fs::write(&path, contents).unwrap();
        CatalogSource {
            path,
            day_key: day_key.to_string(),
            byte_size: contents.len() as u64,
        }
    }

    #[test]
    fn month_and_quarter_keys_parse_from_day_key() {
        assert_eq!(month_key("2016-11-03").unwrap(), "2016-11");
        assert_eq!(quarter_key("2016-11-03").unwrap(), "2016-Q4");
        assert_eq!(quarter_key("2016-01-15").unwrap(), "2016-Q1");
    }

    #[test]
    fn group_periods_buckets_each_source_into_month_and_quarter() {
        let dir = tempdir().unwrap();
        let sources = vec![
            write_source(dir.path(), "2016-11-03", b"a"),
            write_source(dir.path(), "2016-11-04", b"bb"),
        ];
        let groups = group_periods(&sources);
        assert_eq!(groups["2016-11"].len(), 2);
        assert_eq!(groups["2016-Q4"].len(), 2);
    }

    #[test]
    fn build_archive_writes_checksummed_object() {
        let dir = tempdir().unwrap();
        let store_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(store_dir.path());
        let members = vec![
            write_source(dir.path(), "2016-11-03", b"payload-one"),
            write_source(dir.path(), "2016-11-04", b"payload-two"),
        ];
        let entry = build_archive("2016-11", members, &store, 28.0).unwrap();
        assert_eq!(entry.period, "2016-11");
        assert_eq!(entry.object_count, 2);
        assert_eq!(entry.start, "2016-11-03");
        assert_eq!(entry.end, "2016-11-04");
        assert!(entry.size > 0);
        assert!(store.get(&entry.path).is_ok());
    }

    #[test]
    fn build_archive_aborts_over_disk_ceiling() {
        let dir = tempdir().unwrap();
        let store_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(store_dir.path());
        let members = vec![write_source(dir.path(), "2016-11-03", &vec![0u8; 1024])];
        let result = build_archive("2016-11", members, &store, 0.0000001);
        assert!(result.is_err());
    }

    #[test]
    fn append_to_index_replaces_same_period_entry() {
        let store_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(store_dir.path());
        let e1 = ArchiveEntry {
            period: "2016-11".to_string(),
            path: "archives/2016-11.tar.gz".to_string(),
            size: 10,
            checksum: "aaa".to_string(),
            start: "2016-11-01".to_string(),
            end: "2016-11-30".to_string(),
            object_count: 1,
        };
        append_to_index(&store, e1.clone()).unwrap();
        let mut e2 = e1.clone();
        e2.object_count = 2;
        append_to_index(&store, e2.clone()).unwrap();

        let bytes = store.get(INDEX_KEY).unwrap();
        let entries: Vec<ArchiveEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].object_count, 2);
    }
}

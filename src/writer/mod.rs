//! Daily Writer (C6, §4.6).
//!
//! `ColumnarSink` is a small trait abstraction (SPEC_FULL.md §4.6/§9 design
//! note) so the pipeline core can be tested against an in-memory backend
//! without touching disk, the same engine-trait-with-one-production-backend
//! shape the teacher used for `src/engine/mod.rs` (`IOEngine`, `sync`/`mock`
//! backends).

pub mod schema;

use crate::error::WriteError;
use crate::governor;
use crate::model::{AggregatedRow, OutputFile};
use crate::util::atomic_file;
use crate::Result;
use anyhow::Context;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, Encoding};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::schema::types::ColumnPath;
use std::fs::File;
use std::path::{Path, PathBuf};

const ROW_GROUP_SIZE: usize = 100_000;
const MAX_DAY_SIZE_GIB: f64 = 2.0;
const MIN_CHUNK_ROWS: usize = 500_000;
const WRITE_RETRIES: u32 = 2;
const MIN_FREE_DISK_GIB: f64 = 3.0;
/// Rough per-row byte estimate used only to decide whether a day needs
/// splitting before writing (§4.6); not an exact size prediction.
const ESTIMATED_BYTES_PER_ROW: usize = 200;

/// A destination for finished day partitions. The only production
/// implementation is [`ParquetSink`]; tests may supply an in-memory backend
/// implementing the same trait.
pub trait ColumnarSink {
    fn write_day(&self, dataset_name: &str, version: &str, day_key: &str, rows: &[AggregatedRow]) -> Result<Vec<OutputFile>>;
}

/// Atomic, validated, retrying Arrow/Parquet writer.
pub struct ParquetSink {
    pub output_dir: PathBuf,
}

impl ParquetSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ColumnarSink for ParquetSink {
    fn write_day(&self, dataset_name: &str, version: &str, day_key: &str, rows: &[AggregatedRow]) -> Result<Vec<OutputFile>> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating output dir {}", self.output_dir.display()))?;

        let parts = split_into_parts(rows);
        let mut outputs = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let part_index = if parts.len() > 1 { Some(idx as u32) } else { None };
            let file_name = match part_index {
                Some(i) => format!("{dataset_name}_{version}_{day_key}_chunk_{i:03}.parquet"),
                None => format!("{dataset_name}_{version}_{day_key}.parquet"),
            };
            let final_path = self.output_dir.join(&file_name);
            let output = write_part_with_retry(&final_path, part, part.len())?;
            outputs.push(OutputFile {
                dataset_name: dataset_name.to_string(),
                version: version.to_string(),
                day_key: day_key.to_string(),
                part_index,
                byte_size: output.0,
                checksum: output.1,
                path: final_path,
            });
        }
        Ok(outputs)
    }
}

/// Split `rows` into ordered parts if the day is estimated to exceed
/// `MAX_DAY_SIZE_GIB`, with each part at least `MIN_CHUNK_ROWS` rows (§4.6).
fn split_into_parts(rows: &[AggregatedRow]) -> Vec<&[AggregatedRow]> {
    let estimated_bytes = rows.len() * ESTIMATED_BYTES_PER_ROW;
    let estimated_gib = estimated_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if estimated_gib <= MAX_DAY_SIZE_GIB || rows.len() <= MIN_CHUNK_ROWS {
        return vec![rows];
    }
    rows.chunks(MIN_CHUNK_ROWS).collect()
}

fn write_part_with_retry(final_path: &Path, rows: &[AggregatedRow], expected_min_rows: usize) -> Result<(u64, String)> {
    let mut last_err = None;
    for attempt in 0..WRITE_RETRIES {
        let free = governor::free_disk_gib(final_path.parent().unwrap_or(Path::new(".")));
        if free < MIN_FREE_DISK_GIB {
            last_err = Some(format!("only {free:.2} GiB free, need {MIN_FREE_DISK_GIB:.2} GiB"));
            continue;
        }
        match write_and_validate(final_path, rows, expected_min_rows) {
            Ok(result) => return Ok(result),
            Err(e) => {
                let tmp = atomic_file::tmp_sibling(final_path);
                let _ = std::fs::remove_file(&tmp);
                let _ = std::fs::remove_file(final_path);
                last_err = Some(format!("attempt {attempt}: {e}"));
            }
        }
    }
    Err(WriteError {
        path: final_path.display().to_string(),
        attempts: WRITE_RETRIES,
        reason: last_err.unwrap_or_else(|| "unknown failure".to_string()),
    }
    .into())
}

fn write_and_validate(final_path: &Path, rows: &[AggregatedRow], expected_min_rows: usize) -> Result<(u64, String)> {
    let tmp_path = atomic_file::tmp_sibling(final_path);
    {
        let file = File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
        let batch = schema::rows_to_batch(rows)?;
        let props = writer_properties();
        let mut writer = ArrowWriter::try_new(file, schema::arrow_schema(), Some(props))
            .context("constructing arrow writer")?;
        writer.write(&batch).context("writing record batch")?;
        writer.close().context("closing parquet writer")?;
    }

    validate(&tmp_path, expected_min_rows)?;

    std::fs::rename(&tmp_path, final_path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), final_path.display()))?;

    let byte_size = std::fs::metadata(final_path)?.len();
    let checksum = crate::util::checksum::sha256_file(final_path)?;
    Ok((byte_size, checksum))
}

fn writer_properties() -> WriterProperties {
    let mut builder = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .set_statistics_enabled(EnabledStatistics::Chunk);
    for col in schema::FLOAT_COLUMNS {
        let path = ColumnPath::from(vec![col.to_string()]);
        builder = builder.set_column_encoding(path, Encoding::BYTE_STREAM_SPLIT);
    }
    builder.build()
}

/// Validation per §4.6: file exists with size > 0, schema carries every
/// frozen column, and a sample read reports at least `expected_min_rows`.
fn validate(path: &Path, expected_min_rows: usize) -> Result<()> {
    let meta = std::fs::metadata(path).with_context(|| format!("stat-ing {}", path.display()))?;
    if meta.len() == 0 {
        anyhow::bail!("written file {} has zero length", path.display());
    }
    let file = File::open(path).with_context(|| format!("reopening {}", path.display()))?;
    let reader_builder = ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let schema = reader_builder.schema();
    for name in schema::COLUMN_NAMES {
        if schema.field_with_name(name).is_err() {
            anyhow::bail!("written file is missing required column `{name}`");
        }
    }
    let mut reader = reader_builder.build().context("building parquet reader")?;
    let mut total_rows = 0usize;
    while let Some(batch) = reader.next() {
        total_rows += batch.context("reading sample batch")?.num_rows();
    }
    if total_rows < expected_min_rows {
        anyhow::bail!("written file reports {total_rows} rows, expected at least {expected_min_rows}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample_rows(n: usize) -> Vec<AggregatedRow> {
        (0..n)
            .map(|i| AggregatedRow {
                time: Utc.with_ymd_and_hms(2016, 11, 3, 9, (i % 60) as u32, 0).unwrap(),
                submit_time: None,
                start_time: None,
                end_time: None,
                timelimit: Some(3600.0),
                nhosts: Some(1.0),
                ncores: Some(2.0),
                account: None,
                queue: None,
                host: format!("node{i:02}"),
                jid: format!("job{i}"),
                unit: "mixed",
                jobname: None,
                exitcode: "COMPLETED".to_string(),
                host_list: None,
                username: None,
                value_cpuuser: Some(50.0),
                value_gpu: None,
                value_memused: None,
                value_memused_minus_diskcache: None,
                value_nfs: None,
                value_block: None,
            })
            .collect()
    }

    #[test]
    fn writes_single_part_for_small_day() {
        let dir = tempdir().unwrap();
        let sink = ParquetSink::new(dir.path());
        let rows = sample_rows(10);
        let outputs = sink.write_day("crucible", "v1", "2016-11-03", &rows).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].part_index.is_none());
        assert!(outputs[0].byte_size > 0);
        let path = dir.path().join("crucible_v1_2016-11-03.parquet");
        assert!(path.exists());
        assert!(!dir.path().join("crucible_v1_2016-11-03.parquet.tmp").exists());
    }

    #[test]
    fn small_day_is_not_split() {
        let rows = sample_rows(100);
        let parts = split_into_parts(&rows);
        assert_eq!(parts.len(), 1);
    }
}

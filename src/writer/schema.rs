//! Frozen output schema (§6) and row→`RecordBatch` conversion.
//!
//! Column order here is the single place allowed to matter: every other
//! module works with [`crate::model::AggregatedRow`] as a plain struct.
//! Grounded on the builder-per-column `rows_to_batch` shape in
//! `examples/other_examples/df5b13bf_pluveto-tesser__tesser-data-src-etl-mod.rs.rs`.

use crate::model::AggregatedRow;
use crate::Result;
use arrow::array::{ArrayRef, Float64Builder, StringBuilder, TimestampMicrosecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::sync::{Arc, OnceLock};

/// The 22 frozen columns, in order, as named in §6.
pub const COLUMN_NAMES: [&str; 22] = [
    "time",
    "submit_time",
    "start_time",
    "end_time",
    "timelimit",
    "nhosts",
    "ncores",
    "account",
    "queue",
    "host",
    "jid",
    "unit",
    "jobname",
    "exitcode",
    "host_list",
    "username",
    "value_cpuuser",
    "value_gpu",
    "value_memused",
    "value_memused_minus_diskcache",
    "value_nfs",
    "value_block",
];

/// Column names using a byte-stream-split-friendly float encoding (§4.6).
pub const FLOAT_COLUMNS: [&str; 9] = [
    "timelimit",
    "nhosts",
    "ncores",
    "value_cpuuser",
    "value_gpu",
    "value_memused",
    "value_memused_minus_diskcache",
    "value_nfs",
    "value_block",
];

fn timestamp_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Timestamp(TimeUnit::Microsecond, None), nullable)
}

pub fn arrow_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                timestamp_field("time", false),
                timestamp_field("submit_time", true),
                timestamp_field("start_time", true),
                timestamp_field("end_time", true),
                Field::new("timelimit", DataType::Float64, true),
                Field::new("nhosts", DataType::Float64, true),
                Field::new("ncores", DataType::Float64, true),
                Field::new("account", DataType::Utf8, true),
                Field::new("queue", DataType::Utf8, true),
                Field::new("host", DataType::Utf8, false),
                Field::new("jid", DataType::Utf8, false),
                Field::new("unit", DataType::Utf8, false),
                Field::new("jobname", DataType::Utf8, true),
                Field::new("exitcode", DataType::Utf8, false),
                Field::new("host_list", DataType::Utf8, true),
                Field::new("username", DataType::Utf8, true),
                Field::new("value_cpuuser", DataType::Float64, true),
                Field::new("value_gpu", DataType::Float64, true),
                Field::new("value_memused", DataType::Float64, true),
                Field::new("value_memused_minus_diskcache", DataType::Float64, true),
                Field::new("value_nfs", DataType::Float64, true),
                Field::new("value_block", DataType::Float64, true),
            ]))
        })
        .clone()
}

fn micros(dt: Option<chrono::DateTime<chrono::Utc>>) -> Option<i64> {
    dt.map(|d| d.timestamp_micros())
}

pub fn rows_to_batch(rows: &[AggregatedRow]) -> Result<RecordBatch> {
    let mut time = TimestampMicrosecondBuilder::new();
    let mut submit_time = TimestampMicrosecondBuilder::new();
    let mut start_time = TimestampMicrosecondBuilder::new();
    let mut end_time = TimestampMicrosecondBuilder::new();
    let mut timelimit = Float64Builder::new();
    let mut nhosts = Float64Builder::new();
    let mut ncores = Float64Builder::new();
    let mut account = StringBuilder::new();
    let mut queue = StringBuilder::new();
    let mut host = StringBuilder::new();
    let mut jid = StringBuilder::new();
    let mut unit = StringBuilder::new();
    let mut jobname = StringBuilder::new();
    let mut exitcode = StringBuilder::new();
    let mut host_list = StringBuilder::new();
    let mut username = StringBuilder::new();
    let mut value_cpuuser = Float64Builder::new();
    let mut value_gpu = Float64Builder::new();
    let mut value_memused = Float64Builder::new();
    let mut value_memused_minus_diskcache = Float64Builder::new();
    let mut value_nfs = Float64Builder::new();
    let mut value_block = Float64Builder::new();

    for row in rows {
        time.append_value(row.time.timestamp_micros());
        append_opt_i64(&mut submit_time, micros(row.submit_time));
        append_opt_i64(&mut start_time, micros(row.start_time));
        append_opt_i64(&mut end_time, micros(row.end_time));
        append_opt_f64(&mut timelimit, row.timelimit);
        append_opt_f64(&mut nhosts, row.nhosts);
        append_opt_f64(&mut ncores, row.ncores);
        append_opt_str(&mut account, row.account.as_deref());
        append_opt_str(&mut queue, row.queue.as_deref());
        host.append_value(&row.host);
        jid.append_value(&row.jid);
        unit.append_value(row.unit);
        append_opt_str(&mut jobname, row.jobname.as_deref());
        exitcode.append_value(&row.exitcode);
        append_opt_str(&mut host_list, row.host_list.as_deref());
        append_opt_str(&mut username, row.username.as_deref());
        append_opt_f64(&mut value_cpuuser, row.value_cpuuser);
        append_opt_f64(&mut value_gpu, row.value_gpu);
        append_opt_f64(&mut value_memused, row.value_memused);
        append_opt_f64(
            &mut value_memused_minus_diskcache,
            row.value_memused_minus_diskcache,
        );
        append_opt_f64(&mut value_nfs, row.value_nfs);
        append_opt_f64(&mut value_block, row.value_block);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(time.finish()),
        Arc::new(submit_time.finish()),
        Arc::new(start_time.finish()),
        Arc::new(end_time.finish()),
        Arc::new(timelimit.finish()),
        Arc::new(nhosts.finish()),
        Arc::new(ncores.finish()),
        Arc::new(account.finish()),
        Arc::new(queue.finish()),
        Arc::new(host.finish()),
        Arc::new(jid.finish()),
        Arc::new(unit.finish()),
        Arc::new(jobname.finish()),
        Arc::new(exitcode.finish()),
        Arc::new(host_list.finish()),
        Arc::new(username.finish()),
        Arc::new(value_cpuuser.finish()),
        Arc::new(value_gpu.finish()),
        Arc::new(value_memused.finish()),
        Arc::new(value_memused_minus_diskcache.finish()),
        Arc::new(value_nfs.finish()),
        Arc::new(value_block.finish()),
    ];

    RecordBatch::try_new(arrow_schema(), columns).map_err(Into::into)
}

fn append_opt_i64(b: &mut TimestampMicrosecondBuilder, v: Option<i64>) {
    match v {
        Some(v) => b.append_value(v),
        None => b.append_null(),
    }
}

fn append_opt_f64(b: &mut Float64Builder, v: Option<f64>) {
    match v {
        Some(v) => b.append_value(v),
        None => b.append_null(),
    }
}

fn append_opt_str(b: &mut StringBuilder, v: Option<&str>) {
    match v {
        Some(v) => b.append_value(v),
        None => b.append_null(),
    }
}

//! Shared CSV reading preamble for all four transformers (§4.3).
//!
//! Tolerant encoding: utf-8 is tried first (strictly more specific than the
//! two single-byte fallbacks), then latin1/ISO-8859-1 — which are byte-
//! identical encodings (byte value == Unicode scalar value for 0x00-0xFF),
//! so one infallible byte-to-char decode satisfies both names the spec lists
//! (SPEC_FULL.md §4.3 encoding fallback note). This needs no decoding crate.

use crate::Result;
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

/// One tolerantly-decoded, tolerantly-parsed CSV row as a header-keyed map
/// of raw string cells. Required-column coercion and null-dropping is left
/// to each transformer, since the required column set differs per metric.
pub type RawRow = HashMap<String, String>;

/// Read `path` into rows keyed by header name, skipping rows that don't
/// parse as valid CSV records (malformed rows are dropped, not fatal).
pub fn read_tolerant(path: &Path) -> Result<Vec<RawRow>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let text = decode_tolerant(&bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading CSV header from {}", path.display()))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => continue, // malformed row: skip (§4.3 preamble)
        };
        if record.len() != headers.len() {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|s| s.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Decode `bytes` as utf-8 if valid, else as latin1/ISO-8859-1 (a lossless,
/// infallible one-byte-per-codepoint mapping).
fn decode_tolerant(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Normalize a jobID cell: case-insensitive replacement of the `jobID`
/// prefix with `JOB` (§4.3 preamble).
pub fn normalize_job_id_prefix(raw: &str) -> String {
    if raw.len() >= 5 && raw[..5].eq_ignore_ascii_case("jobid") {
        format!("JOB{}", &raw[5..])
    } else {
        raw.to_string()
    }
}

/// Parse the shared timestamp format `%m/%d/%Y %H:%M:%S` (UTC). Rows that
/// fail to parse are dropped by the caller.
pub fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), "%m/%d/%Y %H:%M:%S")
        .ok()
        .map(|naive| chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn decode_tolerant_handles_valid_utf8() {
        assert_eq!(decode_tolerant("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn decode_tolerant_falls_back_on_invalid_utf8() {
        let bytes = [0xE9u8, b'a', b'b']; // 0xE9 is 'é' in latin1, invalid utf-8 lead byte here
        let decoded = decode_tolerant(&bytes);
        assert_eq!(decoded.chars().next().unwrap() as u32, 0xE9);
    }

    #[test]
    fn normalize_job_id_prefix_is_case_insensitive() {
        assert_eq!(normalize_job_id_prefix("jobID123"), "JOB123");
        assert_eq!(normalize_job_id_prefix("JOBID123"), "JOB123");
        assert_eq!(normalize_job_id_prefix("JobId123"), "JOB123");
        assert_eq!(normalize_job_id_prefix("other123"), "other123");
    }

    #[test]
    fn parse_timestamp_matches_expected_format() {
        let ts = parse_timestamp("11/03/2016 12:00:00").unwrap();
        assert_eq!(ts.to_string(), "2016-11-03 12:00:00 UTC");
    }

    #[test]
    fn parse_timestamp_rejects_unparseable_string() {
        assert!(parse_timestamp("not-a-date").is_none());
    }

    #[test]
    fn read_tolerant_skips_malformed_rows() {
        let mut f = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(f, "a,b,c").unwrap();
        writeln!(f, "1,2,3").unwrap();
        writeln!(f, "4,5").unwrap(); // malformed: wrong column count
        writeln!(f, "7,8,9").unwrap();
        f.flush().unwrap();
        let rows = read_tolerant(f.path()).unwrap();
        assert_eq!(rows.len(), 2);
    }
}

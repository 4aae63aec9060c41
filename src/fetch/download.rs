//! Parallel, retrying, resumable downloads of a folder's required files
//! (§4.2).

use crate::error::SourceError;
use crate::util::backoff::fetcher_delay;
use crate::util::worker_pool::WorkerPool;
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::sleep;

const CHUNK_SIZE: usize = 8 * 1024;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub folder: String,
    pub files: Vec<PathBuf>,
}

/// Download every `required_file` for `folder_name` from `base_url` into
/// `dest_dir`, using a [`WorkerPool`] of `workers` threads. A destination
/// file that already exists and is non-empty is accepted without
/// re-downloading (resumability, §4.2).
pub fn fetch_folder(
    client: &reqwest::blocking::Client,
    base_url: &str,
    folder_name: &str,
    required_files: &[String],
    dest_dir: &Path,
    workers: usize,
) -> Result<FetchOutcome> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating destination dir {}", dest_dir.display()))?;

    let pool = WorkerPool::new(workers.max(1), required_files.len().max(1));
    let results: Arc<Mutex<Vec<Result<PathBuf>>>> = Arc::new(Mutex::new(Vec::new()));
    let client = client.clone();

    for file_name in required_files {
        let client = client.clone();
        let base_url = base_url.trim_end_matches('/').to_string();
        let folder_name = folder_name.to_string();
        let file_name = file_name.clone();
        let dest_dir = dest_dir.to_path_buf();
        let results = results.clone();
        pool.submit(move || {
            let url = format!("{base_url}/{folder_name}/{file_name}");
            let dest_path = dest_dir.join(&file_name);
            let outcome = download_one(&client, &url, &dest_path, &folder_name, &file_name);
            results.lock().unwrap().push(outcome);
        });
    }
    pool.join();

    let results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
    let mut files = Vec::with_capacity(results.len());
    for result in results {
        files.push(result?);
    }
    files.sort();
    Ok(FetchOutcome {
        folder: folder_name.to_string(),
        files,
    })
}

fn download_one(
    client: &reqwest::blocking::Client,
    url: &str,
    dest_path: &Path,
    folder_name: &str,
    file_name: &str,
) -> Result<PathBuf> {
    if dest_path.exists() {
        if let Ok(meta) = std::fs::metadata(dest_path) {
            if meta.len() > 0 {
                return Ok(dest_path.to_path_buf());
            }
        }
    }

    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            sleep(fetcher_delay(attempt - 1, hash_str(url)));
        }
        match try_download(client, url, dest_path) {
            Ok(()) => return Ok(dest_path.to_path_buf()),
            Err(e) => {
                let _ = std::fs::remove_file(dest_path);
                last_err = Some(e);
            }
        }
    }
    Err(SourceError::MissingFile {
        folder: folder_name.to_string(),
        file: file_name.to_string(),
        attempts: MAX_ATTEMPTS,
    }
    .into())
    .with_context(|| format!("last error: {:?}", last_err))
}

fn try_download(client: &reqwest::blocking::Client, url: &str, dest_path: &Path) -> Result<()> {
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("non-success status from {url}"))?;

    let file = File::create(dest_path)
        .with_context(|| format!("creating {}", dest_path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;

    if total == 0 {
        anyhow::bail!("downloaded zero bytes from {url}");
    }
    Ok(())
}

fn hash_str(s: &str) -> u64 {
    let mut h: u64 = 1469598103934665603;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

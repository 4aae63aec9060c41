//! Fetcher (C2, §4.2): folder discovery and parallel, retrying, resumable
//! downloads of a monthly input batch.
//!
//! Grounded on
//! `examples/original_source/.../extractors/http_extractor.py`'s
//! `HttpExtractor`/`FileDownloader`/`FolderDiscovery`. The Rust version keeps
//! the same algorithm shape (streamed download, zero-byte rejection,
//! exponential backoff) but uses a blocking `reqwest` client and a
//! [`crate::util::worker_pool::WorkerPool`] instead of a thread-pool
//! executor, since this crate has no async runtime (§5).

pub mod discovery;
pub mod download;

pub use discovery::discover_folders;
pub use download::{fetch_folder, FetchOutcome};

//! Fast segmented parallel downloads
//!
//! Splits a remote resource into contiguous byte ranges, fetches every range
//! concurrently over its own connection, and reassembles the parts into a
//! single output file. Per-request proxy, timeout and User-Agent settings are
//! fixed for the life of a job; failures are collected per segment and the
//! first one aborts the remaining fetchers.
//!
//! The crate exposes debug logs through the [`tracing`][tracing] crate
//!
//! ## Feature flags
//!
//! - `progress`: Enables progress reporting using `indicatif`
//! - `json`: Enables the persisted [`Config`][crate::Config] object
//! - `rustls`/`openssl`: TLS backend of the reqwest [`Client`][reqwest::Client]
//!
//! ## Crate usage
//!
//! # Example
//!
//! ```no_run
//! use segget::{DownloadJob, Downloader, Url};
//! #[tokio::main]
//! async fn main() -> Result<(), segget::DownloadError> {
//!     let job = DownloadJob::builder()
//!         .url(Url::parse("https://crates.io/file.zip")?)
//!         .output("/tmp/file.zip")
//!         .workers(5u8)
//!         .build()?;
//!     let handle = segget::start_download(job);
//!     let result = handle.join().await?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "json")]
mod config;
mod downloader;
mod error;
mod fetch;
mod job;
mod progress;
mod segment;

#[cfg(feature = "json")]
pub use config::Config;
pub use downloader::{probe_length, start_download, DownloadHandle, Downloader, JobResult};
pub use error::{DownloadError, FetchFailure, Result, SegmentCause, SegmentError};
pub use job::{
    filename_from_url, ActionNotifier, DownloadJob, DownloadJobBuilder, PostAction,
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, DEFAULT_WORKERS,
};
pub use progress::{Progress, ProgressState};
pub use segment::{partition, Segment};

#[cfg(feature = "progress")]
pub use indicatif::ProgressStyle;
pub use reqwest::{header, Client, Url};

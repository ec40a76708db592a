use std::fmt;
use std::io;
use thiserror::Error;

/// Error definition for possible errors in this crate
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Returned when the remote does not report a usable length
    #[error("Could not determine remote content length")]
    SizeUnavailable,
    /// Returned when the requested worker count is zero
    #[error("Worker count must be at least 1")]
    InvalidPartitionRequest,
    /// One or more segment fetches failed, merge was skipped
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
    /// Returned when assembling the output file from segment parts failed
    #[error("Merge failed: {0}")]
    Merge(#[source] io::Error),
    /// Represents problems with network connectivity
    #[error("Reqwest error: {0}")]
    Net(#[from] reqwest::Error),
    /// Represents problems with Tokio based IO
    #[error("Tokio IO error: {0}")]
    Io(#[from] io::Error),
    /// Returned when there's no filename in the url
    #[error("No filename in url: {0}")]
    NoFilename(String),
    /// Returned when the url couldn't be parsed
    #[error("Failed to parse URL: {0}")]
    UrlParse(#[from] url::ParseError),
    /// Returned when a fetch task couldn't be joined
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Returned when the job builder was given inconsistent settings
    #[error("Invalid job: {0}")]
    InvalidJob(String),
    #[cfg(feature = "json")]
    /// Returned when the persisted configuration couldn't be read or written
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Alias for Result<T, segget::DownloadError>
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Failure of a single segment fetch, tagged with the segment index
#[derive(Debug, Error)]
#[error("Segment {index}: {source}")]
pub struct SegmentError {
    /// Index of the failed segment
    pub index: usize,
    /// What went wrong
    #[source]
    pub source: SegmentCause,
}

impl SegmentError {
    pub(crate) fn new(index: usize, source: SegmentCause) -> Self {
        Self { index, source }
    }
}

/// Underlying cause of a [`SegmentError`]
#[derive(Debug, Error)]
pub enum SegmentCause {
    /// Transport-level failure of the range request
    #[error("Request failed: {0}")]
    Net(#[from] reqwest::Error),
    /// The server answered the range request with a non-success status
    #[error("Server returned {0}")]
    Status(reqwest::StatusCode),
    /// Local IO failure while writing the part file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The fetch was aborted after another segment failed or the job was cancelled
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Every per-segment error from one fetch phase, in completion order.
///
/// The first entry is the representative cause reported by [`fmt::Display`],
/// the rest are kept for diagnostics.
#[derive(Debug)]
pub struct FetchFailure {
    errors: Vec<SegmentError>,
}

impl FetchFailure {
    pub(crate) fn new(errors: Vec<SegmentError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }
    /// The first error by completion order
    pub fn first(&self) -> &SegmentError {
        &self.errors[0]
    }
    /// All collected segment errors
    pub fn all(&self) -> &[SegmentError] {
        &self.errors
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} segment(s) failed)",
            self.first(),
            self.errors.len()
        )
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.first())
    }
}

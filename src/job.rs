use crate::{DownloadError, Result};
use derive_builder::Builder;
use reqwest::{Client, Proxy, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-Agent sent when the job doesn't override it
pub const DEFAULT_USER_AGENT: &str = "SegmenGetDownloader/1.0";

/// Default number of concurrent fetch tasks
pub const DEFAULT_WORKERS: u8 = 4;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Immutable description of one download request.
///
/// Created once per user-initiated download and never mutated afterwards,
/// transport settings included.
///
/// # Examples
///
/// ```
/// use segget::{DownloadJob, Url};
/// # fn main() -> Result<(), segget::DownloadError> {
/// let job = DownloadJob::builder()
///     .url(Url::parse("https://crates.io/file.zip")?)
///     .output("/tmp/file.zip")
///     .workers(8u8)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "DownloadJobBuilder::validate"))]
pub struct DownloadJob {
    /// Source URL of the resource
    pub url: Url,
    /// Path of the final output file
    pub output: PathBuf,
    /// Number of concurrent fetch tasks, must be positive
    #[builder(default = "DEFAULT_WORKERS")]
    pub workers: u8,
    /// Optional proxy applied to every request of the job
    #[builder(default, setter(strip_option))]
    pub proxy: Option<Url>,
    /// Per-request timeout
    #[builder(default = "Duration::from_secs(DEFAULT_TIMEOUT_SECS)")]
    pub timeout: Duration,
    /// User-Agent header sent with every request
    #[builder(default = "DEFAULT_USER_AGENT.to_string()")]
    pub user_agent: String,
    /// Action tag handed to the notifier after a successful merge
    #[builder(default)]
    pub post_action: PostAction,
}

impl DownloadJobBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.workers {
            return Err("worker count must be at least 1".to_string());
        }
        Ok(())
    }
}

impl From<DownloadJobBuilderError> for DownloadError {
    fn from(e: DownloadJobBuilderError) -> Self {
        DownloadError::InvalidJob(e.to_string())
    }
}

impl DownloadJob {
    /// Start building a job
    pub fn builder() -> DownloadJobBuilder {
        DownloadJobBuilder::default()
    }

    /// Create a job with default transport settings
    pub fn new(url: Url, output: impl Into<PathBuf>) -> Self {
        Self {
            url,
            output: output.into(),
            workers: DEFAULT_WORKERS,
            proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            post_action: PostAction::default(),
        }
    }

    /// Build the shared [`Client`][reqwest::Client] with the job's proxy,
    /// timeout and User-Agent baked in
    pub(crate) fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(Proxy::all(proxy.clone())?);
        }
        builder.build().map_err(Into::into)
    }
}

/// What the caller wants to happen once a download completed.
///
/// Only a tag: the core reports it through an [`ActionNotifier`] and never
/// carries the action out itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PostAction {
    #[default]
    None,
    Shutdown,
    OpenFile,
}

/// External collaborator told that a post-download action was requested
pub trait ActionNotifier: Send + Sync {
    fn notify(&self, action: PostAction, output: &Path);
}

/// Get filename from the url, returns an error if the url contains no filename
///
/// # Examples
/// ```
/// use segget::{filename_from_url, Url};
/// # fn main() -> Result<(), segget::DownloadError> {
/// let url = Url::parse("http://test.rs/test.zip")?;
/// assert_eq!("test.zip", filename_from_url(&url)?);
/// # Ok(())
/// # }
/// ```
pub fn filename_from_url(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .and_then(|name| {
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .ok_or_else(|| DownloadError::NoFilename(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn builder_fills_defaults() {
        let job = DownloadJob::builder()
            .url(url("https://example.com/a.bin"))
            .output("/tmp/a.bin")
            .build()
            .unwrap();
        assert_eq!(job.workers, 4);
        assert_eq!(job.timeout, Duration::from_secs(60));
        assert_eq!(job.user_agent, "SegmenGetDownloader/1.0");
        assert_eq!(job.post_action, PostAction::None);
        assert!(job.proxy.is_none());
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let res = DownloadJob::builder()
            .url(url("https://example.com/a.bin"))
            .output("/tmp/a.bin")
            .workers(0u8)
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(
            filename_from_url(&url("http://test.rs/dir/test.zip")).unwrap(),
            "test.zip"
        );
        assert!(matches!(
            filename_from_url(&url("http://test.rs/")),
            Err(DownloadError::NoFilename(_))
        ));
    }

    #[test]
    fn client_from_job_settings() {
        let job = DownloadJob::new(url("https://example.com/a.bin"), "/tmp/a.bin");
        assert!(job.build_client().is_ok());
    }
}

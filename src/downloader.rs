use crate::error::{DownloadError, FetchFailure, Result, SegmentError};
use crate::fetch;
use crate::job::{ActionNotifier, DownloadJob, PostAction};
use crate::progress::{Progress, ProgressState};
use crate::segment::{partition, Segment};
#[cfg(feature = "progress")]
use indicatif::ProgressBar;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::{fs, io};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Determine the total resource length without transferring the body.
///
/// Issues a HEAD request first; servers that refuse HEAD or omit the length
/// are asked for the first byte instead and the total is read from the
/// `Content-Range` header. Returns [`SizeUnavailable`][DownloadError::SizeUnavailable]
/// when no positive length can be determined.
#[instrument(skip(client), fields(URL = %url))]
pub async fn probe_length(client: &Client, url: &Url) -> Result<u64> {
    let resp = client.head(url.clone()).send().await?;
    debug!("Response code: {}", resp.status());
    debug!("Received HEAD response: {:?}", resp.headers());
    if resp.status().is_success() {
        if let Some(len) = header_length(resp.headers()) {
            return Ok(len);
        }
    }
    let resp = client
        .get(url.clone())
        .header(RANGE, "bytes=0-0")
        .send()
        .await?;
    debug!("Received GET 1B response: {:?}", resp.headers());
    resp.headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.parse::<u64>().ok())
        .filter(|len| *len > 0)
        .ok_or(DownloadError::SizeUnavailable)
}

fn header_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|len| *len > 0)
}

/// Terminal outcome of a completed job, produced exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Path of the merged output file
    pub output: PathBuf,
    /// Total bytes written
    pub bytes: u64,
}

/// Main type of the crate: owns one job's lifecycle from size probe to merge.
///
/// # Examples
///
/// ```no_run
/// use segget::{DownloadJob, Downloader, Url};
/// # #[tokio::main]
/// # async fn main() -> Result<(), segget::DownloadError> {
/// let job = DownloadJob::new(Url::parse("https://crates.io/file.zip")?, "/tmp/file.zip");
/// let dl = Downloader::new(job).await?;
/// let result = dl.download().await?;
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    job: DownloadJob,
    client: Client,
    length: u64,
    notifier: Option<Arc<dyn ActionNotifier>>,
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("job", &self.job)
            .field("length", &self.length)
            .finish()
    }
}

impl Downloader {
    /// Probe the resource and prepare a downloader for `job`
    pub async fn new(job: DownloadJob) -> Result<Self> {
        let client = job.build_client()?;
        let length = probe_length(&client, &job.url).await?;
        debug!("Len: {}", length);
        Ok(Self {
            job,
            client,
            length,
            notifier: None,
            #[cfg(feature = "progress")]
            bar: None,
        })
    }

    /// Total size of the resource in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The job this downloader was built for
    pub fn job(&self) -> &DownloadJob {
        &self.job
    }

    /// Attach the collaborator notified after a successful merge
    pub fn notify_via(&mut self, notifier: Arc<dyn ActionNotifier>) -> &mut Self {
        self.notifier = Some(notifier);
        self
    }

    /// Enable progress reporting
    #[cfg(feature = "progress")]
    pub fn progress_bar(&mut self) -> &mut Self {
        self.bar = Some(ProgressBar::new(self.length));
        self
    }

    /// Connect an externally managed [`ProgressBar`][indicatif::ProgressBar]
    #[cfg(feature = "progress")]
    pub fn connect_progress(&mut self, bar: ProgressBar) {
        self.bar = Some(bar);
    }

    /// Set the progress bar style
    #[cfg(feature = "progress")]
    pub fn bar_style(&self, style: indicatif::ProgressStyle) {
        if let Some(bar) = &self.bar {
            bar.set_style(style);
        }
    }

    /// Run the job in place and return its outcome
    pub async fn download(self) -> Result<JobResult> {
        let (tx, _rx) = watch::channel(Progress::empty());
        let (_pause_tx, pause_rx) = watch::channel(false);
        self.run(tx, CancellationToken::new(), pause_rx).await
    }

    /// Spawn the job and hand back its control handle
    pub fn start(self) -> DownloadHandle {
        let (tx, rx) = watch::channel(Progress {
            fraction: 0.0,
            speed: 0.0,
            downloaded: 0,
            total: self.length,
        });
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        let task_cancel = cancel.clone();
        let result = tokio::spawn(self.run(tx, task_cancel, pause_rx));
        DownloadHandle {
            progress: rx,
            pause: pause_tx,
            cancel,
            result,
        }
    }

    #[instrument(skip_all, fields(URL = %self.job.url, tasks = %self.job.workers))]
    async fn run(
        self,
        tx: watch::Sender<Progress>,
        cancel: CancellationToken,
        pause: watch::Receiver<bool>,
    ) -> Result<JobResult> {
        let state = Arc::new(ProgressState::new(self.length));
        let done = CancellationToken::new();
        let publisher = spawn_publisher(tx, state.clone(), done.clone());
        let res = self.run_inner(state, cancel, pause).await;
        done.cancel();
        let _ = publisher.await;
        res
    }

    async fn run_inner(
        self,
        state: Arc<ProgressState>,
        cancel: CancellationToken,
        pause: watch::Receiver<bool>,
    ) -> Result<JobResult> {
        // the guard removes every part file on all exit paths
        let tmp = tempfile::tempdir()?;
        let segments = partition(self.length, self.job.workers, tmp.path())?;
        debug!("Fetching {} segments", segments.len());
        #[cfg(feature = "progress")]
        if let Some(bar) = &self.bar {
            bar.set_length(self.length);
        }
        // bounded to the segment count, a task sends at most once
        let (err_tx, mut err_rx) = mpsc::channel::<SegmentError>(segments.len());
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(segments.len());
        for seg in segments.clone() {
            let client = self.client.clone();
            let url = self.job.url.clone();
            let st = state.clone();
            let token = cancel.clone();
            let pause = pause.clone();
            let err_tx = err_tx.clone();
            #[cfg(feature = "progress")]
            let bar = self.bar.clone();
            handles.push(tokio::spawn(async move {
                let res = fetch::fetch_segment(
                    client,
                    url,
                    seg,
                    st,
                    token.clone(),
                    pause,
                    #[cfg(feature = "progress")]
                    bar,
                )
                .await;
                if let Err(e) = res {
                    let _ = err_tx.send(e).await;
                    // first failure aborts the remaining fetchers
                    token.cancel();
                }
            }));
        }
        drop(err_tx);
        for joined in futures::future::join_all(handles).await {
            joined?;
        }
        let mut errors = Vec::new();
        while let Some(e) = err_rx.recv().await {
            errors.push(e);
        }
        if !errors.is_empty() {
            return Err(FetchFailure::new(errors).into());
        }
        let bytes = merge(&segments, &self.job.output).await?;
        debug!("Merged {} bytes into {:?}", bytes, self.job.output);
        if self.job.post_action != PostAction::None {
            if let Some(notifier) = &self.notifier {
                notifier.notify(self.job.post_action, &self.job.output);
            }
        }
        Ok(JobResult {
            output: self.job.output,
            bytes,
        })
    }
}

/// Concatenate the part files into `output` in ascending segment order.
///
/// A failed merge removes the partial output file before returning.
#[instrument(skip(segments))]
pub(crate) async fn merge(segments: &[Segment], output: &Path) -> Result<u64> {
    match merge_inner(segments, output).await {
        Ok(n) => Ok(n),
        Err(e) => {
            let _ = fs::remove_file(output).await;
            Err(DownloadError::Merge(e))
        }
    }
}

async fn merge_inner(segments: &[Segment], output: &Path) -> std::io::Result<u64> {
    let mut out = fs::File::create(output).await?;
    let mut written = 0;
    for seg in segments {
        let mut part = fs::File::open(&seg.temp_path).await?;
        written += io::copy(&mut part, &mut out).await?;
    }
    out.sync_all().await?;
    Ok(written)
}

fn spawn_publisher(
    tx: watch::Sender<Progress>,
    state: Arc<ProgressState>,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(200));
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = tick.tick() => {
                    let _ = tx.send(state.snapshot());
                }
            }
        }
        // terminal snapshot, reports 1.0 after a full fetch
        let _ = tx.send(state.snapshot());
    })
}

/// Control surface of a spawned job: the progress stream, pause and cancel
/// signals and the result future
pub struct DownloadHandle {
    progress: watch::Receiver<Progress>,
    pause: watch::Sender<bool>,
    cancel: CancellationToken,
    result: JoinHandle<Result<JobResult>>,
}

impl DownloadHandle {
    /// Stream of periodic progress snapshots
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Latest snapshot without waiting
    pub fn latest(&self) -> Progress {
        *self.progress.borrow()
    }

    /// Suspend every fetcher at its next buffered read
    pub fn pause(&self) {
        let _ = self.pause.send(true);
    }

    /// Resume previously paused fetchers
    pub fn resume(&self) {
        let _ = self.pause.send(false);
    }

    /// Abort the job; in-flight fetchers stop at their next buffered read
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to reach a terminal state
    pub async fn join(self) -> Result<JobResult> {
        self.result.await?
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("progress", &self.latest())
            .finish()
    }
}

/// Launch `job` and return its control handle.
///
/// The size probe runs inside the spawned task, so snapshots report a zero
/// total until probing finishes.
pub fn start_download(job: DownloadJob) -> DownloadHandle {
    let (tx, rx) = watch::channel(Progress::empty());
    let cancel = CancellationToken::new();
    let (pause_tx, pause_rx) = watch::channel(false);
    let task_cancel = cancel.clone();
    let result = tokio::spawn(async move {
        let dl = Downloader::new(job).await?;
        dl.run(tx, task_cancel, pause_rx).await
    });
    DownloadHandle {
        progress: rx,
        pause: pause_tx,
        cancel,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write_parts(dir: &Path, parts: &[&[u8]]) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut offset = 0u64;
        for (i, data) in parts.iter().enumerate() {
            let temp_path = dir.join(format!("part{}", i));
            fs::write(&temp_path, data).await.unwrap();
            segments.push(Segment {
                index: i,
                start: offset,
                end: offset + data.len() as u64 - 1,
                temp_path,
            });
            offset += data.len() as u64;
        }
        segments
    }

    #[tokio::test]
    async fn merge_concatenates_in_index_order() {
        let dir = tempdir().unwrap();
        let segments = write_parts(dir.path(), &[b"hello ", b"segmented ", b"world"]).await;
        let output = dir.path().join("out.bin");
        let written = merge(&segments, &output).await.unwrap();
        assert_eq!(written, 21);
        let merged = fs::read(&output).await.unwrap();
        assert_eq!(merged, b"hello segmented world");
    }

    #[tokio::test]
    async fn merge_failure_removes_partial_output() {
        let dir = tempdir().unwrap();
        let mut segments = write_parts(dir.path(), &[b"first"]).await;
        segments.push(Segment {
            index: 1,
            start: 5,
            end: 9,
            temp_path: dir.path().join("missing"),
        });
        let output = dir.path().join("out.bin");
        let res = merge(&segments, &output).await;
        assert!(matches!(res, Err(DownloadError::Merge(_))));
        assert!(!output.exists());
    }
}

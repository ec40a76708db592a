use crate::error::{SegmentCause, SegmentError};
use crate::progress::ProgressState;
use crate::segment::Segment;
#[cfg(feature = "progress")]
use indicatif::ProgressBar;
use reqwest::header::RANGE;
use reqwest::{Client, Url};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Fetch one segment's byte range into its part file.
///
/// Streams the response body buffer by buffer, feeding the shared
/// [`ProgressState`] as data arrives. The pause gate and the cancellation
/// token are polled at every buffered read, so both take effect within one
/// buffer's latency. Runs as an independent task, never waits on another
/// segment.
#[instrument(skip_all, fields(index = %segment.index, range = %segment.range_header()))]
pub(crate) async fn fetch_segment(
    client: Client,
    url: Url,
    segment: Segment,
    progress: Arc<ProgressState>,
    cancel: CancellationToken,
    pause: watch::Receiver<bool>,
    #[cfg(feature = "progress")] bar: Option<ProgressBar>,
) -> Result<u64, SegmentError> {
    let index = segment.index;
    fetch_inner(
        client,
        url,
        segment,
        progress,
        cancel,
        pause,
        #[cfg(feature = "progress")]
        bar,
    )
    .await
    .map_err(|cause| SegmentError::new(index, cause))
}

async fn fetch_inner(
    client: Client,
    url: Url,
    segment: Segment,
    progress: Arc<ProgressState>,
    cancel: CancellationToken,
    mut pause: watch::Receiver<bool>,
    #[cfg(feature = "progress")] bar: Option<ProgressBar>,
) -> Result<u64, SegmentCause> {
    let mut resp = client
        .get(url)
        .header(RANGE, segment.range_header())
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SegmentCause::Status(status));
    }
    let mut out = File::create(&segment.temp_path).await?;
    let mut written: u64 = 0;
    // set to false once the pause controller goes away
    let mut pause_live = true;
    loop {
        if pause_live && *pause.borrow() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SegmentCause::Cancelled),
                res = pause.changed() => {
                    if res.is_err() {
                        pause_live = false;
                    }
                    continue;
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SegmentCause::Cancelled),
            chunk = resp.chunk() => match chunk? {
                Some(bytes) => {
                    out.write_all(&bytes).await?;
                    progress.observe(bytes.len() as u64);
                    #[cfg(feature = "progress")]
                    if let Some(bar) = &bar {
                        bar.inc(bytes.len() as u64);
                    }
                    written += bytes.len() as u64;
                }
                None => break,
            },
        }
    }
    out.flush().await?;
    debug!("Wrote {} bytes to {:?}", written, segment.temp_path);
    Ok(written)
}

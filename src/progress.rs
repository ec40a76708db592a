use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Shared byte counter for one job.
///
/// `observe` is the only mutation and is an atomic add, so the counter is
/// monotonically non-decreasing for the life of the job. Snapshots anchor the
/// speed estimate to the job's recorded start instant.
#[derive(Debug)]
pub struct ProgressState {
    total: u64,
    downloaded: AtomicU64,
    started: Instant,
}

impl ProgressState {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            downloaded: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record `delta` freshly received bytes. Safe to call from any task.
    pub fn observe(&self, delta: u64) {
        self.downloaded.fetch_add(delta, Ordering::Relaxed);
    }

    /// Total size of the resource in bytes
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes received so far across all segments
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Derive the current fraction and throughput estimate
    pub fn snapshot(&self) -> Progress {
        let downloaded = self.downloaded();
        let fraction = (downloaded as f64 / self.total as f64).min(1.0);
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            downloaded as f64 / elapsed
        } else {
            0.0
        };
        Progress {
            fraction,
            speed,
            downloaded,
            total: self.total,
        }
    }
}

/// Point-in-time view of a running job, published on the progress stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Completed share of the download, clamped to `[0, 1]`
    pub fraction: f64,
    /// Average throughput since job start, bytes per second
    pub speed: f64,
    /// Bytes received so far
    pub downloaded: u64,
    /// Total size of the resource
    pub total: u64,
}

impl Progress {
    /// Snapshot for a job whose size isn't known yet
    pub(crate) fn empty() -> Self {
        Self {
            fraction: 0.0,
            speed: 0.0,
            downloaded: 0,
            total: 0,
        }
    }
}

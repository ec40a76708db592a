use crate::{DownloadError, Result};
use std::path::{Path, PathBuf};

/// One contiguous byte range of the remote resource, fetched by exactly one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of the segment in merge order
    pub index: usize,
    /// First byte offset of the range
    pub start: u64,
    /// Last byte offset of the range, inclusive
    pub end: u64,
    /// Where the fetched bytes are staged until merge
    pub temp_path: PathBuf,
}

impl Segment {
    /// Length of the range in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
    /// Formatted value for the [`RANGE`][reqwest::header::RANGE] header
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `total` bytes into at most `workers` contiguous segments.
///
/// Segments `0..n-1` share the base length `total / n`, the last one absorbs
/// the division remainder so the union covers exactly `[0, total - 1]`. The
/// effective count is clamped to `total` so no segment ends up empty when more
/// workers than bytes are requested. Part files are named `part<index>` under
/// `dir`, which is not touched here.
///
/// # Example
///
/// ```
/// use segget::partition;
/// # use std::path::Path;
/// let segs = partition(1000, 3, Path::new("/tmp/dl"))?;
/// assert_eq!(segs.len(), 3);
/// assert_eq!((segs[0].start, segs[0].end), (0, 332));
/// assert_eq!((segs[2].start, segs[2].end), (666, 999));
/// # Ok::<(), segget::DownloadError>(())
/// ```
pub fn partition(total: u64, workers: u8, dir: &Path) -> Result<Vec<Segment>> {
    if workers == 0 {
        return Err(DownloadError::InvalidPartitionRequest);
    }
    if total == 0 {
        return Err(DownloadError::SizeUnavailable);
    }
    let count = (workers as u64).min(total);
    let base = total / count;
    let mut segments = Vec::with_capacity(count as usize);
    for i in 0..count {
        let start = i * base;
        let end = if i == count - 1 {
            total - 1
        } else {
            start + base - 1
        };
        segments.push(Segment {
            index: i as usize,
            start,
            end,
            temp_path: dir.join(format!("part{}", i)),
        });
    }
    Ok(segments)
}

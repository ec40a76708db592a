use segget::{
    start_download, ActionNotifier, DownloadError, DownloadJob, Downloader, PostAction,
    SegmentCause, Url,
};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use warp::hyper::Body;
use warp::Filter;

fn test_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn serve_file(path: PathBuf) -> SocketAddr {
    let route = warp::path("data.bin").and(warp::fs::file(path));
    let (addr, fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(fut);
    addr
}

/// Reports a length on HEAD but answers every range request with a 500
async fn serve_flaky(len: usize) -> SocketAddr {
    let route = warp::path("data.bin")
        .and(warp::header::optional::<String>("range"))
        .map(move |range: Option<String>| {
            if range.is_some() {
                warp::http::Response::builder()
                    .status(500)
                    .body(Vec::new())
                    .unwrap()
            } else {
                warp::http::Response::builder()
                    .status(200)
                    .header("content-length", len)
                    .body(test_body(len))
                    .unwrap()
            }
        });
    let (addr, fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(fut);
    addr
}

/// Drips 1 KiB every 50ms so a job can be paused or cancelled mid-stream
async fn serve_slow(chunks: usize) -> SocketAddr {
    let route = warp::path("data.bin").map(move || {
        let stream = futures::stream::unfold(0usize, move |i| async move {
            if i >= chunks {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            Some((Ok::<_, std::convert::Infallible>(vec![0u8; 1024]), i + 1))
        });
        warp::http::Response::builder()
            .status(200)
            .header("content-length", chunks * 1024)
            .body(Body::wrap_stream(stream))
            .unwrap()
    });
    let (addr, fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(fut);
    addr
}

fn job_for(addr: SocketAddr, output: &Path, workers: u8) -> DownloadJob {
    DownloadJob::builder()
        .url(Url::parse(&format!("http://{}/data.bin", addr)).unwrap())
        .output(output.to_path_buf())
        .workers(workers)
        .build()
        .unwrap()
}

#[tokio::test]
async fn download_round_trip() {
    let _ = pretty_env_logger::try_init();
    let dir = tempdir().unwrap();
    let src = dir.path().join("data.bin");
    // deliberately not divisible by the worker count
    let body = test_body(257 * 1024 + 7);
    std::fs::write(&src, &body).unwrap();
    let addr = serve_file(src).await;

    let out = dir.path().join("out.bin");
    let dl = Downloader::new(job_for(addr, &out, 4)).await.unwrap();
    assert_eq!(dl.length(), body.len() as u64);
    let result = dl.download().await.unwrap();
    assert_eq!(result.bytes, body.len() as u64);
    assert_eq!(result.output, out);

    let merged = std::fs::read(&out).unwrap();
    assert_eq!(Sha256::digest(&merged)[..], Sha256::digest(&body)[..]);
}

#[tokio::test]
async fn single_worker_is_an_unsplit_download() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("data.bin");
    let body = test_body(10_000);
    std::fs::write(&src, &body).unwrap();
    let addr = serve_file(src).await;

    let out = dir.path().join("out.bin");
    let dl = Downloader::new(job_for(addr, &out, 1)).await.unwrap();
    dl.download().await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), body);
}

#[tokio::test]
async fn failed_segment_fails_the_job_and_leaves_no_output() {
    let dir = tempdir().unwrap();
    let addr = serve_flaky(64 * 1024).await;
    let out = dir.path().join("out.bin");

    let dl = Downloader::new(job_for(addr, &out, 3)).await.unwrap();
    assert_eq!(dl.length(), 64 * 1024);
    let err = dl.download().await.unwrap_err();
    match err {
        DownloadError::Fetch(failure) => {
            assert!(!failure.all().is_empty());
            assert!(matches!(
                failure.first().source,
                SegmentCause::Status(status) if status.as_u16() == 500
            ));
        }
        other => panic!("expected fetch failure, got {:?}", other),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn probe_rejects_missing_length() {
    let dir = tempdir().unwrap();
    // chunked response, no content-length and no content-range
    let route = warp::path("data.bin").map(|| {
        let stream =
            futures::stream::once(async { Ok::<_, std::convert::Infallible>(vec![0u8; 16]) });
        warp::http::Response::builder()
            .status(200)
            .body(Body::wrap_stream(stream))
            .unwrap()
    });
    let (addr, fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(fut);

    let out = dir.path().join("out.bin");
    let err = Downloader::new(job_for(addr, &out, 2)).await.unwrap_err();
    assert!(matches!(err, DownloadError::SizeUnavailable));
}

#[tokio::test]
async fn progress_stream_is_monotonic_and_ends_at_one() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("data.bin");
    let body = test_body(128 * 1024);
    std::fs::write(&src, &body).unwrap();
    let addr = serve_file(src).await;

    let out = dir.path().join("out.bin");
    let handle = start_download(job_for(addr, &out, 4));
    let mut rx = handle.progress();
    let collector = tokio::spawn(async move {
        let mut fractions = Vec::new();
        while rx.changed().await.is_ok() {
            fractions.push(rx.borrow().fraction);
        }
        fractions
    });
    handle.join().await.unwrap();
    let fractions = collector.await.unwrap();
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[tokio::test]
async fn cancel_aborts_in_flight_fetchers() {
    let dir = tempdir().unwrap();
    let addr = serve_slow(100).await;
    let out = dir.path().join("out.bin");

    let handle = start_download(job_for(addr, &out, 2));
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.cancel();
    let err = handle.join().await.unwrap_err();
    match err {
        DownloadError::Fetch(failure) => {
            assert!(matches!(failure.first().source, SegmentCause::Cancelled));
        }
        other => panic!("expected fetch failure, got {:?}", other),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn pause_halts_progress_mid_stream() {
    let dir = tempdir().unwrap();
    let addr = serve_slow(200).await;
    let out = dir.path().join("out.bin");

    let handle = start_download(job_for(addr, &out, 2));
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.pause();
    // let in-flight buffered reads drain
    tokio::time::sleep(Duration::from_millis(400)).await;
    let before = handle.latest().downloaded;
    tokio::time::sleep(Duration::from_millis(600)).await;
    let during = handle.latest().downloaded;
    assert_eq!(before, during);
    handle.resume();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let after = handle.latest().downloaded;
    assert!(after > during);
    handle.cancel();
    let _ = handle.join().await;
}

#[derive(Default)]
struct Recorder(Mutex<Option<(PostAction, PathBuf)>>);

impl ActionNotifier for Recorder {
    fn notify(&self, action: PostAction, output: &Path) {
        *self.0.lock().unwrap() = Some((action, output.to_path_buf()));
    }
}

#[tokio::test]
async fn post_action_is_dispatched_after_merge() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("data.bin");
    std::fs::write(&src, test_body(8192)).unwrap();
    let addr = serve_file(src).await;

    let out = dir.path().join("out.bin");
    let job = DownloadJob::builder()
        .url(Url::parse(&format!("http://{}/data.bin", addr)).unwrap())
        .output(out.clone())
        .workers(2u8)
        .post_action(PostAction::OpenFile)
        .build()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut dl = Downloader::new(job).await.unwrap();
    dl.notify_via(recorder.clone());
    dl.download().await.unwrap();

    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(seen, Some((PostAction::OpenFile, out)));
}

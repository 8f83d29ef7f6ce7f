//! Concurrent storage of month buckets.
//!
//! Each bucket becomes one [`StorageJob`]. A fixed pool of workers takes jobs
//! off a shared queue, downloads every URL in the bucket, joins the bodies
//! into a single text blob and hands it to the sink, one object per bucket:
//!
//! ```text
//! ==================== archived message ====================
//! Source: https://groups.google.com/forum/message/raw?msg=golang-nuts/abc/def
//!
//! <raw message>
//! ```
//!
//! The first failure stops the pool from dispatching further jobs. Workers
//! already writing a bucket finish it before the pool returns the error.

use crate::error::{ArchiveError, Result};
use crate::http::{Fetcher, fetch_text};
use crate::models::{ContentKind, StorageJob, UrlMap};
use crate::outputs::sink::StorageSink;
use crate::pool::{JobQueue, clamp_workers};
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Line written before each message in a bucket blob.
pub const CONTENT_DELIMITER: &str = "==================== archived message ====================";

/// Totals reported by the storage pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreReport {
    pub objects_stored: usize,
    pub bytes_written: u64,
}

impl StoreReport {
    fn merge(&mut self, other: StoreReport) {
        self.objects_stored += other.objects_stored;
        self.bytes_written += other.bytes_written;
    }
}

/// One storage job per bucket, in key order.
pub fn storage_jobs(buckets: &UrlMap) -> Vec<StorageJob> {
    buckets
        .iter()
        .map(|(bucket_key, urls)| StorageJob {
            bucket_key: bucket_key.clone(),
            urls: urls.clone(),
        })
        .collect()
}

/// Store every bucket through `sink`, at most `workers` at a time.
///
/// # Arguments
///
/// * `buckets` - Month buckets and the content URLs filed under each
/// * `fetcher` - Downloads every URL of a bucket
/// * `sink` - Receives one concatenated text object per bucket
/// * `workers` - Requested pool size, clamped to `1..=buckets.len()`
/// * `cancel` - Run token; cancelling it stops workers picking up new buckets
///
/// # Returns
///
/// A [`StoreReport`] with the objects stored and bytes written. An empty
/// bucket key fails with [`ArchiveError::EmptyObjectName`] before any fetch,
/// and the first storage or fetch error is returned once running workers drain.
///
/// # Examples
///
/// ```ignore
/// let report = store_all(&aggregate.buckets, fetcher, sink, 4, &cancel).await?;
/// info!(objects = report.objects_stored, bytes = report.bytes_written);
/// ```
#[instrument(level = "info", skip_all, fields(buckets = buckets.len(), workers))]
pub async fn store_all(
    buckets: &UrlMap,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn StorageSink>,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<StoreReport> {
    if buckets.keys().any(|key| key.is_empty()) {
        warn!("Refusing to store a bucket without a name");
        return Err(ArchiveError::EmptyObjectName);
    }

    let jobs = storage_jobs(buckets);
    if jobs.is_empty() {
        info!("No buckets to store");
        return Ok(StoreReport::default());
    }

    let worker_count = clamp_workers(workers, jobs.len());
    let queue = JobQueue::filled(jobs);
    let (results_tx, mut results_rx) = mpsc::channel(worker_count);
    let stop = cancel.child_token();

    let mut join_set = JoinSet::new();
    for worker_idx in 0..worker_count {
        let worker = StorageWorker {
            worker_idx,
            queue: queue.clone(),
            fetcher: Arc::clone(&fetcher),
            sink: Arc::clone(&sink),
            cancel: cancel.clone(),
            stop: stop.clone(),
        };
        let results_tx = results_tx.clone();
        join_set.spawn(async move { worker.run(results_tx).await });
    }
    drop(results_tx);
    info!(worker_count, "Storage workers started");

    let mut total = StoreReport::default();
    let mut failure = None;
    for _ in 0..worker_count {
        match results_rx.recv().await {
            Some(Ok(report)) => total.merge(report),
            Some(Err(e)) => {
                failure = Some(e);
                break;
            }
            None => {
                failure = Some(ArchiveError::WorkerLost { stage: "storage" });
                break;
            }
        }
    }

    if let Some(err) = failure {
        stop.cancel();
        warn!(error = %err, "Storage pool stopping after first failure");
        while join_set.join_next().await.is_some() {}
        return Err(err);
    }

    while join_set.join_next().await.is_some() {}
    info!(
        objects = total.objects_stored,
        bytes = total.bytes_written,
        "Storage complete"
    );
    Ok(total)
}

struct StorageWorker {
    worker_idx: usize,
    queue: JobQueue<StorageJob>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn StorageSink>,
    /// Run-wide token; interrupts in-flight downloads.
    cancel: CancellationToken,
    /// Pool-wide token; stops picking up new jobs.
    stop: CancellationToken,
}

impl StorageWorker {
    async fn run(self, results: mpsc::Sender<Result<StoreReport>>) {
        let mut report = StoreReport::default();
        loop {
            if self.stop.is_cancelled() {
                debug!(worker = self.worker_idx, "Storage worker stopped before next job");
                let _ = results.send(Err(ArchiveError::Cancelled)).await;
                return;
            }
            let Some(job) = self.queue.next().await else {
                break;
            };
            match self.store_bucket(&job).await {
                Ok(bytes) => {
                    report.objects_stored += 1;
                    report.bytes_written += bytes;
                }
                Err(e) => {
                    warn!(
                        worker = self.worker_idx,
                        bucket = %job.bucket_key,
                        error = %e,
                        "Storage worker failed"
                    );
                    let _ = results.send(Err(e)).await;
                    return;
                }
            }
        }
        debug!(worker = self.worker_idx, stored = report.objects_stored, "Storage worker drained queue");
        let _ = results.send(Ok(report)).await;
    }

    async fn store_bucket(&self, job: &StorageJob) -> Result<u64> {
        if job.bucket_key.is_empty() {
            return Err(ArchiveError::EmptyObjectName);
        }

        let mut blob = String::new();
        for url in &job.urls {
            if url.is_empty() {
                debug!(bucket = %job.bucket_key, "Skipping topic without a content link");
                continue;
            }
            let body = fetch_text(self.fetcher.as_ref(), url, &self.cancel).await?;
            append_message(&mut blob, url, &body);
        }

        let object_name = job.bucket_key.object_name();
        let bytes = self
            .sink
            .store(&object_name, &blob, ContentKind::Text)
            .await?;
        info!(
            worker = self.worker_idx,
            object = %object_name,
            flagged = job.bucket_key.is_flagged(),
            messages = job.urls.len(),
            bytes,
            "Stored bucket"
        );
        Ok(bytes)
    }
}

fn append_message(blob: &mut String, url: &str, body: &str) {
    // Writing to a String cannot fail.
    let _ = writeln!(blob, "{CONTENT_DELIMITER}");
    let _ = writeln!(blob, "Source: {url}");
    let _ = writeln!(blob);
    blob.push_str(body);
    if !body.ends_with('\n') {
        blob.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fixtures::FixtureFetcher;
    use crate::models::BucketKey;
    use crate::outputs::sink::fixtures::MemorySink;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn buckets(entries: &[(&str, &[&str])]) -> UrlMap {
        entries
            .iter()
            .map(|(key, urls)| {
                (
                    BucketKey::new(*key),
                    urls.iter().map(|u| u.to_string()).collect(),
                )
            })
            .collect()
    }

    fn fixture() -> FixtureFetcher {
        FixtureFetcher::new()
            .page("https://lists.test/raw/1", "From: a\n\nfirst")
            .page("https://lists.test/raw/2", "From: b\n\nsecond")
            .page("https://lists.test/raw/3", "From: c\n\nthird")
            .page("https://lists.test/raw/4", "From: d\n\nfourth")
    }

    #[tokio::test]
    async fn test_one_sink_call_per_bucket() {
        let map = buckets(&[
            ("2018-09", &["https://lists.test/raw/1", "https://lists.test/raw/2"]),
            ("2018-10", &["https://lists.test/raw/3"]),
            ("flagged", &["https://lists.test/raw/4"]),
        ]);
        let sink = Arc::new(MemorySink::new());
        let report = store_all(
            &map,
            Arc::new(fixture()),
            sink.clone(),
            2,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.objects_stored, 3);
        let calls = sink.calls();
        assert_eq!(calls.len(), 3);
        let names: BTreeSet<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            BTreeSet::from(["2018-09.txt", "2018-10.txt", "flagged.txt"])
        );
        assert!(calls.iter().all(|c| c.kind == ContentKind::Text));

        let september = calls.iter().find(|c| c.name == "2018-09.txt").unwrap();
        assert_eq!(september.content.matches(CONTENT_DELIMITER).count(), 2);
        assert!(september.content.contains("Source: https://lists.test/raw/1\n"));
        assert!(september.content.contains("first"));
        assert!(september.content.contains("second"));
        assert_eq!(
            report.bytes_written,
            calls.iter().map(|c| c.content.len() as u64).sum::<u64>()
        );
    }

    #[tokio::test]
    async fn test_empty_bucket_name_stores_nothing() {
        let map = buckets(&[("", &["https://lists.test/raw/1"]), ("2018-09", &["https://lists.test/raw/2"])]);
        let fetcher = Arc::new(fixture());
        let sink = Arc::new(MemorySink::new());
        let err = store_all(&map, fetcher.clone(), sink.clone(), 4, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::EmptyObjectName));
        assert_eq!(sink.call_count(), 0);
        assert_eq!(fetcher.requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_aggregate_is_a_no_op() {
        let sink = Arc::new(MemorySink::new());
        let report = store_all(
            &UrlMap::new(),
            Arc::new(fixture()),
            sink.clone(),
            0,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report, StoreReport::default());
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_urls_are_skipped() {
        let map = buckets(&[("2018-09", &["", "https://lists.test/raw/1"])]);
        let fetcher = Arc::new(fixture());
        let sink = Arc::new(MemorySink::new());
        store_all(&map, fetcher.clone(), sink.clone(), 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fetcher.requests(), 1);
        let calls = sink.calls();
        assert_eq!(calls[0].content.matches(CONTENT_DELIMITER).count(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_returned_and_nothing_repeats() {
        let map = buckets(&[
            ("2018-08", &["https://lists.test/raw/1"]),
            ("2018-09", &["https://lists.test/raw/2"]),
            ("2018-10", &["https://lists.test/raw/3"]),
            ("2018-11", &["https://lists.test/raw/4"]),
        ]);
        let sink = Arc::new(MemorySink::failing_on("2018-09.txt"));
        let err = store_all(&map, Arc::new(fixture()), sink.clone(), 2, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Storage { ref object, .. } if object == "2018-09.txt"));
        let names: Vec<_> = sink.calls().into_iter().map(|c| c.name).collect();
        let unique: BTreeSet<_> = names.iter().cloned().collect();
        assert_eq!(names.len(), unique.len());
        assert!(!unique.contains("2018-09.txt"));
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_storage() {
        let map = buckets(&[("2018-09", &["https://lists.test/raw/1", "https://lists.test/raw/missing"])]);
        let sink = Arc::new(MemorySink::new());
        let err = store_all(&map, Arc::new(fixture()), sink.clone(), 1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::HttpStatus { status: 404, .. }));
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_drains_without_hanging() {
        let map = buckets(&[
            ("2018-09", &["https://lists.test/raw/1"]),
            ("2018-10", &["https://lists.test/raw/2"]),
        ]);
        let fetcher = Arc::new(fixture().with_delay(Duration::from_secs(60)));
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            store_all(&map, fetcher, sink.clone(), 2, &cancel),
        )
        .await
        .expect("storage pool should drain promptly");

        assert!(matches!(outcome, Err(ArchiveError::Cancelled)));
        assert_eq!(sink.call_count(), 0);
    }
}

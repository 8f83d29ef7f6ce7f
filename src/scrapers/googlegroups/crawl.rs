//! Crawl worker pool and the aggregator that merges its output.
//!
//! Every listing page is a [`CrawlJob`]. Workers pull jobs off a shared
//! queue, resolve each topic row to a raw message URL and file it under a
//! month bucket in a private map. Once the queue is dry each worker reports
//! exactly one [`PartialResult`]; a worker that hits an error reports the
//! error instead and stops.
//!
//! The aggregator waits for one report per worker. Merging is per-key
//! concatenation, so the order reports arrive in only changes the order of
//! URLs inside a bucket, never which URLs end up where.

use crate::dates::{bucket_key, parse_display_date};
use crate::error::{ArchiveError, Result};
use crate::http::{Fetcher, fetch_text};
use crate::models::{Aggregate, BucketKey, CrawlJob, DateWindow, PartialResult, UrlMap};
use crate::pool::{JobQueue, clamp_workers};
use crate::scrapers::googlegroups::GroupRef;
use crate::scrapers::googlegroups::listing::{parse_message_url, parse_topic_rows};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Settings shared by every crawl worker of one run.
#[derive(Clone)]
pub struct CrawlSettings {
    pub group: Arc<GroupRef>,
    pub window: DateWindow,
    /// Date that time-of-day listing entries resolve to.
    pub today: NaiveDate,
    pub fetcher: Arc<dyn Fetcher>,
}

/// Run the crawl pool over `jobs` and merge its output.
///
/// # Arguments
///
/// * `settings` - Group, date window, reference date and fetcher shared by every worker
/// * `jobs` - Listing pages to crawl, usually from [`plan_jobs`](super::listing::plan_jobs)
/// * `workers` - Requested pool size, clamped to `1..=jobs.len()`
/// * `discovered_total` - Listing total the merged item count is checked against
/// * `cancel` - Run token; cancelling it stops the workers and fails the crawl
///
/// # Returns
///
/// The merged [`Aggregate`], with `complete` set when every listed item was
/// filed. The first worker error ends the crawl and is returned instead.
///
/// # Examples
///
/// ```ignore
/// let jobs = plan_jobs(&group.listing_url(), total);
/// let aggregate = crawl_topics(settings, jobs, 8, total, &cancel).await?;
/// info!(items = aggregate.item_count(), complete = aggregate.complete);
/// ```
#[instrument(level = "info", skip_all, fields(group = %settings.group.group, jobs = jobs.len(), workers))]
pub async fn crawl_topics(
    settings: CrawlSettings,
    jobs: Vec<CrawlJob>,
    workers: usize,
    discovered_total: usize,
    cancel: &CancellationToken,
) -> Result<Aggregate> {
    let worker_count = clamp_workers(workers, jobs.len());
    let queue = JobQueue::filled(jobs);
    let (results_tx, mut results_rx) = mpsc::channel(worker_count);
    let stop = cancel.child_token();

    let mut join_set = JoinSet::new();
    for worker_idx in 0..worker_count {
        let worker = CrawlWorker {
            worker_idx,
            queue: queue.clone(),
            settings: settings.clone(),
            stop: stop.clone(),
        };
        let results_tx = results_tx.clone();
        join_set.spawn(async move { worker.run(results_tx).await });
    }
    drop(results_tx);
    info!(worker_count, "Crawl workers started");

    let outcome = aggregate(&mut results_rx, worker_count, discovered_total).await;
    if outcome.is_err() {
        stop.cancel();
    }
    while join_set.join_next().await.is_some() {}
    outcome
}

/// Merge one report from each of `worker_count` workers.
///
/// The first failed report is returned as the error. A closed channel before
/// every worker reported means a worker died without reporting. The merged
/// output is marked complete when its item count equals `discovered_total`.
pub async fn aggregate(
    results: &mut mpsc::Receiver<PartialResult>,
    worker_count: usize,
    discovered_total: usize,
) -> Result<Aggregate> {
    let mut merged = Aggregate::default();
    for received in 0..worker_count {
        let Some(partial) = results.recv().await else {
            warn!(received, expected = worker_count, "Crawl results closed early");
            return Err(ArchiveError::WorkerLost { stage: "crawl" });
        };
        if let Some(err) = partial.err {
            warn!(error = %err, "Crawl worker reported failure");
            return Err(err);
        }
        merge_into(&mut merged, partial.url_map, partial.skipped_rows);
    }

    let item_count = merged.item_count();
    merged.complete = item_count == discovered_total;
    if merged.complete {
        info!(item_count, buckets = merged.buckets.len(), "Crawl complete");
    } else {
        warn!(
            item_count,
            discovered_total,
            skipped_rows = merged.skipped_rows,
            "Crawled item count differs from listing total"
        );
    }
    Ok(merged)
}

fn merge_into(merged: &mut Aggregate, url_map: UrlMap, skipped_rows: usize) {
    for (key, mut urls) in url_map {
        merged.buckets.entry(key).or_default().append(&mut urls);
    }
    merged.skipped_rows += skipped_rows;
}

struct CrawlWorker {
    worker_idx: usize,
    queue: JobQueue<CrawlJob>,
    settings: CrawlSettings,
    stop: CancellationToken,
}

impl CrawlWorker {
    async fn run(self, results: mpsc::Sender<PartialResult>) {
        let mut url_map = UrlMap::new();
        let mut skipped_rows = 0;

        while let Some(job) = self.queue.next().await {
            if let Err(e) = self.crawl_page(&job, &mut url_map, &mut skipped_rows).await {
                warn!(worker = self.worker_idx, url = %job.url, error = %e, "Crawl worker failed");
                let _ = results.send(PartialResult::failed(e)).await;
                return;
            }
        }

        debug!(
            worker = self.worker_idx,
            buckets = url_map.len(),
            skipped_rows,
            "Crawl worker drained queue"
        );
        let _ = results
            .send(PartialResult::completed(url_map, skipped_rows))
            .await;
    }

    async fn crawl_page(
        &self,
        job: &CrawlJob,
        url_map: &mut UrlMap,
        skipped_rows: &mut usize,
    ) -> Result<()> {
        let CrawlSettings {
            group,
            window,
            today,
            fetcher,
        } = &self.settings;

        let html = fetch_text(fetcher.as_ref(), &job.url, &self.stop).await?;
        let rows = parse_topic_rows(&html, &group.group)?;
        debug!(
            worker = self.worker_idx,
            first = job.first,
            last = job.last,
            rows = rows.len(),
            "Parsed listing page"
        );

        for row in rows {
            let key = if row.flagged {
                BucketKey::flagged()
            } else {
                let Some(date_text) = row.date_text.as_deref() else {
                    debug!(topic = %row.topic_id, "Row has no date; ignoring");
                    continue;
                };
                match parse_display_date(date_text, *today) {
                    Ok(date) if window.contains(date) => bucket_key(date),
                    Ok(date) => {
                        debug!(topic = %row.topic_id, %date, "Outside date window");
                        continue;
                    }
                    Err(e) => {
                        warn!(topic = %row.topic_id, error = %e, "Skipping row with unreadable date");
                        *skipped_rows += 1;
                        continue;
                    }
                }
            };

            let topic_html = fetch_text(fetcher.as_ref(), &group.topic_url(&row.topic_id), &self.stop).await?;
            let raw_url = parse_message_url(&topic_html, group, &row.topic_id)?;
            if raw_url.is_empty() {
                warn!(topic = %row.topic_id, "Topic page links no message");
            }
            url_map.entry(key).or_default().push(raw_url);
        }
        Ok(())
    }
}

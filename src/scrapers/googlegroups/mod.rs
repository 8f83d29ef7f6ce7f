//! Google Groups archiving through the escaped-fragment HTML interface.
//!
//! A run for one group goes through four stages:
//!
//! 1. **Discovery**: read the topic total off the listing landing page
//! 2. **Planning**: split the total into 100-item listing pages
//! 3. **Crawl**: resolve every topic row to a raw message URL, bucketed by month
//! 4. **Storage**: download and store each month bucket as one text object

pub mod crawl;
pub mod listing;

use crate::error::{ArchiveError, Result};
use crate::models::RunSummary;
use crate::outputs::fanout::store_all;
use crate::scrapers::ArchiveContext;
use crawl::{CrawlSettings, crawl_topics};
use listing::{discover_total, plan_jobs};
use std::sync::Arc;
use tracing::{info, instrument};

pub const DEFAULT_HOST: &str = "https://groups.google.com";

/// A group on a Google Groups host, optionally under an organization path
/// such as `/a/example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub host: String,
    pub org: String,
    pub group: String,
}

impl GroupRef {
    pub fn new(host: impl Into<String>, org: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            org: org.into(),
            group: group.into(),
        }
    }

    fn forum_base(&self) -> String {
        format!("{}{}/forum", self.host, self.org)
    }

    /// Listing landing page; page ranges are appended to this.
    pub fn listing_url(&self) -> String {
        format!("{}/?_escaped_fragment_=forum/{}", self.forum_base(), self.group)
    }

    pub fn topic_url(&self, topic_id: &str) -> String {
        format!(
            "{}/?_escaped_fragment_=topic/{}/{}",
            self.forum_base(),
            self.group,
            topic_id
        )
    }

    pub fn raw_message_url(&self, topic_id: &str, message_id: &str) -> String {
        format!(
            "{}/message/raw?msg={}/{}/{}",
            self.forum_base(),
            self.group,
            topic_id,
            message_id
        )
    }
}

/// Archive one group: discover, plan, crawl, then store.
#[instrument(level = "info", skip_all, fields(group = %group.group, window = %ctx.window))]
pub async fn archive_group(ctx: &ArchiveContext, group: &GroupRef) -> Result<RunSummary> {
    if group.group.trim().is_empty() {
        return Err(ArchiveError::EmptyGroupName);
    }

    let mut summary = ctx.summary("google-groups", &group.group);
    let listing_url = group.listing_url();
    let total = discover_total(ctx.fetcher.as_ref(), &listing_url, &ctx.cancel).await?;
    summary.discovered_total = total;
    if total == 0 {
        info!("Listing is empty; nothing to archive");
        summary.complete = Some(true);
        return Ok(summary);
    }

    let jobs = plan_jobs(&listing_url, total);
    info!(pages = jobs.len(), "Planned listing pages");

    let settings = CrawlSettings {
        group: Arc::new(group.clone()),
        window: ctx.window,
        today: ctx.today,
        fetcher: Arc::clone(&ctx.fetcher),
    };
    let aggregate = crawl_topics(settings, jobs, ctx.workers, total, &ctx.cancel).await?;
    summary.item_count = aggregate.item_count();
    summary.skipped_rows = aggregate.skipped_rows;
    summary.complete = Some(aggregate.complete);

    let report = store_all(
        &aggregate.buckets,
        Arc::clone(&ctx.fetcher),
        Arc::clone(&ctx.sink),
        ctx.workers,
        &ctx.cancel,
    )
    .await?;
    summary.objects_stored = report.objects_stored;
    summary.bytes_written = report.bytes_written;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fixtures::FixtureFetcher;
    use crate::models::DateWindow;
    use crate::outputs::sink::fixtures::MemorySink;
    use chrono::NaiveDate;
    use tokio_util::sync::CancellationToken;

    const HOST: &str = "https://groups.test";

    fn context(fetcher: Arc<FixtureFetcher>, sink: Arc<MemorySink>, window: DateWindow) -> ArchiveContext {
        ArchiveContext {
            fetcher,
            sink,
            workers: 2,
            window,
            today: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            cancel: CancellationToken::new(),
            subdirectory: "gg-golang-checkins".into(),
        }
    }

    #[test]
    fn test_url_builders() {
        let group = GroupRef::new("https://groups.google.com/", "/a/example.com", "golang-checkins");
        assert_eq!(
            group.listing_url(),
            "https://groups.google.com/a/example.com/forum/?_escaped_fragment_=forum/golang-checkins"
        );
        assert_eq!(
            group.topic_url("8sv65_WCOS4"),
            "https://groups.google.com/a/example.com/forum/?_escaped_fragment_=topic/golang-checkins/8sv65_WCOS4"
        );
        let public = GroupRef::new(DEFAULT_HOST, "", "golang-checkins");
        assert_eq!(
            public.raw_message_url("8sv65_WCOS4", "c3Rr0eUZBQAJ"),
            "https://groups.google.com/forum/message/raw?msg=golang-checkins/8sv65_WCOS4/c3Rr0eUZBQAJ"
        );
    }

    #[tokio::test]
    async fn test_empty_group_name_fails_before_fetching() {
        let fetcher = Arc::new(FixtureFetcher::new());
        let sink = Arc::new(MemorySink::new());
        let ctx = context(fetcher.clone(), sink, DateWindow::all_time());
        let err = archive_group(&ctx, &GroupRef::new(HOST, "", " ")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyGroupName));
        assert_eq!(fetcher.requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_listing_stores_nothing() {
        let group = GroupRef::new(HOST, "", "golang-checkins");
        let fetcher = Arc::new(FixtureFetcher::new().page(group.listing_url(), "<html><p>no topics</p></html>"));
        let sink = Arc::new(MemorySink::new());
        let ctx = context(fetcher.clone(), sink.clone(), DateWindow::all_time());

        let summary = archive_group(&ctx, &group).await.unwrap();
        assert_eq!(summary.discovered_total, 0);
        assert_eq!(summary.complete, Some(true));
        assert_eq!(summary.objects_stored, 0);
        assert_eq!(sink.call_count(), 0);
        assert_eq!(fetcher.requests(), 1);
    }

    #[tokio::test]
    async fn test_archive_group_end_to_end() {
        let group = GroupRef::new(HOST, "", "golang-checkins");
        let row = |topic: &str, date: &str| {
            format!(
                r#"<tr><td><a href="{HOST}/d/topic/golang-checkins/{topic}">{topic}</a></td><td class="lastPostDate">{date}</td></tr>"#
            )
        };
        let topic = |id: &str| format!(r#"<a href="{HOST}/d/msg/golang-checkins/{id}/m{id}">m</a>"#);
        let raw = |id: &str| group.raw_message_url(id, &format!("m{id}"));

        let listing = format!(
            "<i>Showing 1-3 of 3 topics</i><table>{}{}{}</table>",
            row("a", "9/27/18"),
            row("b", "9/3/18"),
            row("c", "10/1/18")
        );
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .page(group.listing_url(), listing.clone())
                .page(format!("{}[1-3]", group.listing_url()), listing)
                .page(group.topic_url("a"), topic("a"))
                .page(group.topic_url("b"), topic("b"))
                .page(group.topic_url("c"), topic("c"))
                .page(raw("a"), "From: gopher\n\nalpha")
                .page(raw("b"), "From: gopher\n\nbeta")
                .page(raw("c"), "From: gopher\n\ngamma"),
        );
        let sink = Arc::new(MemorySink::new());
        let ctx = context(fetcher, sink.clone(), DateWindow::all_time());

        let summary = archive_group(&ctx, &group).await.unwrap();
        assert_eq!(summary.source, "google-groups");
        assert_eq!(summary.subdirectory, "gg-golang-checkins");
        assert_eq!(summary.discovered_total, 3);
        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.complete, Some(true));
        assert_eq!(summary.objects_stored, 2);

        let calls = sink.calls();
        let september = calls.iter().find(|c| c.name == "2018-09.txt").unwrap();
        assert!(september.content.contains("alpha"));
        assert!(september.content.contains("beta"));
        let october = calls.iter().find(|c| c.name == "2018-10.txt").unwrap();
        assert!(october.content.contains("gamma"));
    }
}

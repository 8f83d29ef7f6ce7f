//! Pipermail archives.
//!
//! A Pipermail list index links one gzip file per month:
//!
//! ```html
//! <tr><td>March 2019:</td><td><a href="2019-March/thread.html">[ Thread ]</a></td>
//!     <td><a href="2019-March.txt.gz">[ Gzip'd Text 12 KB ]</a></td></tr>
//! ```
//!
//! Each file whose month overlaps the date window is copied into the sink
//! under a sortable name, `2019-March.txt.gz` becoming `2019-03.txt.gz`.

use crate::error::{ArchiveError, Result};
use crate::http::fetch_text;
use crate::models::{BucketKey, RunSummary};
use crate::scrapers::{ArchiveContext, RemoteObject, store_remote_objects};
use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

pub const DEFAULT_BASE: &str = "https://mail.python.org/pipermail";

/// One monthly gzip archive linked from a list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyArchive {
    /// First day of the archived month.
    pub month: NaiveDate,
    pub url: String,
}

impl MonthlyArchive {
    pub fn object_name(&self) -> String {
        format!("{}.txt.gz", BucketKey::from_date(self.month))
    }
}

pub fn index_url(base: &str, list: &str) -> String {
    format!("{}/{}/", base.trim_end_matches('/'), list)
}

/// Month of an archive file name such as `2019-March.txt.gz`.
fn archive_month(href: &str) -> Option<NaiveDate> {
    let file_name = href.rsplit('/').next()?;
    let stem = file_name.split('.').next()?;
    let (year, month) = stem.split_once('-')?;
    NaiveDate::parse_from_str(&format!("{year}-{month}-01"), "%Y-%B-%d").ok()
}

/// Relative `.gz` links of a list index, resolved against `index`.
pub fn parse_archive_links(html: &str, index: &Url) -> Result<Vec<MonthlyArchive>> {
    let document = Html::parse_document(html);
    let links = Selector::parse("tr td a[href]").map_err(|e| ArchiveError::Selector {
        selector: "tr td a[href]".into(),
        reason: e.to_string(),
    })?;

    let mut archives = Vec::new();
    for href in document.select(&links).filter_map(|a| a.value().attr("href")) {
        if !href.ends_with(".gz") || href.contains("://") {
            continue;
        }
        let Some(month) = archive_month(href) else {
            warn!(href, "Archive name carries no month; skipping");
            continue;
        };
        let url = index.join(href).map_err(|source| ArchiveError::Url {
            url: href.to_string(),
            source,
        })?;
        archives.push(MonthlyArchive {
            month,
            url: url.into(),
        });
    }
    Ok(archives)
}

/// Copy the monthly archives of `list` that fall in the run's window.
#[instrument(level = "info", skip_all, fields(list = %list, window = %ctx.window))]
pub async fn archive_pipermail(ctx: &ArchiveContext, base: &str, list: &str) -> Result<RunSummary> {
    if list.trim().is_empty() {
        return Err(ArchiveError::EmptyGroupName);
    }

    let mut summary = ctx.summary("pipermail", list);
    let index = index_url(base, list);
    let index_url = Url::parse(&index).map_err(|source| ArchiveError::Url {
        url: index.clone(),
        source,
    })?;

    let html = fetch_text(ctx.fetcher.as_ref(), &index, &ctx.cancel).await?;
    let archives = parse_archive_links(&html, &index_url)?;
    summary.discovered_total = archives.len();

    let objects: Vec<RemoteObject> = archives
        .iter()
        .filter(|archive| ctx.window.overlaps_month(archive.month))
        .map(|archive| RemoteObject {
            object_name: archive.object_name(),
            url: archive.url.clone(),
        })
        .collect();
    summary.item_count = objects.len();
    info!(
        linked = archives.len(),
        selected = objects.len(),
        "Selected monthly archives"
    );

    let report = store_remote_objects(ctx, objects).await?;
    summary.objects_stored = report.objects_stored;
    summary.bytes_written = report.bytes_written;
    Ok(summary)
}

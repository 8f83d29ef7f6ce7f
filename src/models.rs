//! Data models shared by the crawl, aggregation and storage stages.
//!
//! - [`BucketKey`]: the `YYYY-MM` month (or the `flagged` sentinel) content is grouped under
//! - [`DateWindow`]: the inclusive date range a run is restricted to
//! - [`CrawlJob`] / [`StorageJob`]: single units of worker-pool work
//! - [`PartialResult`]: one crawl worker's output before merging
//! - [`Aggregate`]: the merged crawl output handed to storage
//! - [`RunSummary`]: per-group outcome, logged and optionally written as JSON

use crate::error::{ArchiveError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Map of month bucket to the content URLs filed under it.
pub type UrlMap = BTreeMap<BucketKey, Vec<String>>;

/// Canonical month key, e.g. `2018-09`.
///
/// Keys are produced from dates by [`BucketKey::from_date`], which is total:
/// every date in the same calendar month maps to the same key. Topics hidden
/// by the list host carry no trustworthy date and are filed under
/// [`BucketKey::flagged`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BucketKey(String);

impl BucketKey {
    pub const FLAGGED: &'static str = "flagged";

    pub fn from_date(date: NaiveDate) -> Self {
        Self(format!("{:04}-{:02}", date.year(), date.month()))
    }

    pub fn flagged() -> Self {
        Self(Self::FLAGGED.to_string())
    }

    /// Wrap an arbitrary key. No validation happens here; the storage stage
    /// rejects empty keys before writing anything.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_flagged(&self) -> bool {
        self.0 == Self::FLAGGED
    }

    /// Name of the text object this bucket is written to.
    pub fn object_name(&self) -> String {
        format!("{}.txt", self.0)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive date range. The all-time window accepts every date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    bounds: Option<(NaiveDate, NaiveDate)>,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ArchiveError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            bounds: Some((start, end)),
        })
    }

    pub fn all_time() -> Self {
        Self { bounds: None }
    }

    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.bounds
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.bounds {
            None => true,
            Some((start, end)) => start <= date && date <= end,
        }
    }

    /// Whether any day of the month starting at `month_start` is in the window.
    pub fn overlaps_month(&self, month_start: NaiveDate) -> bool {
        let Some((start, end)) = self.bounds else {
            return true;
        };
        let month_end = month_start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        month_start <= end && start <= month_end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            None => f.write_str("all-time"),
            Some((start, end)) => write!(f, "{start}..={end}"),
        }
    }
}

/// One listing page to fetch, covering items `first..=last` (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlJob {
    pub url: String,
    pub first: usize,
    pub last: usize,
}

/// Output of a single crawl worker. A worker sends exactly one of these,
/// either carrying its accumulated map or the error that stopped it.
#[derive(Debug, Default)]
pub struct PartialResult {
    pub url_map: UrlMap,
    pub skipped_rows: usize,
    pub err: Option<ArchiveError>,
}

impl PartialResult {
    pub fn completed(url_map: UrlMap, skipped_rows: usize) -> Self {
        Self {
            url_map,
            skipped_rows,
            err: None,
        }
    }

    pub fn failed(err: ArchiveError) -> Self {
        Self {
            err: Some(err),
            ..Self::default()
        }
    }
}

/// Crawl output merged across all workers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub buckets: UrlMap,
    pub skipped_rows: usize,
    /// Item count matched the listing total.
    pub complete: bool,
}

impl Aggregate {
    /// Total number of URLs across every bucket.
    pub fn item_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// One bucket's worth of content to concatenate and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageJob {
    pub bucket_key: BucketKey,
    pub urls: Vec<String>,
}

/// How a sink should interpret the content it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Content is a URL; the sink downloads it and writes the body.
    Url,
    /// Content is the literal text to write.
    Text,
}

/// Outcome of archiving one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub group: String,
    pub subdirectory: String,
    /// Items the listing claimed to hold; zero for sources without a count.
    pub discovered_total: usize,
    pub item_count: usize,
    pub skipped_rows: usize,
    /// Whether the crawl filed every listed item; `None` for sources without
    /// a listing total.
    pub complete: Option<bool>,
    pub objects_stored: usize,
    pub bytes_written: u64,
}

//! Mailman 3 (HyperKitty) mbox exports.
//!
//! HyperKitty exports any date range of a list as a gzipped mbox. The window
//! is cut into calendar months and each month is exported as
//! `YYYY-MM.mbox.gz`, so repeated runs over the same month replace the same
//! object.
//!
//! An all-time run still needs a first month. It comes from `--start-date`
//! when given alongside `--all-dates`, otherwise from the known creation
//! month of the list.

use crate::dates::month_spans;
use crate::error::{ArchiveError, Result};
use crate::models::{BucketKey, DateWindow, RunSummary};
use crate::scrapers::{ArchiveContext, RemoteObject, store_remote_objects};
use chrono::NaiveDate;
use tracing::{info, instrument};

pub const DEFAULT_BASE: &str = "https://mail.python.org";

/// First archived month of lists on the default host.
const KNOWN_ORIGINS: &[(&str, i32, u32)] = &[
    ("python-announce-list", 1999, 4),
    ("python-dev", 1999, 4),
    ("python-ideas", 2006, 12),
];

/// First archived month of `list`, matched on the local part of its address.
pub fn known_origin(list: &str) -> Option<NaiveDate> {
    let name = list.split('@').next().unwrap_or(list).trim();
    KNOWN_ORIGINS
        .iter()
        .find(|(known, ..)| *known == name)
        .and_then(|&(_, year, month)| NaiveDate::from_ymd_opt(year, month, 1))
}

/// Concrete export range for a run.
///
/// A bounded window is used as is. An all-time window runs from `floor`, or
/// the list's [`known_origin`], up to `today`.
pub fn export_range(
    window: &DateWindow,
    list: &str,
    floor: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    if let Some(bounds) = window.bounds() {
        return Ok(bounds);
    }
    let start = floor
        .or_else(|| known_origin(list))
        .ok_or(ArchiveError::UnboundedWindow { archive: "mailman" })?;
    let bounded = DateWindow::new(start, today)?;
    bounded
        .bounds()
        .ok_or(ArchiveError::UnboundedWindow { archive: "mailman" })
}

/// Export URL for `list` (a full address such as `python-dev@python.org`)
/// covering `start..end`.
pub fn export_url(base: &str, list: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}/archives/list/{list}/export/{list}-{}?start={}&end={}",
        base.trim_end_matches('/'),
        export_name(start),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    )
}

fn export_name(month_start: NaiveDate) -> String {
    format!("{}.mbox.gz", BucketKey::from_date(month_start))
}

/// One export per calendar month between `start` and `end`.
pub fn plan_exports(base: &str, list: &str, start: NaiveDate, end: NaiveDate) -> Vec<RemoteObject> {
    month_spans(start, end)
        .into_iter()
        .map(|(span_start, span_end)| RemoteObject {
            object_name: export_name(span_start),
            url: export_url(base, list, span_start, span_end),
        })
        .collect()
}

/// Export every month of the run's window for `list`. `floor` is the first
/// day of an all-time run; see [`export_range`].
#[instrument(level = "info", skip_all, fields(list = %list, window = %ctx.window))]
pub async fn archive_mailman(
    ctx: &ArchiveContext,
    base: &str,
    list: &str,
    floor: Option<NaiveDate>,
) -> Result<RunSummary> {
    if list.trim().is_empty() {
        return Err(ArchiveError::EmptyGroupName);
    }
    let (start, end) = export_range(&ctx.window, list, floor, ctx.today)?;

    let mut summary = ctx.summary("mailman", list);
    let exports = plan_exports(base, list, start, end);
    summary.discovered_total = exports.len();
    summary.item_count = exports.len();
    info!(months = exports.len(), "Planned monthly exports");

    let report = store_remote_objects(ctx, exports).await?;
    summary.objects_stored = report.objects_stored;
    summary.bytes_written = report.bytes_written;
    Ok(summary)
}

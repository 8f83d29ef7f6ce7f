//! Archive sources.
//!
//! Each source turns one list name into stored objects under the run's
//! subdirectory and reports a [`RunSummary`]:
//!
//! | Source | Module | Objects | Notes |
//! |--------|--------|---------|-------|
//! | Google Groups | [`googlegroups`] | `YYYY-MM.txt`, `flagged.txt` | Crawls listing and topic pages |
//! | Pipermail | [`pipermail`] | `YYYY-MM.txt.gz` | Copies the monthly gzip archives |
//! | Mailman 3 | [`mailman`] | `YYYY-MM.mbox.gz` | Exports one mbox per month; needs a bounded window |
//!
//! Sources share an [`ArchiveContext`] carrying the fetcher, sink, worker
//! count, date window and cancellation token for the run.

pub mod googlegroups;
pub mod mailman;
pub mod pipermail;

use crate::error::{ArchiveError, Result};
use crate::http::Fetcher;
use crate::models::{ContentKind, DateWindow, RunSummary};
use crate::outputs::fanout::StoreReport;
use crate::outputs::sink::StorageSink;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Everything a source needs to archive one list.
#[derive(Clone)]
pub struct ArchiveContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub sink: Arc<dyn StorageSink>,
    pub workers: usize,
    pub window: DateWindow,
    pub today: NaiveDate,
    pub cancel: CancellationToken,
    /// Subdirectory the sink writes into, echoed in the summary.
    pub subdirectory: String,
}

impl ArchiveContext {
    /// Empty summary for `group` archived from `source`.
    pub fn summary(&self, source: &str, group: &str) -> RunSummary {
        RunSummary {
            source: source.to_string(),
            group: group.to_string(),
            subdirectory: self.subdirectory.clone(),
            ..RunSummary::default()
        }
    }
}

/// A remote file copied as is into the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub object_name: String,
    pub url: String,
}

/// Store every remote object through the sink, at most `ctx.workers` at a
/// time. The first failure drops the downloads still in flight.
#[instrument(level = "info", skip_all, fields(objects = objects.len(), workers = ctx.workers))]
pub async fn store_remote_objects(
    ctx: &ArchiveContext,
    objects: Vec<RemoteObject>,
) -> Result<StoreReport> {
    let written: Vec<u64> = stream::iter(objects)
        .map(|object| {
            let sink = Arc::clone(&ctx.sink);
            let cancel = ctx.cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
                    stored = sink.store(&object.object_name, &object.url, ContentKind::Url) => {
                        stored.inspect(|bytes| {
                            info!(object = %object.object_name, bytes, "Copied remote archive");
                        })
                    }
                }
            }
        })
        .buffer_unordered(ctx.workers.max(1))
        .try_collect()
        .await?;

    Ok(StoreReport {
        objects_stored: written.len(),
        bytes_written: written.iter().sum(),
    })
}

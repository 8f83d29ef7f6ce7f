//! # List Archiver
//!
//! Copies mailing-list archives into a local directory, grouped by month.
//!
//! ## Features
//!
//! - Crawls Google Groups through its escaped-fragment HTML pages
//! - Copies Pipermail monthly gzip archives
//! - Exports Mailman 3 lists one month at a time
//! - Restricts runs to a date window, or archives everything
//! - Optionally writes a JSON summary of every group run
//!
//! ## Usage
//!
//! ```sh
//! list_archiver -g "golang-checkins golang-nuts" -w 8 -o ./archive
//! ```
//!
//! ## Architecture
//!
//! A Google Groups run is a pipeline:
//! 1. **Discovery**: read the topic total off the first listing page
//! 2. **Planning**: split the total into 100-item listing pages
//! 3. **Crawl**: a worker pool resolves topics to raw message URLs per month
//! 4. **Aggregation**: per-worker results merge into one month map
//! 5. **Storage**: a second worker pool writes one object per month

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod dates;
mod error;
mod http;
mod models;
mod outputs;
mod pool;
mod scrapers;
mod utils;

use cli::{Cli, Source};
use dates::{parse_iso_date, resolve_window};
use error::ArchiveError;
use http::{Fetcher, HttpFetcher, RetryFetch};
use models::DateWindow;
use outputs::sink::LocalDirSink;
use outputs::summary::write_summaries;
use scrapers::googlegroups::{self, GroupRef};
use scrapers::{ArchiveContext, mailman, pipermail};
use utils::truncate_for_log;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("list_archiver starting up");

    let args = Cli::parse();
    debug!(source = %args.source, groups = ?args.group_names, output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    if args.group_names.iter().any(|g| g.trim().is_empty()) {
        error!("Group names must not be empty");
        return Err(ArchiveError::EmptyGroupName.into());
    }

    let today = Local::now().date_naive();
    let window = if args.all_dates {
        DateWindow::all_time()
    } else {
        resolve_window(args.start_date.as_deref(), args.end_date.as_deref(), today)?
    };
    // All-time Mailman runs start their exports here.
    let floor = match args.start_date.as_deref().filter(|_| args.all_dates) {
        Some(value) => Some(parse_iso_date("start", value)?),
        None => None,
    };
    info!(%window, ?floor, workers = args.workers, "Resolved date window");

    let http = HttpFetcher::new(Duration::from_secs(args.timeout_secs))?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(RetryFetch::new(
        http.clone(),
        args.max_retries,
        Duration::from_secs(1),
    ));

    // Ctrl-C cancels every in-flight fetch and stops the pools.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            on_signal.cancel();
        }
    });

    let mut summaries = Vec::with_capacity(args.group_names.len());
    for (index, group) in args.group_names.iter().enumerate() {
        let subdirectory = args.subdirectory_for(index, group);
        let sink = LocalDirSink::new(&args.output_dir, &subdirectory, http.clone()).await?;
        debug!(dir = %sink.dir().display(), "Prepared output directory");
        let ctx = ArchiveContext {
            fetcher: Arc::clone(&fetcher),
            sink: Arc::new(sink),
            workers: args.workers,
            window,
            today,
            cancel: cancel.clone(),
            subdirectory,
        };

        info!(source = %args.source, %group, subdirectory = %ctx.subdirectory, "Archiving group");
        let outcome = match args.source {
            Source::GoogleGroups => {
                let host = args.base_url.as_deref().unwrap_or(googlegroups::DEFAULT_HOST);
                googlegroups::archive_group(&ctx, &GroupRef::new(host, args.org.as_str(), group.as_str())).await
            }
            Source::Pipermail => {
                let base = args.base_url.as_deref().unwrap_or(pipermail::DEFAULT_BASE);
                pipermail::archive_pipermail(&ctx, base, group).await
            }
            Source::Mailman => {
                let base = args.base_url.as_deref().unwrap_or(mailman::DEFAULT_BASE);
                mailman::archive_mailman(&ctx, base, group, floor).await
            }
        };

        match outcome {
            Ok(summary) => {
                info!(
                    %group,
                    discovered = summary.discovered_total,
                    items = summary.item_count,
                    skipped_rows = summary.skipped_rows,
                    complete = ?summary.complete,
                    objects = summary.objects_stored,
                    bytes = summary.bytes_written,
                    "Group archived"
                );
                summaries.push(summary);
            }
            Err(e) => {
                error!(%group, error = %truncate_for_log(&e.to_string(), 300), "Archiving failed");
                return Err(e.into());
            }
        }
    }

    if let Some(path) = args.summary_json.as_deref() {
        write_summaries(&summaries, path).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        groups = summaries.len(),
        "Execution complete"
    );

    Ok(())
}

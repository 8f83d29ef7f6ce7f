//! JSON run report.
//!
//! With `--summary-json` the binary writes one [`RunSummary`] per archived
//! group into a single pretty-printed JSON array:
//!
//! ```text
//! [
//!   {
//!     "source": "google-groups",
//!     "group": "golang-checkins",
//!     "subdirectory": "gg-golang-checkins",
//!     "discovered_total": 2386,
//!     ...
//!   }
//! ]
//! ```

use crate::error::{ArchiveError, Result};
use crate::models::RunSummary;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `summaries` to `path`, creating parent directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), runs = summaries.len()))]
pub async fn write_summaries(summaries: &[RunSummary], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summaries)?;
    let label = path.display().to_string();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(parent = %parent.display(), error = %e, "Failed to create summary dir");
            return Err(ArchiveError::storage(&label, e));
        }
    }

    fs::write(path, json)
        .await
        .map_err(|e| ArchiveError::storage(&label, e))?;
    info!("Wrote run summary");
    Ok(())
}

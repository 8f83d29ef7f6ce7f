//! Storage sinks that archived objects are written through.
//!
//! The pipeline only depends on [`StorageSink`]. The binary uses
//! [`LocalDirSink`], which lays objects out on disk as:
//!
//! ```text
//! output_dir/
//! └── gg-golang-nuts/
//!     ├── 2018-09.txt
//!     ├── 2018-10.txt
//!     └── flagged.txt
//! ```
//!
//! Writing an object name twice replaces the earlier object, so reruns that
//! overlap earlier ones are safe.

use crate::error::{ArchiveError, Result};
use crate::http::HttpFetcher;
use crate::models::ContentKind;
use crate::utils::ensure_writable_dir;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Write one object and return the number of bytes written.
    ///
    /// With [`ContentKind::Url`] `content` is a URL whose body is downloaded
    /// and written; with [`ContentKind::Text`] `content` is written as is.
    async fn store(&self, object_name: &str, content: &str, kind: ContentKind) -> Result<u64>;
}

/// Sink writing objects into a directory on the local file system.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
    http: HttpFetcher,
}

impl LocalDirSink {
    /// Prepare `root/subdirectory`, failing early if it is not writable.
    pub async fn new(root: &Path, subdirectory: &str, http: HttpFetcher) -> Result<Self> {
        let dir = root.join(subdirectory);
        ensure_writable_dir(&dir).await?;
        Ok(Self { dir, http })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_text(&self, path: &Path, object_name: &str, content: &str) -> Result<u64> {
        fs::write(path, content)
            .await
            .map_err(|e| ArchiveError::storage(object_name, e))?;
        Ok(content.len() as u64)
    }

    async fn write_url(&self, path: &Path, object_name: &str, url: &str) -> Result<u64> {
        let mut response = self.http.get(url).await?;
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| ArchiveError::storage(object_name, e))?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| ArchiveError::storage(object_name, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ArchiveError::storage(object_name, e))?;
        Ok(written)
    }
}

#[async_trait]
impl StorageSink for LocalDirSink {
    #[instrument(level = "info", skip(self, content), fields(dir = %self.dir.display()))]
    async fn store(&self, object_name: &str, content: &str, kind: ContentKind) -> Result<u64> {
        if object_name.is_empty() {
            return Err(ArchiveError::EmptyObjectName);
        }
        let final_path = self.dir.join(object_name);
        let partial_path = self.dir.join(format!("{object_name}.partial"));

        let written = match kind {
            ContentKind::Text => self.write_text(&partial_path, object_name, content).await,
            ContentKind::Url => self.write_url(&partial_path, object_name, content).await,
        };
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial_path).await;
                return Err(e);
            }
        };

        fs::rename(&partial_path, &final_path)
            .await
            .map_err(|e| ArchiveError::storage(object_name, e))?;
        debug!(path = %final_path.display(), "Renamed partial object into place");
        info!(bytes = written, ?kind, "Stored object");
        Ok(written)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn sink_in(tmp: &tempfile::TempDir) -> LocalDirSink {
        let http = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        LocalDirSink::new(tmp.path(), "gg-golang-checkins", http)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_objects_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(&tmp).await;

        sink.store("2018-09.txt", "first run", ContentKind::Text).await.unwrap();
        let written = sink
            .store("2018-09.txt", "second run", ContentKind::Text)
            .await
            .unwrap();

        assert_eq!(written, 10);
        let on_disk = std::fs::read_to_string(sink.dir().join("2018-09.txt")).unwrap();
        assert_eq!(on_disk, "second run");
        assert!(!sink.dir().join("2018-09.txt.partial").exists());
    }

    #[tokio::test]
    async fn test_empty_object_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(&tmp).await;
        let err = sink.store("", "content", ContentKind::Text).await.unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyObjectName));
    }

    #[tokio::test]
    async fn test_url_objects_stream_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pipermail/python-dev/2019-March.txt.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(&tmp).await;
        let url = format!("{}/pipermail/python-dev/2019-March.txt.gz", server.uri());
        let written = sink
            .store("2019-03.txt.gz", &url, ContentKind::Url)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        let bytes = std::fs::read(sink.dir().join("2019-03.txt.gz")).unwrap();
        assert_eq!(bytes.len(), 4096);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(&tmp).await;
        let url = format!("{}/missing.gz", server.uri());
        let err = sink
            .store("2019-04.txt.gz", &url, ContentKind::Url)
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::HttpStatus { status: 500, .. }));
        assert!(!sink.dir().join("2019-04.txt.gz").exists());
    }
}

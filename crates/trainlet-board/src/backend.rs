//! Visualization backend seam and the directory-serving implementation

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use trainlet_core::{TrainletError, TrainletResult};

use crate::request::{BackendRequest, BackendResponse};

/// A per-job visualization handler
#[async_trait]
pub trait BackendHandler: Send + Sync {
    /// Serve one backend-relative request
    async fn handle(&self, request: BackendRequest) -> TrainletResult<BackendResponse>;

    /// Best-effort: stop internal background refresh work before the
    /// handler is discarded. Must not fail.
    async fn shutdown(&self);
}

/// Builds a handler for a run's backing directory
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Build a handler rooted at `logdir`, generating links against
    /// `mount_prefix`
    async fn build(
        &self,
        logdir: &Path,
        mount_prefix: &str,
    ) -> TrainletResult<Arc<dyn BackendHandler>>;
}

/// How often the directory backend rescans its logdir
const RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Backend that serves a run's log directory: an HTML index at the root
/// and raw files under `files/`.
///
/// A background task rescans the directory so new event files appear
/// without a rebuild; `shutdown` stops it. That internal polling is
/// exactly why backend traffic does not count as session liveness.
pub struct LogdirBackend {
    logdir: PathBuf,
    mount_prefix: String,
    files: Arc<RwLock<Vec<String>>>,
    rescan_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LogdirBackend {
    /// Build a backend for `logdir` and start its rescan task
    pub async fn open(logdir: &Path, mount_prefix: &str) -> TrainletResult<Self> {
        if !logdir.is_dir() {
            return Err(TrainletError::DirectoryMissing(
                logdir.display().to_string(),
            ));
        }

        let files = Arc::new(RwLock::new(scan_dir(logdir).await?));

        let rescan_files = Arc::clone(&files);
        let rescan_dir = logdir.to_path_buf();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RESCAN_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match scan_dir(&rescan_dir).await {
                    Ok(names) => *rescan_files.write().await = names,
                    Err(e) => {
                        warn!(logdir = %rescan_dir.display(), error = %e, "Logdir rescan failed")
                    }
                }
            }
        });

        Ok(Self {
            logdir: logdir.to_path_buf(),
            mount_prefix: mount_prefix.to_string(),
            files,
            rescan_task: std::sync::Mutex::new(Some(task)),
        })
    }

    async fn index_page(&self) -> BackendResponse {
        let files = self.files.read().await;
        let mut html = String::from("<!doctype html><html><body><h1>Run logs</h1><ul>");
        for name in files.iter() {
            html.push_str(&format!(
                "<li><a href=\"{}/files/{}\">{}</a></li>",
                self.mount_prefix, name, name
            ));
        }
        html.push_str("</ul></body></html>");
        BackendResponse::ok("text/html", html.into_bytes())
    }

    async fn serve_file(&self, name: &str) -> TrainletResult<BackendResponse> {
        // Only names from the scan are served; this also rules out
        // traversal through the URL
        let known = self.files.read().await.iter().any(|f| f == name);
        if !known {
            return Ok(BackendResponse::not_found());
        }

        let body = tokio::fs::read(self.logdir.join(name)).await?;
        Ok(BackendResponse::ok("application/octet-stream", body))
    }
}

#[async_trait]
impl BackendHandler for LogdirBackend {
    async fn handle(&self, request: BackendRequest) -> TrainletResult<BackendResponse> {
        if request.path == "/" {
            return Ok(self.index_page().await);
        }

        if let Some(name) = request.path.strip_prefix("/files/") {
            return self.serve_file(name).await;
        }

        Ok(BackendResponse::not_found())
    }

    async fn shutdown(&self) {
        if let Some(task) = self.rescan_task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
            debug!(logdir = %self.logdir.display(), "Stopped logdir rescan");
        }
    }
}

/// Factory producing [`LogdirBackend`] handlers
#[derive(Default)]
pub struct LogdirBackendFactory;

#[async_trait]
impl BackendFactory for LogdirBackendFactory {
    async fn build(
        &self,
        logdir: &Path,
        mount_prefix: &str,
    ) -> TrainletResult<Arc<dyn BackendHandler>> {
        let backend = LogdirBackend::open(logdir, mount_prefix).await?;
        Ok(Arc::new(backend))
    }
}

/// Regular file names in `dir`, sorted
async fn scan_dir(dir: &Path) -> TrainletResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn logdir_with_files() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("events.out"), b"scalar data")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("meta.json"), b"{}")
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_index_links_use_mount_prefix() {
        let dir = logdir_with_files().await;
        let backend = LogdirBackend::open(dir.path(), "/job123").await.unwrap();

        let response = backend.handle(BackendRequest::path("/")).await.unwrap();
        assert_eq!(response.status, 200);

        let html = String::from_utf8(response.body).unwrap();
        assert!(html.contains("/job123/files/events.out"));
        assert!(html.contains("/job123/files/meta.json"));

        backend.shutdown().await;
    }

    #[tokio::test]
    async fn test_serve_file() {
        let dir = logdir_with_files().await;
        let backend = LogdirBackend::open(dir.path(), "/job123").await.unwrap();

        let response = backend
            .handle(BackendRequest::path("/files/events.out"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"scalar data");

        backend.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_paths_are_404() {
        let dir = logdir_with_files().await;
        let backend = LogdirBackend::open(dir.path(), "/job123").await.unwrap();

        let response = backend
            .handle(BackendRequest::path("/files/absent.bin"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);

        let response = backend
            .handle(BackendRequest::path("/files/../secret"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);

        let response = backend
            .handle(BackendRequest::path("/elsewhere"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);

        backend.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_fails_on_missing_dir() {
        let factory = LogdirBackendFactory;
        let result = factory
            .build(Path::new("/nonexistent/trainlet/logdir"), "/job123")
            .await;
        assert!(result.is_err());
    }
}

//! Default persistence hook writing pages as plain files

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::traits::TaskCommitter;
use crate::error::{Error, Result};
use crate::types::PersistenceTask;

/// Extension used when the page URL carries none
pub const DEFAULT_PAGE_EXTENSION: &str = "jpg";

/// Writes every page to `<chapter dir>/page 0001.<ext>`
///
/// The extension is taken from the page URL's path. Pages finish out of order,
/// the 1-based index keeps the on-disk order correct.
#[derive(Clone, Debug, Default)]
pub struct DiskCommitter;

impl DiskCommitter {
    /// Target file of a task
    pub fn page_path(task: &PersistenceTask) -> PathBuf {
        task.target_dir.join(format!(
            "page {:04}.{}",
            task.source.index,
            page_extension(&task.source.url)
        ))
    }
}

/// Lowercased extension of the last URL path segment
fn page_extension(page_url: &str) -> String {
    url::Url::parse(page_url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty() && e.len() <= 5)
                .map(str::to_ascii_lowercase)
        })
        .unwrap_or_else(|| DEFAULT_PAGE_EXTENSION.to_string())
}

#[async_trait]
impl TaskCommitter for DiskCommitter {
    async fn commit_task(&self, cancel: &CancellationToken, task: PersistenceTask) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let path = Self::page_path(&task);
        tokio::fs::write(&path, &task.data)
            .await
            .map_err(|e| Error::Persistence {
                path: path.clone(),
                message: e.to_string(),
            })?;

        tracing::trace!(path = %path.display(), bytes = task.data.len(), "page written");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DownloadTask;

    fn task(dir: &Path, index: usize, url: &str) -> PersistenceTask {
        PersistenceTask {
            data: b"page".to_vec(),
            target_dir: dir.to_path_buf(),
            source: DownloadTask {
                index,
                url: url.to_string(),
            },
        }
    }

    #[test]
    fn extension_comes_from_url_path() {
        assert_eq!(page_extension("https://cdn.example.com/a/b/003.PNG?token=x"), "png");
        assert_eq!(page_extension("https://cdn.example.com/a/b/003.webp"), "webp");
        assert_eq!(page_extension("https://cdn.example.com/a/b/003"), "jpg");
        assert_eq!(page_extension("not a url"), "jpg");
    }

    #[tokio::test]
    async fn writes_padded_page_file() {
        let dir = tempfile::tempdir().unwrap();

        DiskCommitter
            .commit_task(
                &CancellationToken::new(),
                task(dir.path(), 7, "https://cdn.example.com/7.png"),
            )
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("page 0007.png")).unwrap();
        assert_eq!(written, b"page");
    }

    #[tokio::test]
    async fn missing_directory_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");

        let err = DiskCommitter
            .commit_task(&CancellationToken::new(), task(&gone, 1, "https://x.test/1.jpg"))
            .await
            .unwrap_err();

        match err {
            Error::Persistence { path, .. } => assert_eq!(path, gone.join("page 0001.jpg")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = DiskCommitter
            .commit_task(&cancel, task(dir.path(), 1, "https://x.test/1.jpg"))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dir.path().join("page 0001.jpg").exists());
    }
}

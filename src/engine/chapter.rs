//! Chapter download context: rate-limited page fetching with one retry pass
//!
//! A chapter is downloaded by a producer feeding a bounded task queue and a
//! fixed number of worker slots draining it. Fetched pages go straight onto the
//! session-wide persistence queue. Pages that fail are collected and retried
//! once, after the first pass has fully drained. A failure on the retry pass
//! lands in the chapter's error slot, which cancels the chapter.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::counters::{ErrorSlot, SessionCounters};
use crate::error::{DownloadError, Error, Result};
use crate::planner::DownloadPlan;
use crate::providers::{Chapter, ContentProvider, Transport};
use crate::rate_limiter::RateLimiter;
use crate::tags::TagMapper;
use crate::types::{DownloadTask, PersistenceTask, SessionId};

/// Chapters with fewer pages than this get a courtesy delay
pub(crate) const SMALL_CHAPTER_PAGES: usize = 5;

/// Delay after a small chapter, dampens request bursts for very short chapters
pub(crate) const SMALL_CHAPTER_DELAY: Duration = Duration::from_secs(1);

/// Parameters for downloading one chapter
pub(crate) struct ChapterParams<'a, C> {
    pub(crate) session_id: &'a SessionId,
    pub(crate) chapter: &'a C,
    /// Directory the pages are written to
    pub(crate) target_dir: PathBuf,
    pub(crate) content: &'a dyn ContentProvider<C>,
    /// Handed to the metadata hook
    pub(crate) tags: &'a TagMapper,
    pub(crate) transport: &'a dyn Transport,
    pub(crate) counters: &'a SessionCounters,
    /// Session-wide persistence queue
    pub(crate) io_tx: &'a mpsc::Sender<PersistenceTask>,
    /// Receives the chapter directory the moment it is created
    pub(crate) plan: &'a Mutex<DownloadPlan<C>>,
    pub(crate) max_images: usize,
    pub(crate) session_token: &'a CancellationToken,
}

/// Download every page of one chapter
///
/// Returns `Ok(())` for a chapter without pages. Returns [`Error::Cancelled`]
/// when the session was cancelled, or the chapter's first fatal error.
pub(crate) async fn download_chapter<C: Chapter>(params: ChapterParams<'_, C>) -> Result<()> {
    let ChapterParams {
        session_id,
        chapter,
        target_dir,
        content,
        tags,
        transport,
        counters,
        io_tx,
        plan,
        max_images,
        session_token,
    } = params;

    let token = session_token.child_token();
    let label = chapter.label();

    let urls = content.content_urls(&token, chapter).await?;
    if urls.is_empty() {
        tracing::warn!(
            session_id = %session_id,
            chapter = %label,
            "no pages found for chapter, skipping"
        );
        return Ok(());
    }

    tokio::fs::create_dir_all(&target_dir)
        .await
        .map_err(|e| DownloadError::DirectoryFailed {
            path: target_dir.clone(),
            reason: e.to_string(),
        })?;
    plan.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .has_downloaded
        .push(target_dir.clone());

    if let Err(e) = content.write_content_metadata(&token, chapter, tags).await {
        if e.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::warn!(session_id = %session_id, chapter = %label, error = %e, "failed to write metadata");
    }

    counters.start_chapter(urls.len());
    tracing::debug!(session_id = %session_id, chapter = %label, size = urls.len(), "starting download");
    let start = Instant::now();

    let ctx = ChapterContext {
        session_id,
        label: &label,
        target_dir: &target_dir,
        transport,
        counters,
        io_tx,
        rate_limiter: RateLimiter::new(max_images as u64, max_images as u64),
        errors: ErrorSlot::new(token.clone()),
        token: &token,
        workers: max_images.max(1),
    };

    let failed = ctx.first_pass(&urls).await;
    if !failed.is_empty() && !token.is_cancelled() {
        tracing::debug!(
            session_id = %session_id,
            chapter = %label,
            failed = failed.len(),
            "retrying failed pages"
        );
        ctx.retry_pass(failed).await;
    }

    if let Some(e) = ctx.errors.take() {
        return Err(e);
    }
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if urls.len() < SMALL_CHAPTER_PAGES {
        tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(SMALL_CHAPTER_DELAY) => {}
        }
    }

    counters.chapter_downloaded();
    tracing::debug!(
        session_id = %session_id,
        chapter = %label,
        elapsed = ?start.elapsed(),
        "finished downloading chapter"
    );
    Ok(())
}

/// State shared by the worker slots of one chapter
struct ChapterContext<'a> {
    session_id: &'a SessionId,
    label: &'a str,
    target_dir: &'a PathBuf,
    transport: &'a dyn Transport,
    counters: &'a SessionCounters,
    io_tx: &'a mpsc::Sender<PersistenceTask>,
    rate_limiter: RateLimiter,
    errors: ErrorSlot,
    token: &'a CancellationToken,
    workers: usize,
}

impl ChapterContext<'_> {
    /// Feed every URL through the task queue; returns the tasks that failed
    async fn first_pass(&self, urls: &[String]) -> Vec<DownloadTask> {
        let (task_tx, task_rx) = mpsc::channel::<DownloadTask>(self.workers);
        let token = self.token.clone();

        let producer = async move {
            for (i, url) in urls.iter().enumerate() {
                let task = DownloadTask {
                    index: i + 1,
                    url: url.clone(),
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = task_tx.send(task) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let workers = ReceiverStream::new(task_rx)
            .map(|task| self.fetch(task, false))
            .buffer_unordered(self.workers)
            .filter_map(|failed| futures::future::ready(failed))
            .collect::<Vec<_>>();

        let ((), failed) = tokio::join!(producer, workers);
        failed
    }

    async fn retry_pass(&self, failed: Vec<DownloadTask>) {
        stream::iter(failed)
            .map(|task| self.fetch(task, true))
            .buffer_unordered(self.workers)
            .for_each(|_| async {})
            .await;
    }

    /// Fetch one page. Returns the task when it failed on the first pass.
    async fn fetch(&self, task: DownloadTask, is_retry: bool) -> Option<DownloadTask> {
        if self.token.is_cancelled() {
            return None;
        }
        if self.rate_limiter.until_ready(self.token).await.is_err() {
            return None;
        }

        match self.transport.fetch_bytes(self.token, &task.url).await {
            Ok(data) => {
                self.counters.image_downloaded();
                self.persist(PersistenceTask {
                    data,
                    target_dir: self.target_dir.clone(),
                    source: task,
                })
                .await;
                None
            }
            Err(e) if e.is_cancelled() => None,
            Err(e) if !is_retry => {
                self.counters.download_failed();
                tracing::warn!(
                    session_id = %self.session_id,
                    chapter = %self.label,
                    idx = task.index,
                    url = %task.url,
                    error = %e,
                    "download failed, will retry"
                );
                Some(task)
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    chapter = %self.label,
                    idx = task.index,
                    url = %task.url,
                    error = %e,
                    "final download failed"
                );
                self.errors.set(
                    DownloadError::PageFailed {
                        index: task.index,
                        url: task.url,
                        reason: e.to_string(),
                    }
                    .into(),
                );
                None
            }
        }
    }

    /// Push a fetched page onto the persistence queue, waiting while it is full
    async fn persist(&self, task: PersistenceTask) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            sent = self.io_tx.send(task) => {
                if sent.is_err() && !self.token.is_cancelled() {
                    self.errors.set(Error::Other(
                        "persistence stage stopped before the chapter finished".into(),
                    ));
                }
            }
        }
    }
}

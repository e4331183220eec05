//! Session orchestration: top-level lifecycle of one download run

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::chapter::{ChapterParams, download_chapter};
use super::counters::ErrorSlot;
use super::persistence::{PersistenceParams, spawn_persistence_stage};
use super::progress::{ProgressReporterParams, progress_event, spawn_progress_reporter};
use super::session::{Session, lock};
use crate::error::{Error, Result};
use crate::naming::ContentNaming;
use crate::providers::Chapter;
use crate::types::{ContentState, Event, Outcome, PersistenceTask};

impl<C> Session<C>
where
    C: Chapter + Clone + 'static,
{
    /// Run the session to completion
    ///
    /// Phases:
    /// 1. Derive the session token from `parent`
    /// 2. Prepare the plan if the host did not, then apply the user selection
    /// 3. Start the progress reporter and the persistence stage
    /// 4. Download every planned chapter, in order, stopping at the first failure
    /// 5. Close the persistence queue and wait for it to drain
    /// 6. Finalize, or abort when a stage failed
    ///
    /// Failures during the download end the session with [`Outcome::Aborted`];
    /// they are not returned as errors. Running a session twice returns the
    /// first outcome.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when the session is already downloading.
    pub async fn run(&self, parent: &CancellationToken) -> Result<Outcome> {
        if let Some(outcome) = self.outcome() {
            return Ok(outcome);
        }
        let state = self.state();
        if matches!(state, ContentState::Downloading | ContentState::Cleanup) {
            return Err(Error::InvalidState {
                operation: "run".to_string(),
                state,
            });
        }

        // Phase 1: session token
        let token = parent.child_token();
        *lock(&self.cancel_token) = Some(token.clone());
        if self.cancel_requested.load(std::sync::atomic::Ordering::Acquire) {
            token.cancel();
        }
        if token.is_cancelled() {
            return Ok(self.store_outcome(Outcome::Cancelled));
        }

        // Phase 2: plan
        self.prepare().await?;
        if let Some(outcome) = self.outcome() {
            return Ok(outcome);
        }

        let naming = self.naming();
        let chapters = {
            let selection = std::mem::take(&mut *lock(&self.selection));
            let mut plan = lock(&self.plan);
            plan.apply_user_selection(&selection);
            plan.to_download.clone()
        };
        if chapters.is_empty() {
            return Ok(self.finish_empty().await);
        }

        // Phase 3: background stages
        self.set_state(ContentState::Downloading);
        let workers = self.config.max_concurrent_images();
        let (io_tx, io_rx) = mpsc::channel::<PersistenceTask>(workers * 2);
        let failure = Arc::new(ErrorSlot::new(token.clone()));

        let reporter_token = token.child_token();
        let reporter = spawn_progress_reporter(ProgressReporterParams {
            id: self.id.clone(),
            size: chapters.len(),
            counters: Arc::clone(&self.counters),
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
            interval: self.options.progress_interval,
            cancel_token: reporter_token.clone(),
        });
        let persistence = spawn_persistence_stage(PersistenceParams {
            session_id: self.id.clone(),
            io_rx,
            committer: Arc::clone(&self.providers.committer),
            workers: workers * 2,
            failure: Arc::clone(&failure),
            cancel_token: token.clone(),
        });

        tracing::info!(
            session_id = %self.id,
            title = self.title(),
            chapters = chapters.len(),
            "starting download"
        );

        // Phase 4: chapters, the queue closes when `io_tx` is dropped
        self.download_chapters(&chapters, &naming, io_tx, &token, &failure)
            .await;

        // Phase 5: drain
        self.set_state(ContentState::Cleanup);
        if let Err(e) = persistence.await {
            tracing::error!(session_id = %self.id, error = %e, "persistence stage panicked");
            failure.set(Error::Other(format!("persistence stage panicked: {e}")));
        }
        reporter_token.cancel();
        reporter.await.ok();

        // Phase 6: end of session
        let outcome = if let Some(reason) = failure.take() {
            self.abort(reason).await
        } else if token.is_cancelled() {
            tracing::info!(session_id = %self.id, "download cancelled");
            Outcome::Cancelled
        } else {
            self.finalize().await
        };
        Ok(self.store_outcome(outcome))
    }

    async fn download_chapters(
        &self,
        chapters: &[C],
        naming: &ContentNaming,
        io_tx: mpsc::Sender<PersistenceTask>,
        token: &CancellationToken,
        failure: &ErrorSlot,
    ) {
        let workers = self.config.max_concurrent_images();
        let tags = self.tag_mapper();

        for chapter in chapters {
            if token.is_cancelled() {
                break;
            }

            let start = Instant::now();
            let before = self.counters.content_downloaded();
            let result = download_chapter(ChapterParams {
                session_id: &self.id,
                chapter,
                target_dir: naming.content_path(chapter),
                content: self.providers.content.as_ref(),
                tags: &tags,
                transport: self.providers.transport.as_ref(),
                counters: &self.counters,
                io_tx: &io_tx,
                plan: &self.plan,
                max_images: workers,
                session_token: token,
            })
            .await;

            match result {
                Ok(()) => {
                    if self.counters.content_downloaded() > before {
                        self.event_tx
                            .send(Event::ChapterCompleted {
                                id: self.id.clone(),
                                chapter_id: chapter.id().to_string(),
                            })
                            .ok();
                    }
                    self.event_tx
                        .send(progress_event(
                            &self.id,
                            chapters.len(),
                            &self.counters,
                            self.state(),
                            start.elapsed(),
                        ))
                        .ok();
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::error!(
                        session_id = %self.id,
                        chapter = %chapter.label(),
                        error = %e,
                        "error downloading chapter"
                    );
                    failure.set(e);
                    break;
                }
            }
        }
    }

    fn store_outcome(&self, outcome: Outcome) -> Outcome {
        *lock(&self.outcome) = Some(outcome.clone());
        outcome
    }
}

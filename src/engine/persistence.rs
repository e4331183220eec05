//! Persistence stage: drains the session-wide queue into the commit hook

use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::counters::ErrorSlot;
use crate::providers::TaskCommitter;
use crate::types::{PersistenceTask, SessionId};

/// Parameters for spawning the persistence stage
pub(crate) struct PersistenceParams {
    pub(crate) session_id: SessionId,
    pub(crate) io_rx: mpsc::Receiver<PersistenceTask>,
    pub(crate) committer: Arc<dyn TaskCommitter>,
    /// Concurrent commits
    pub(crate) workers: usize,
    /// Session failure cell; the first commit error lands here and cancels the session
    pub(crate) failure: Arc<ErrorSlot>,
    pub(crate) cancel_token: CancellationToken,
}

/// Spawn the persistence stage for one session
///
/// The stage runs until the queue is closed and drained, or until the session
/// is cancelled. Cancellation stops it from taking further tasks; commits
/// already in flight finish before the stage returns, so nothing is written
/// after it has been joined. Commit errors are never retried.
pub(crate) fn spawn_persistence_stage(params: PersistenceParams) -> tokio::task::JoinHandle<()> {
    let PersistenceParams {
        session_id,
        io_rx,
        committer,
        workers,
        failure,
        cancel_token,
    } = params;

    tokio::spawn(async move {
        ReceiverStream::new(io_rx)
            .take_until(cancel_token.cancelled())
            .for_each_concurrent(workers.max(1), |task| {
                let committer = Arc::clone(&committer);
                let failure = Arc::clone(&failure);
                let token = cancel_token.clone();
                async move {
                    if token.is_cancelled() {
                        return;
                    }
                    let index = task.source.index;
                    if let Err(e) = committer.commit_task(&token, task).await {
                        if !e.is_cancelled() {
                            tracing::error!(idx = index, error = %e, "unable to commit page");
                            failure.set(e);
                        }
                    }
                }
            })
            .await;

        if cancel_token.is_cancelled() {
            tracing::debug!(session_id = %session_id, "persistence stage cancelled");
        } else {
            tracing::debug!(session_id = %session_id, "persistence stage drained");
        }
    })
}

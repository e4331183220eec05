//! End of session: non-destructive finalize, or abort with rollback

use super::session::{Session, lock};
use crate::error::Error;
use crate::providers::Chapter;
use crate::types::{Event, Outcome};

impl<C> Session<C>
where
    C: Chapter + Clone + 'static,
{
    /// Hand the finished chapters to the client
    pub(super) async fn finalize(&self) -> Outcome {
        let chapters = self.counters.content_downloaded();
        tracing::info!(
            session_id = %self.id,
            title = self.title(),
            chapters,
            "finished downloading content"
        );

        if let Err(e) = self.providers.client.remove_download(self.id.as_str(), false).await {
            tracing::error!(session_id = %self.id, error = %e, "unable to release session");
        }
        Outcome::Completed { chapters }
    }

    /// Remove everything this session created and report the failure
    ///
    /// Called after both the chapter loop and the persistence stage have stopped.
    pub(super) async fn abort(&self, reason: Error) -> Outcome {
        tracing::error!(
            session_id = %self.id,
            title = self.title(),
            error = %reason,
            "error while downloading content; cleaning up"
        );
        if let Some(token) = lock(&self.cancel_token).as_ref() {
            token.cancel();
        }

        let created = lock(&self.plan).has_downloaded.clone();
        for dir in created.iter().rev() {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => tracing::debug!(session_id = %self.id, path = %dir.display(), "removed partial chapter"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    session_id = %self.id,
                    path = %dir.display(),
                    error = %e,
                    "unable to remove partial chapter"
                ),
            }
        }

        if let Err(e) = self.providers.client.remove_download(self.id.as_str(), true).await {
            tracing::error!(session_id = %self.id, error = %e, "unable to release session");
        }

        let reason = reason.to_string();
        self.event_tx
            .send(Event::DownloadFailed {
                id: self.id.clone(),
                title: self.title().to_string(),
                error: reason.clone(),
            })
            .ok();
        Outcome::Aborted { reason }
    }
}

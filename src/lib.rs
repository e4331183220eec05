//! # chapter-dl
//!
//! Per-series chapter download engine for manga and comic libraries.
//!
//! ## Design Philosophy
//!
//! chapter-dl is designed to be:
//! - **Resumable** - Chapters already on disk are skipped, re-volumed chapters are replaced
//! - **Polite** - Page fetches are rate limited per chapter and retried once
//! - **Library-first** - Providers, storage and the client plug in through traits
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chapter_dl::{Config, HttpTransport, Session, SessionOptions, SessionParams, SessionProviders};
//! # use chapter_dl::{Chapter, Client, ContentProvider, Series};
//! # use tokio_util::sync::CancellationToken;
//! # fn providers<C>() -> (Arc<dyn Series<C>>, Arc<dyn ContentProvider<C>>, Arc<dyn Client>) { unimplemented!() }
//! # #[derive(Clone)] struct MyChapter;
//! # impl Chapter for MyChapter {
//! #     fn id(&self) -> &str { "" }
//! #     fn volume(&self) -> &str { "" }
//! #     fn chapter(&self) -> &str { "" }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (series, content, client) = providers::<MyChapter>();
//!
//!     let session = Session::new(SessionParams {
//!         series,
//!         config: Config::default(),
//!         providers: SessionProviders::new(Arc::new(HttpTransport::new()?), content, client),
//!         options: SessionOptions::default(),
//!     });
//!
//!     // Subscribe to events
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let outcome = session.run(&CancellationToken::new()).await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Session engine (decomposed into focused submodules)
pub mod engine;
/// Error types
pub mod error;
/// Content file naming and recognition
pub mod naming;
/// Resume and dedup planning
pub mod planner;
/// Collaborator traits and default implementations
pub mod providers;
/// Per-chapter rate limiting with a token bucket
pub mod rate_limiter;
/// On-disk content scan
pub mod scanner;
/// Tag and age rating mapping
pub mod tags;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, TagConfig};
pub use engine::{Session, SessionOptions, SessionParams, SessionProviders};
pub use error::{DownloadError, Error, Result};
pub use naming::ContentNaming;
pub use planner::{DownloadPlan, Planner};
pub use providers::{
    Chapter, ChapterLister, Client, ComicInfoVolumeReader, ContentProvider, DiskCommitter,
    HttpTransport, PreferenceSource, Series, TaskCommitter, Transport, VolumeReader,
};
pub use rate_limiter::RateLimiter;
pub use tags::{AgeRating, Classification, Tag, TagMapper, TagPreferences};
pub use types::{
    Content, ContentState, DownloadTask, Event, Outcome, PersistenceTask, SessionId, SessionStats,
};

use tokio_util::sync::CancellationToken;

/// Run a session, cancelling it when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// A signal does not abort the session: partial chapters stay on disk and the
/// outcome is [`Outcome::Cancelled`].
pub async fn run_until_signal<C>(session: &Session<C>) -> Result<Outcome>
where
    C: Chapter + Clone + 'static,
{
    let token = CancellationToken::new();
    let run = session.run(&token);
    tokio::pin!(run);

    tokio::select! {
        outcome = &mut run => outcome,
        _ = wait_for_signal() => {
            tracing::info!(session_id = %session.id(), "stopping session");
            session.cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

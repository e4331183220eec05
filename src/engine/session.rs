//! Session state, collaborators and the planning phase

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::counters::SessionCounters;
use super::progress::PROGRESS_UPDATE_INTERVAL;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming::{ContentNaming, parse_content_name};
use crate::planner::{DownloadPlan, Planner};
use crate::providers::{
    Chapter, ChapterLister, Client, ComicInfoVolumeReader, ContentProvider, DiskCommitter,
    PreferenceSource, Series, TaskCommitter, Transport, VolumeReader,
};
use crate::scanner::scan_content;
use crate::tags::TagMapper;
use crate::types::{ContentState, Event, Outcome, SessionId, SessionStats};

/// Buffer size for the session event channel
const EVENT_CHANNEL_BUFFER: usize = 256;

/// The hooks a session talks to
pub struct SessionProviders<C> {
    /// Fetches page bytes
    pub transport: Arc<dyn Transport>,
    /// Resolves page URLs and writes chapter metadata
    pub content: Arc<dyn ContentProvider<C>>,
    /// Commits fetched pages
    pub committer: Arc<dyn TaskCommitter>,
    /// Reads the volume recorded in existing archives
    pub volume_reader: Arc<dyn VolumeReader>,
    /// Receives the end-of-session cleanup request
    pub client: Arc<dyn Client>,
    /// User tag preferences, tags are skipped without one
    pub preferences: Option<Arc<dyn PreferenceSource>>,
    /// Overrides [`Series::all_chapters`] when set
    pub chapter_lister: Option<Arc<dyn ChapterLister<C>>>,
}

impl<C> SessionProviders<C> {
    /// Providers with the default [`DiskCommitter`] and [`ComicInfoVolumeReader`]
    pub fn new(
        transport: Arc<dyn Transport>,
        content: Arc<dyn ContentProvider<C>>,
        client: Arc<dyn Client>,
    ) -> Self {
        Self {
            transport,
            content,
            committer: Arc::new(DiskCommitter),
            volume_reader: Arc::new(ComicInfoVolumeReader),
            client,
            preferences: None,
            chapter_lister: None,
        }
    }

    /// Replace the page committer
    pub fn with_committer(mut self, committer: Arc<dyn TaskCommitter>) -> Self {
        self.committer = committer;
        self
    }

    /// Replace the archive volume reader
    pub fn with_volume_reader(mut self, volume_reader: Arc<dyn VolumeReader>) -> Self {
        self.volume_reader = volume_reader;
        self
    }

    /// Load tag preferences from `source` while preparing
    pub fn with_preferences(mut self, source: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = Some(source);
        self
    }

    /// Plan against `lister` instead of the series' own catalog
    pub fn with_chapter_lister(mut self, lister: Arc<dyn ChapterLister<C>>) -> Self {
        self.chapter_lister = Some(lister);
        self
    }
}

/// Per-request switches
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Move to `Ready` after planning instead of `Waiting` for the user
    pub start_immediately: bool,
    /// Never fetch chapters that have a volume but no chapter marker
    pub skip_volume_without_chapter: bool,
    /// How often progress is reported while downloading (default: 2s)
    pub progress_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            start_immediately: true,
            skip_volume_without_chapter: false,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
        }
    }
}

/// Everything needed to build a [`Session`]
pub struct SessionParams<C> {
    /// The download target
    pub series: Arc<dyn Series<C>>,
    /// Engine configuration
    pub config: Config,
    /// Collaborators
    pub providers: SessionProviders<C>,
    /// Request switches
    pub options: SessionOptions,
}

/// One download run for one series
///
/// A session is prepared (catalog resolved, disk scanned, plan built) and then
/// run once. Chapters are downloaded strictly in plan order; pages of a chapter
/// are fetched concurrently and committed by a separate persistence stage.
pub struct Session<C> {
    pub(super) id: SessionId,
    pub(super) series: Arc<dyn Series<C>>,
    pub(super) config: Config,
    pub(super) providers: SessionProviders<C>,
    pub(super) options: SessionOptions,
    pub(super) state: Arc<AtomicU8>,
    pub(super) counters: Arc<SessionCounters>,
    pub(super) plan: Mutex<DownloadPlan<C>>,
    pub(super) naming: Mutex<ContentNaming>,
    tag_mapper: Mutex<TagMapper>,
    pub(super) selection: Mutex<Vec<String>>,
    pub(super) cancel_token: Mutex<Option<CancellationToken>>,
    pub(super) cancel_requested: AtomicBool,
    pub(super) outcome: Mutex<Option<Outcome>>,
    prepared: AtomicBool,
    pub(super) event_tx: broadcast::Sender<Event>,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C> Session<C>
where
    C: Chapter + Clone + 'static,
{
    /// Create a session in the `Queued` state
    pub fn new(params: SessionParams<C>) -> Self {
        let SessionParams {
            series,
            config,
            providers,
            options,
        } = params;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        let naming = ContentNaming::new(&config.download, series.title());

        Self {
            id: SessionId::new(series.id()),
            series,
            config,
            providers,
            options,
            state: Arc::new(AtomicU8::new(ContentState::Queued.to_u8())),
            counters: Arc::new(SessionCounters::default()),
            plan: Mutex::new(DownloadPlan::default()),
            naming: Mutex::new(naming),
            tag_mapper: Mutex::new(TagMapper::default()),
            selection: Mutex::new(Vec::new()),
            cancel_token: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            outcome: Mutex::new(None),
            prepared: AtomicBool::new(false),
            event_tx,
        }
    }

    /// Session id, the series' provider id
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Series title
    pub fn title(&self) -> &str {
        self.series.title()
    }

    /// Live lifecycle state
    pub fn state(&self) -> ContentState {
        ContentState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Subscribe to session events
    ///
    /// Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the download plan
    pub fn plan(&self) -> DownloadPlan<C> {
        lock(&self.plan).clone()
    }

    /// Names and paths derived for this series
    pub fn naming(&self) -> ContentNaming {
        lock(&self.naming).clone()
    }

    /// Tag mapper built from the preferences loaded while preparing
    pub fn tag_mapper(&self) -> TagMapper {
        lock(&self.tag_mapper).clone()
    }

    /// How the session ended, once it has
    pub fn outcome(&self) -> Option<Outcome> {
        lock(&self.outcome).clone()
    }

    /// Stop the session
    ///
    /// Cancelling before [`Session::run`] makes the run return
    /// [`Outcome::Cancelled`] right away. A cancelled session is not reported
    /// as failed.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
        if let Some(token) = lock(&self.cancel_token).as_ref() {
            token.cancel();
        }
        tracing::debug!(session_id = %self.id, "cancel requested");
    }

    /// Restrict the download to the given chapter ids
    ///
    /// Only allowed while the session waits to start.
    pub fn set_user_selection(&self, ids: Vec<String>) -> Result<()> {
        let state = self.state();
        if !matches!(state, ContentState::Waiting | ContentState::Ready) {
            return Err(Error::InvalidState {
                operation: "set user selection".to_string(),
                state,
            });
        }
        tracing::debug!(session_id = %self.id, selected = ids.len(), "user selection set");
        *lock(&self.selection) = ids;
        Ok(())
    }

    pub(super) fn set_state(&self, state: ContentState) {
        let previous = self.state.swap(state.to_u8(), Ordering::AcqRel);
        if previous == state.to_u8() {
            return;
        }
        tracing::trace!(session_id = %self.id, state = %state, "state changed");
        self.event_tx
            .send(Event::StateChanged {
                id: self.id.clone(),
                state,
            })
            .ok();
    }

    /// Load preferences, resolve the catalog, scan the disk and build the plan
    ///
    /// Runs at most once; [`Session::run`] calls it when the host did not. When
    /// nothing has to be downloaded the session completes here with
    /// [`Outcome::NothingToDownload`].
    pub async fn prepare(&self) -> Result<()> {
        if self.prepared.load(Ordering::Acquire) {
            return Ok(());
        }
        let state = self.state();
        if state != ContentState::Queued {
            return Err(Error::InvalidState {
                operation: "prepare".to_string(),
                state,
            });
        }

        self.set_state(ContentState::Loading);
        let start = Instant::now();

        let preferences = match &self.providers.preferences {
            Some(source) => match source.load_preferences().await {
                Ok(preferences) => Some(preferences),
                Err(e) => {
                    tracing::warn!(session_id = %self.id, error = %e, "unable to load tag preferences");
                    None
                }
            },
            None => None,
        };
        let mapper = TagMapper::new(
            preferences,
            self.config.tags.include_unmatched,
            self.config.tags.skip_tags_on_failure,
        );
        *lock(&self.tag_mapper) = mapper;

        let chapters = match &self.providers.chapter_lister {
            Some(lister) => lister.list_chapters(),
            None => self.series.all_chapters(),
        };
        let naming =
            ContentNaming::new(&self.config.download, self.series.title()).with_catalog(&chapters);

        let root = naming.series_dir();
        let existing = tokio::task::spawn_blocking(move || scan_content(&root, parse_content_name))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %self.id, error = %e, "content scan did not complete");
                Vec::new()
            });

        let plan = Planner::new(&naming, &existing, self.providers.volume_reader.as_ref())
            .skip_volume_without_chapter(self.options.skip_volume_without_chapter)
            .plan(chapters)
            .await;
        let nothing_to_download = plan.is_empty();

        *lock(&self.naming) = naming;
        *lock(&self.plan) = plan;
        self.prepared.store(true, Ordering::Release);

        tracing::debug!(
            session_id = %self.id,
            elapsed = ?start.elapsed(),
            "loaded content info"
        );

        if nothing_to_download {
            tracing::info!(session_id = %self.id, title = self.title(), "no chapters to download");
            self.finish_empty().await;
            return Ok(());
        }

        self.set_state(if self.options.start_immediately {
            ContentState::Ready
        } else {
            ContentState::Waiting
        });
        Ok(())
    }

    /// Complete a session that has nothing to fetch
    pub(super) async fn finish_empty(&self) -> Outcome {
        self.set_state(ContentState::Waiting);
        if let Err(e) = self.providers.client.remove_download(self.id.as_str(), false).await {
            tracing::error!(session_id = %self.id, error = %e, "unable to release session");
        }
        let outcome = Outcome::NothingToDownload;
        *lock(&self.outcome) = Some(outcome.clone());
        outcome
    }
}

impl<C> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &ContentState::from_u8(self.state.load(Ordering::Relaxed)))
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

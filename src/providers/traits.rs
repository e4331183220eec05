//! Traits for the collaborators a download session is built from

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tags::{TagMapper, TagPreferences};
use crate::types::{Content, PersistenceTask};

/// The smallest downloadable unit a provider exposes
///
/// Implementations are immutable for the life of a session. Volume and chapter
/// markers are provider strings such as `"3"` or `"12.5"`; an empty chapter marks
/// a one-shot.
pub trait Chapter: Send + Sync {
    /// Provider identifier, used for user selection
    fn id(&self) -> &str;

    /// Volume marker, empty when the chapter is not assigned to a volume
    fn volume(&self) -> &str;

    /// Chapter marker, empty for one-shots
    fn chapter(&self) -> &str;

    /// Human title of the chapter, used to name one-shots
    fn title(&self) -> &str {
        ""
    }

    /// Display label for logs and notifications
    fn label(&self) -> String {
        match (self.volume(), self.chapter()) {
            (_, "") => format!("OneShot: {}", self.title()),
            ("", chapter) => format!("Chapter {chapter}: {}", self.title()),
            (volume, chapter) => format!("Volume {volume} Chapter {chapter}: {}", self.title()),
        }
    }
}

/// The full catalog for one download target
pub trait Series<C>: Send + Sync {
    /// Provider identifier of the series, doubles as the session id
    fn id(&self) -> &str;

    /// Title used for every directory and file name
    fn title(&self) -> &str;

    /// Every chapter the provider knows about, in download order
    fn all_chapters(&self) -> Vec<C>;
}

/// Replaces [`Series::all_chapters`] when a provider's default catalog is not
/// what should be downloaded (e.g. a provider that merges alternative releases)
pub trait ChapterLister<C>: Send + Sync {
    /// The chapters to plan against
    fn list_chapters(&self) -> Vec<C>;
}

/// Raw network transport for page bytes
///
/// # Errors
///
/// Implementations return [`crate::Error::Cancelled`] when `cancel` fires
/// mid-request; any other error counts as a failed page fetch.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full body behind `url`
    async fn fetch_bytes(&self, cancel: &CancellationToken, url: &str) -> crate::Result<Vec<u8>>;
}

/// Per-provider chapter resolution
#[async_trait]
pub trait ContentProvider<C>: Send + Sync {
    /// Page URLs of a chapter, in reading order
    async fn content_urls(&self, cancel: &CancellationToken, chapter: &C)
    -> crate::Result<Vec<String>>;

    /// Write chapter-level metadata (e.g. ComicInfo.xml) next to the pages
    ///
    /// `tags` carries the user's preferences loaded while the session was
    /// prepared, for classifying genres and age ratings. Failures are logged
    /// by the caller and never abort the chapter.
    async fn write_content_metadata(
        &self,
        cancel: &CancellationToken,
        chapter: &C,
        tags: &TagMapper,
    ) -> crate::Result<()>;
}

/// Commits a fetched page to storage
#[async_trait]
pub trait TaskCommitter: Send + Sync {
    /// Persist one page. Any error is fatal to the whole session.
    async fn commit_task(&self, cancel: &CancellationToken, task: PersistenceTask)
    -> crate::Result<()>;
}

/// Reads metadata recorded inside an already persisted artifact
#[async_trait]
pub trait VolumeReader: Send + Sync {
    /// The volume stored inside `content`, empty when none is recorded
    async fn read_embedded_volume(&self, content: &Content) -> crate::Result<String>;
}

/// Client-level cleanup hook invoked when a session ends
#[async_trait]
pub trait Client: Send + Sync {
    /// Release the session. With `delete_files` every artifact it created is
    /// removed; without, finished chapters are handed off (e.g. for packaging).
    async fn remove_download(&self, id: &str, delete_files: bool) -> crate::Result<()>;
}

/// Source of the user's tag and age-rating preferences
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// Load the current preferences
    async fn load_preferences(&self) -> crate::Result<TagPreferences>;
}

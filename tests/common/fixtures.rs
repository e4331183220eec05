//! Test series, providers and on-disk content generators

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chapter_dl::{
    Chapter, Client, Config, ContentProvider, Error, PersistenceTask, PreferenceSource,
    Result, Series, TagMapper, TagPreferences, TaskCommitter,
};
use tokio_util::sync::CancellationToken;

/// Body served for every test page
pub const TEST_PAGE_CONTENT: &[u8] = b"\xFF\xD8\xFF\xE0 not really a jpeg";

/// Title shared by every test series
pub const TEST_TITLE: &str = "Spice and Wolf";

#[derive(Clone, Debug, PartialEq)]
pub struct TestChapter {
    pub id: String,
    pub volume: String,
    pub chapter: String,
    pub title: String,
}

impl TestChapter {
    pub fn new(id: &str, volume: &str, chapter: &str) -> Self {
        Self {
            id: id.to_string(),
            volume: volume.to_string(),
            chapter: chapter.to_string(),
            title: String::new(),
        }
    }
}

impl Chapter for TestChapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn volume(&self) -> &str {
        &self.volume
    }

    fn chapter(&self) -> &str {
        &self.chapter
    }

    fn title(&self) -> &str {
        &self.title
    }
}

pub struct TestSeries {
    pub chapters: Vec<TestChapter>,
}

impl Series<TestChapter> for TestSeries {
    fn id(&self) -> &str {
        "series-1"
    }

    fn title(&self) -> &str {
        TEST_TITLE
    }

    fn all_chapters(&self) -> Vec<TestChapter> {
        self.chapters.clone()
    }
}

/// `count` chapters without volume, ids `c1..cN`
pub fn loose_chapters(count: usize) -> Vec<TestChapter> {
    (1..=count)
        .map(|i| TestChapter::new(&format!("c{i}"), "", &i.to_string()))
        .collect()
}

/// Serves page URLs below `base`: `<base>/<chapter id>/<page>.jpg`
pub struct PageServer {
    pub base: String,
    pub pages: HashMap<String, usize>,
    /// Chapter id and the genre preferences seen by each metadata write
    pub metadata: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl PageServer {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            pages: HashMap::new(),
            metadata: Arc::default(),
        }
    }

    pub fn with_chapter(mut self, id: &str, pages: usize) -> Self {
        self.pages.insert(id.to_string(), pages);
        self
    }
}

#[async_trait]
impl ContentProvider<TestChapter> for PageServer {
    async fn content_urls(
        &self,
        _cancel: &CancellationToken,
        chapter: &TestChapter,
    ) -> Result<Vec<String>> {
        let count = self.pages.get(&chapter.id).copied().unwrap_or(0);
        Ok((1..=count)
            .map(|i| format!("{}/{}/{i}.jpg", self.base, chapter.id))
            .collect())
    }

    async fn write_content_metadata(
        &self,
        _cancel: &CancellationToken,
        chapter: &TestChapter,
        tags: &TagMapper,
    ) -> Result<()> {
        let genres = tags
            .preferences()
            .map(|prefs| prefs.genres.clone())
            .unwrap_or_default();
        self.metadata
            .lock()
            .unwrap()
            .push((chapter.id.clone(), genres));
        Ok(())
    }
}

/// Records every cleanup request
#[derive(Default)]
pub struct RecordingClient {
    pub removals: Mutex<Vec<(String, bool)>>,
}

impl RecordingClient {
    pub fn removals(&self) -> Vec<(String, bool)> {
        self.removals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Client for RecordingClient {
    async fn remove_download(&self, id: &str, delete_files: bool) -> Result<()> {
        self.removals
            .lock()
            .unwrap()
            .push((id.to_string(), delete_files));
        Ok(())
    }
}

/// Delegates to an inner committer until `fail_after` pages were committed
pub struct FailingCommitter {
    pub inner: Arc<dyn TaskCommitter>,
    pub fail_after: usize,
    pub committed: Mutex<usize>,
}

impl FailingCommitter {
    pub fn new(inner: Arc<dyn TaskCommitter>, fail_after: usize) -> Self {
        Self {
            inner,
            fail_after,
            committed: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TaskCommitter for FailingCommitter {
    async fn commit_task(&self, cancel: &CancellationToken, task: PersistenceTask) -> Result<()> {
        {
            let mut committed = self.committed.lock().unwrap();
            if *committed >= self.fail_after {
                return Err(Error::Persistence {
                    path: task.target_dir,
                    message: "no space left on device".to_string(),
                });
            }
            *committed += 1;
        }
        self.inner.commit_task(cancel, task).await
    }
}

/// Serves fixed preferences, or fails when none are set
pub struct StaticPreferences(pub Option<TagPreferences>);

#[async_trait]
impl PreferenceSource for StaticPreferences {
    async fn load_preferences(&self) -> Result<TagPreferences> {
        self.0
            .clone()
            .ok_or_else(|| Error::Provider("preferences service unavailable".to_string()))
    }
}

/// Config rooted in `dir`
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.to_path_buf();
    config
}

/// Write a `.cbz` at `path`, with a ComicInfo.xml carrying `volume` when given
pub fn write_cbz(path: &Path, volume: Option<&str>) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();

    zip.start_file("page 0001.jpg", options).unwrap();
    zip.write_all(TEST_PAGE_CONTENT).unwrap();
    if let Some(volume) = volume {
        zip.start_file("ComicInfo.xml", options).unwrap();
        write!(
            zip,
            "<?xml version=\"1.0\"?>\n<ComicInfo>\n  <Series>{TEST_TITLE}</Series>\n  <Volume>{volume}</Volume>\n</ComicInfo>"
        )
        .unwrap();
    }
    zip.finish().unwrap();
    path.to_path_buf()
}

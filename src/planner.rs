//! Resume and dedup planning
//!
//! Compares a series' chapter catalog against the content already on disk and
//! decides which chapters must be fetched, and which old artifacts must be
//! replaced because the chapter has since been assigned to a volume.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::naming::{CONTENT_EXTENSION, ContentNaming, trim_leading_zero};
use crate::providers::{Chapter, VolumeReader};
use crate::types::Content;

/// Planning slower than this is logged as a warning
pub const SLOW_PLAN_THRESHOLD: Duration = Duration::from_secs(5);

/// What a session will download, and what it has created so far
#[derive(Clone, Debug)]
pub struct DownloadPlan<C> {
    /// Chapters to fetch, in download order
    pub to_download: Vec<C>,
    /// Existing archives superseded by a chapter in `to_download`
    pub to_remove_content: Vec<PathBuf>,
    /// Id of the chapter that supersedes each `to_remove_content` entry
    pub replaced_by: HashMap<PathBuf, String>,
    /// Content found on disk when the plan was built
    pub existing_content: Vec<Content>,
    /// Chapter directories created by this session, in creation order
    pub has_downloaded: Vec<PathBuf>,
}

impl<C> Default for DownloadPlan<C> {
    fn default() -> Self {
        Self {
            to_download: Vec::new(),
            to_remove_content: Vec::new(),
            replaced_by: HashMap::new(),
            existing_content: Vec::new(),
            has_downloaded: Vec::new(),
        }
    }
}

impl<C: Chapter> DownloadPlan<C> {
    /// Nothing left to fetch
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty()
    }

    /// Narrow the plan to the chapters the user picked
    ///
    /// Replacements are only kept for chapters that are still selected, so a
    /// deselected chapter never loses its old archive. An empty selection
    /// leaves the plan untouched.
    pub fn apply_user_selection(&mut self, selection: &[String]) {
        if selection.is_empty() {
            return;
        }

        let before = self.to_download.len();
        let selected: HashSet<&str> = selection.iter().map(String::as_str).collect();
        self.to_download.retain(|chapter| selected.contains(chapter.id()));

        tracing::debug!(
            size = before,
            new_size = self.to_download.len(),
            "content further filtered after user selection"
        );

        let replaced_by = &self.replaced_by;
        self.to_remove_content.retain(|path| {
            replaced_by
                .get(path)
                .is_some_and(|id| selected.contains(id.as_str()))
        });
        self.replaced_by.retain(|_, id| selected.contains(id.as_str()));
    }
}

fn archive_name(stem: &str) -> String {
    format!("{stem}.{CONTENT_EXTENSION}")
}

/// Decides per chapter whether it must be downloaded
pub struct Planner<'a> {
    naming: &'a ContentNaming,
    existing: &'a [Content],
    volume_reader: &'a dyn VolumeReader,
    skip_volume_without_chapter: bool,
}

impl<'a> Planner<'a> {
    /// Planner over the content found on disk
    pub fn new(
        naming: &'a ContentNaming,
        existing: &'a [Content],
        volume_reader: &'a dyn VolumeReader,
    ) -> Self {
        Self {
            naming,
            existing,
            volume_reader,
            skip_volume_without_chapter: false,
        }
    }

    /// Never fetch chapters that have a volume but no chapter marker
    ///
    /// Some providers list volume-level specials this way, with names that do
    /// not survive a round trip through the on-disk scan.
    pub fn skip_volume_without_chapter(mut self, skip: bool) -> Self {
        self.skip_volume_without_chapter = skip;
        self
    }

    /// Existing content with exactly this file name
    pub fn content_by_name(&self, name: &str) -> Option<&'a Content> {
        self.existing.iter().find(|content| content.name == name)
    }

    /// Existing content for this volume and chapter
    ///
    /// Loose content (no volume) with the same chapter matches any volume, and
    /// a chapter whose volume was dropped upstream matches its volumed content.
    pub fn content_by_volume_and_chapter(&self, volume: &str, chapter: &str) -> Option<&'a Content> {
        let volume = trim_leading_zero(volume);
        let chapter = trim_leading_zero(chapter);
        self.existing.iter().find(|content| {
            content.chapter == chapter
                && (content.volume == volume || content.volume.is_empty() || volume.is_empty())
        })
    }

    /// Whether `chapter` must be downloaded
    ///
    /// When an existing archive is superseded because the chapter moved into a
    /// volume, its path is pushed onto `to_remove`.
    pub async fn should_download<C: Chapter>(&self, chapter: &C, to_remove: &mut Vec<PathBuf>) -> bool {
        let volume = chapter.volume();

        // Whole-volume archives from older layouts
        if !volume.is_empty()
            && self
                .content_by_name(&archive_name(&self.naming.volume_dir(volume)))
                .is_some()
        {
            return false;
        }

        let by_name = self.content_by_name(&archive_name(&self.naming.content_file_name(chapter)));
        let content = match by_name {
            Some(content) => content,
            None => {
                let by_number = if chapter.chapter().is_empty() {
                    None
                } else {
                    self.content_by_volume_and_chapter(volume, chapter.chapter())
                };
                match by_number {
                    Some(content) => content,
                    None if self.skip_volume_without_chapter && !volume.is_empty() => {
                        return !chapter.chapter().is_empty();
                    }
                    None => return true,
                }
            }
        };

        if volume.is_empty() {
            return false;
        }

        let on_disk_volume = match self.volume_reader.read_embedded_volume(content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    path = %content.path.display(),
                    error = %e,
                    "failed to retrieve volume on disk, assuming unchanged"
                );
                return false;
            }
        };

        if trim_leading_zero(&on_disk_volume) != trim_leading_zero(volume) {
            tracing::debug!(
                on_disk_volume = %on_disk_volume,
                volume = volume,
                path = %content.path.display(),
                "volume changed, redownloading content"
            );
            to_remove.push(content.path.clone());
            return true;
        }

        false
    }

    /// Build the plan for a catalog
    pub async fn plan<C: Chapter>(&self, chapters: Vec<C>) -> DownloadPlan<C> {
        let start = Instant::now();
        let total = chapters.len();

        let mut plan = DownloadPlan {
            existing_content: self.existing.to_vec(),
            ..DownloadPlan::default()
        };
        for chapter in chapters {
            let replacements = plan.to_remove_content.len();
            if self.should_download(&chapter, &mut plan.to_remove_content).await {
                for path in &plan.to_remove_content[replacements..] {
                    plan.replaced_by.insert(path.clone(), chapter.id().to_string());
                }
                plan.to_download.push(chapter);
            }
        }

        let elapsed = start.elapsed();
        if elapsed > SLOW_PLAN_THRESHOLD {
            tracing::warn!(elapsed = ?elapsed, "checking for on disk content took a long time");
        }

        tracing::debug!(
            all = total,
            to_download = plan.to_download.len(),
            re_downloads = plan.to_remove_content.len(),
            existing = plan.existing_content.len(),
            "download plan built"
        );
        plan
    }
}

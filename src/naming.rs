//! Chapter directory and file naming
//!
//! Every chapter lands in `<root>/<title>[/<title> Vol. <v>]/<file name>` where
//! the file name is one of:
//!
//! - `<title> Ch. 0012.5` for a loose chapter
//! - `<title> Vol. 3 Ch. 0012.5` when the volume must disambiguate the chapter
//! - `<title> <chapter title> (One Shot)` for a chapter without a chapter marker
//!
//! [`parse_content_name`] recognizes those names again once they have been
//! packaged into `.cbz` archives.

use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::DownloadConfig;
use crate::providers::Chapter;
use crate::types::ParsedContent;

/// Width the integer part of a chapter marker is zero-padded to
pub const CHAPTER_PAD_WIDTH: usize = 4;

/// File extension of packaged content
pub const CONTENT_EXTENSION: &str = "cbz";

static VOLUME_AND_CHAPTER: OnceLock<Option<Regex>> = OnceLock::new();
static CHAPTER_ONLY: OnceLock<Option<Regex>> = OnceLock::new();
static VOLUME_ONLY: OnceLock<Option<Regex>> = OnceLock::new();

fn re_volume_and_chapter() -> Option<&'static Regex> {
    VOLUME_AND_CHAPTER
        .get_or_init(|| Regex::new(r".* Vol\. ([\d.]+) Ch\. ([\d.]+)\.cbz$").ok())
        .as_ref()
}

fn re_chapter_only() -> Option<&'static Regex> {
    CHAPTER_ONLY
        .get_or_init(|| Regex::new(r".* Ch\. ([\d.]+)\.cbz$").ok())
        .as_ref()
}

fn re_volume_only() -> Option<&'static Regex> {
    VOLUME_ONLY
        .get_or_init(|| Regex::new(r".* Vol\. ([\d.]+)\.cbz$").ok())
        .as_ref()
}

/// Recognize a packaged content file name
///
/// Returns the volume and chapter markers with leading zeros trimmed. Any other
/// `.cbz` file (one-shots, custom names) is recognized with both markers empty.
/// Non-archives yield `None`.
///
/// ```
/// use chapter_dl::naming::parse_content_name;
///
/// let parsed = parse_content_name("Spice and Wolf Vol. 2 Ch. 0012.5.cbz").unwrap();
/// assert_eq!(parsed.volume, "2");
/// assert_eq!(parsed.chapter, "12.5");
/// assert!(parse_content_name("cover.jpg").is_none());
/// ```
pub fn parse_content_name(name: &str) -> Option<ParsedContent> {
    let capture = |re: Option<&'static Regex>, group: usize| {
        re.and_then(|re| re.captures(name))
            .and_then(|caps| caps.get(group).map(|m| trim_leading_zero(m.as_str())))
    };

    if let (Some(volume), Some(chapter)) = (
        capture(re_volume_and_chapter(), 1),
        capture(re_volume_and_chapter(), 2),
    ) {
        return Some(ParsedContent { volume, chapter });
    }

    if let Some(chapter) = capture(re_chapter_only(), 1) {
        return Some(ParsedContent {
            volume: String::new(),
            chapter,
        });
    }

    if let Some(volume) = capture(re_volume_only(), 1) {
        return Some(ParsedContent {
            volume,
            chapter: String::new(),
        });
    }

    let is_archive = std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTENT_EXTENSION));
    is_archive.then(ParsedContent::default)
}

/// Strip leading zeros, keeping a single digit in front of a decimal point
///
/// `"0012.5"` becomes `"12.5"`, `"0000"` becomes `"0"` and `"00.5"` becomes `"0.5"`.
pub fn trim_leading_zero(marker: &str) -> String {
    let trimmed = marker.trim_start_matches('0');
    if trimmed.is_empty() && !marker.is_empty() {
        return "0".to_string();
    }
    if trimmed.starts_with('.') {
        return format!("0{trimmed}");
    }
    trimmed.to_string()
}

/// Zero-pad the integer part of a numeric chapter marker
///
/// Returns `None` when the marker is not a number, in which case it must be
/// used as-is.
pub fn pad_chapter(marker: &str, width: usize) -> Option<String> {
    if !marker.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    marker.parse::<f64>().ok()?;
    let (int, frac) = match marker.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (marker, None),
    };
    let padded = format!("{int:0>width$}");
    Some(match frac {
        Some(frac) => format!("{padded}.{frac}"),
        None => padded,
    })
}

/// Derives directory and file names for the chapters of one series
#[derive(Clone, Debug)]
pub struct ContentNaming {
    root: PathBuf,
    title: String,
    disable_volume_dirs: bool,
    disable_one_shot_suffix: bool,
    has_duplicated_chapters: bool,
}

impl ContentNaming {
    /// Naming for `title` below the configured download directory
    pub fn new(config: &DownloadConfig, title: impl Into<String>) -> Self {
        Self {
            root: config.download_dir.clone(),
            title: title.into(),
            disable_volume_dirs: config.disable_volume_dirs,
            disable_one_shot_suffix: config.disable_one_shot_suffix,
            has_duplicated_chapters: false,
        }
    }

    /// Record whether the catalog reuses chapter markers across volumes
    ///
    /// When it does, chapter file names carry their volume so they stay unique.
    pub fn with_catalog<C: Chapter>(mut self, chapters: &[C]) -> Self {
        let mut seen = HashSet::new();
        self.has_duplicated_chapters = chapters
            .iter()
            .any(|chapter| !seen.insert(chapter.chapter().to_string()));
        self
    }

    /// Series title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// `<root>/<title>`, the directory scanned for existing content
    pub fn series_dir(&self) -> PathBuf {
        self.root.join(&self.title)
    }

    /// `<title> Vol. <volume>`
    pub fn volume_dir(&self, volume: &str) -> String {
        format!("{} Vol. {volume}", self.title)
    }

    /// Whether chapter file names include their volume marker
    pub fn includes_volume(&self) -> bool {
        self.disable_volume_dirs || self.has_duplicated_chapters
    }

    /// File (and directory) name of a chapter, without extension
    pub fn content_file_name<C: Chapter>(&self, chapter: &C) -> String {
        if chapter.chapter().is_empty() {
            return self.one_shot_file_name(chapter);
        }

        let mut name = self.title.clone();
        if !chapter.volume().is_empty() && self.includes_volume() {
            name.push_str(" Vol. ");
            name.push_str(chapter.volume());
        }

        match pad_chapter(chapter.chapter(), CHAPTER_PAD_WIDTH) {
            Some(padded) => format!("{name} Ch. {padded}"),
            None => {
                tracing::warn!(
                    chapter = chapter.chapter(),
                    "unable to parse chapter number, not padding"
                );
                format!("{name} Ch. {}", chapter.chapter())
            }
        }
    }

    /// Directory the pages of a chapter are written to
    pub fn content_path<C: Chapter>(&self, chapter: &C) -> PathBuf {
        let mut path = self.series_dir();
        if !chapter.volume().is_empty() && !self.disable_volume_dirs {
            path.push(self.volume_dir(chapter.volume()));
        }
        path.push(self.content_file_name(chapter));
        path
    }

    fn one_shot_file_name<C: Chapter>(&self, chapter: &C) -> String {
        let mut name = format!("{} {}", self.title, chapter.title());
        if !self.disable_one_shot_suffix {
            name.push_str(" (One Shot)");
        }
        name
    }
}

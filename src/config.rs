//! Configuration types for chapter-dl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Lower bound for concurrent image fetches per chapter
pub const MIN_CONCURRENT_IMAGES: usize = 1;

/// Upper bound for concurrent image fetches per chapter
pub const MAX_CONCURRENT_IMAGES: usize = 5;

/// Download behavior configuration (directories, concurrency, naming)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Library root every series directory lives under (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Concurrent image fetches within one chapter (default: 4, clamped to 1..=5)
    ///
    /// Also sets the per-chapter rate limit (permits per second and burst) and
    /// the capacity of the chapter task queue. The persistence queue and its
    /// worker pool are sized at twice this value.
    #[serde(default = "default_max_concurrent_images")]
    pub max_concurrent_images: usize,

    /// Put every chapter directly in the series directory instead of a volume sub-directory
    #[serde(default)]
    pub disable_volume_dirs: bool,

    /// Omit the " (One Shot)" suffix from one-shot file names
    #[serde(default)]
    pub disable_one_shot_suffix: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_images: default_max_concurrent_images(),
            disable_volume_dirs: false,
            disable_one_shot_suffix: false,
        }
    }
}

/// Tag handling switches that are not part of the per-user preferences
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TagConfig {
    /// Keep tags that match neither the whitelist nor the genre list
    #[serde(default)]
    pub include_unmatched: bool,

    /// When preferences cannot be loaded, proceed silently without tags
    #[serde(default)]
    pub skip_tags_on_failure: bool,
}

/// Main configuration for a download session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Tag handling
    #[serde(default)]
    pub tags: TagConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a session
    pub fn validate(&self) -> Result<()> {
        if self.download.download_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "download directory must not be empty".to_string(),
                key: Some("download_dir".to_string()),
            });
        }
        Ok(())
    }

    /// Library root directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Concurrent image fetches, clamped to the supported range
    pub fn max_concurrent_images(&self) -> usize {
        self.download
            .max_concurrent_images
            .clamp(MIN_CONCURRENT_IMAGES, MAX_CONCURRENT_IMAGES)
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent_images() -> usize {
    4
}

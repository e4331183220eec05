//! Core types and events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier of a download session (the provider's content id)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new SessionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a download session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentState {
    /// Created, nothing loaded yet
    #[default]
    Queued,
    /// Resolving the catalog and planning
    Loading,
    /// Planned, waiting for the user to start (or nothing to download)
    Waiting,
    /// Planned and allowed to start
    Ready,
    /// Chapters are being fetched
    Downloading,
    /// Fetching finished, persistence draining
    Cleanup,
}

impl ContentState {
    /// Convert a stored state code back to ContentState
    pub fn from_u8(state: u8) -> Self {
        match state {
            0 => ContentState::Queued,
            1 => ContentState::Loading,
            2 => ContentState::Waiting,
            3 => ContentState::Ready,
            4 => ContentState::Downloading,
            5 => ContentState::Cleanup,
            _ => ContentState::Queued,
        }
    }

    /// Convert ContentState to its stored state code
    pub fn to_u8(self) -> u8 {
        match self {
            ContentState::Queued => 0,
            ContentState::Loading => 1,
            ContentState::Waiting => 2,
            ContentState::Ready => 3,
            ContentState::Downloading => 4,
            ContentState::Cleanup => 5,
        }
    }
}

impl std::fmt::Display for ContentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentState::Queued => "queued",
            ContentState::Loading => "loading",
            ContentState::Waiting => "waiting",
            ContentState::Ready => "ready",
            ContentState::Downloading => "downloading",
            ContentState::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// A unit already materialized on disk (one packaged chapter or volume archive)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// File name, including extension
    pub name: String,
    /// Full path of the file
    pub path: PathBuf,
    /// Volume parsed from the file name, empty when absent
    pub volume: String,
    /// Chapter parsed from the file name, empty when absent
    pub chapter: String,
}

/// Volume and chapter markers recognized in a content file name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedContent {
    /// Volume marker without leading zeros, empty when absent
    pub volume: String,
    /// Chapter marker without leading zeros, empty when absent
    pub chapter: String,
}

/// One page to fetch: 1-based index inside the chapter and its URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTask {
    /// 1-based page index, drives the on-disk file name
    pub index: usize,
    /// Remote URL of the page
    pub url: String,
}

/// A fetched page waiting to be committed to disk
#[derive(Debug)]
pub struct PersistenceTask {
    /// Raw bytes as fetched
    pub data: Vec<u8>,
    /// Chapter directory the page belongs in
    pub target_dir: PathBuf,
    /// The task that produced the bytes
    pub source: DownloadTask,
}

/// Point-in-time copy of the session counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Chapters fully downloaded in this session
    pub content_downloaded: u64,
    /// Pages fetched in the current chapter
    pub images_downloaded: u64,
    /// Pages that failed on their first pass
    pub failed_downloads: u64,
    /// Pages in the current chapter
    pub total_chapter_images: u64,
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every planned chapter was downloaded and finalize ran
    Completed {
        /// Number of chapters downloaded
        chapters: u64,
    },
    /// The plan was empty; non-destructive cleanup ran
    NothingToDownload,
    /// A caller stopped the session
    Cancelled,
    /// A fatal error aborted the session; partial artifacts were removed
    Aborted {
        /// The failure reason
        reason: String,
    },
}

/// Event emitted during a session's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session state changed
    StateChanged {
        /// Session id
        id: SessionId,
        /// New state
        state: ContentState,
    },

    /// Periodic progress snapshot
    Progress {
        /// Session id
        id: SessionId,
        /// Chapters done over chapters planned (0.0 to 100.0)
        percent: f32,
        /// Images per second since the previous snapshot
        speed: u64,
        /// Pages fetched in the current chapter
        images_downloaded: u64,
        /// Pages in the current chapter
        total_chapter_images: u64,
    },

    /// A chapter finished downloading
    ChapterCompleted {
        /// Session id
        id: SessionId,
        /// Chapter id
        chapter_id: String,
    },

    /// The session failed and its partial artifacts were removed
    DownloadFailed {
        /// Session id
        id: SessionId,
        /// Title of the content
        title: String,
        /// Failure reason
        error: String,
    },
}

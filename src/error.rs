//! Error types for chapter-dl
//!
//! This module provides error handling for the engine, including:
//! - Domain-specific error types (page downloads, persistence, provider hooks)
//! - A cancellation variant that every stage treats as benign
//! - Context information (url, page index, target path) for diagnostics

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ContentState;

/// Result type alias for chapter-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chapter-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// The session or chapter was cancelled. Never reported as a failure.
    #[error("download cancelled")]
    Cancelled,

    /// Download-related error (page fetch, chapter setup)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The persistence hook failed to commit a fetched page
    #[error("unable to run task '{}': {message}", path.display())]
    Persistence {
        /// Target path of the page that could not be written
        path: PathBuf,
        /// Human-readable reason
        message: String,
    },

    /// Transport-level failure reported by a `Transport` implementation
    #[error("transport error: {0}")]
    Transport(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive inspection error (reading `.cbz` metadata)
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Malformed metadata document (ComicInfo.xml)
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not allowed in the session's current state
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "set user selection")
        operation: String,
        /// The state that prevented the operation
        state: ContentState,
    },

    /// Provider hook failure (catalog, URL resolution, metadata)
    #[error("provider error: {0}")]
    Provider(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this error represents a cancellation rather than a failure.
    ///
    /// Cancellation is suppressed from failure logging and user notification.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A page failed on its retry pass; fatal to the chapter
    #[error("final download failed on url {url}; {reason}")]
    PageFailed {
        /// 1-based page index inside the chapter
        index: usize,
        /// The page URL
        url: String,
        /// The reason of the last failure
        reason: String,
    },

    /// The chapter directory could not be created
    #[error("unable to create chapter directory {}: {reason}", path.display())]
    DirectoryFailed {
        /// The directory that could not be created
        path: PathBuf,
        /// The reason creation failed
        reason: String,
    },

    /// The remote answered with a non-success status
    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// The requested URL
        url: String,
    },
}

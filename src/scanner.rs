//! On-disk content discovery
//!
//! Walks a series directory and reports every file the naming predicate
//! recognizes as already downloaded content.

use std::path::Path;
use walkdir::WalkDir;

use crate::types::{Content, ParsedContent};

/// Recursively list recognized content below `root`
///
/// A missing `root` is a fresh download and yields an empty set. Any other read
/// failure is logged and also yields an empty set, so the planner falls back to
/// downloading everything instead of failing the session.
pub fn scan_content<F>(root: &Path, is_content: F) -> Vec<Content>
where
    F: Fn(&str) -> Option<ParsedContent>,
{
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            tracing::warn!(path = %root.display(), "content root is not a directory, assuming nothing exists");
            return Vec::new();
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %root.display(), "content root does not exist yet");
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!(path = %root.display(), error = %e, "unable to read content root, assuming nothing exists");
            return Vec::new();
        }
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %root.display(), error = %e, "failed to scan content, assuming nothing exists");
                return Vec::new();
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };

        if let Some(ParsedContent { volume, chapter }) = is_content(name) {
            found.push(Content {
                name: name.to_string(),
                path: entry.path().to_path_buf(),
                volume,
                chapter,
            });
        }
    }

    tracing::debug!(path = %root.display(), count = found.len(), "scanned on-disk content");
    found
}

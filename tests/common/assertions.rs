//! Custom test assertions and event helpers

use std::path::{Path, PathBuf};
use std::time::Duration;

use chapter_dl::{ContentState, Event};
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// Default upper bound for a whole session in tests
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Collect every event already buffered in `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// States in the order they were entered
pub fn state_changes(events: &[Event]) -> Vec<ContentState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

/// Chapter ids reported as completed, in order
pub fn completed_chapters(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ChapterCompleted { chapter_id, .. } => Some(chapter_id.clone()),
            _ => None,
        })
        .collect()
}

/// Number of failure notifications
pub fn failure_count(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::DownloadFailed { .. }))
        .count()
}

/// Every regular file below `root`, sorted
pub fn files_below(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Assert that none of `dirs` exists anymore
pub fn assert_rolled_back(dirs: &[PathBuf]) {
    for dir in dirs {
        assert!(
            !dir.exists(),
            "{} should have been removed by the abort",
            dir.display()
        );
    }
}

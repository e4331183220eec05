//! Session counters and the single-slot error cell

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::types::SessionStats;

/// Atomic counters shared by chapter workers and the progress reporter
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    content_downloaded: AtomicU64,
    images_downloaded: AtomicU64,
    failed_downloads: AtomicU64,
    /// `images_downloaded` at the previous speed sample
    last_read: AtomicU64,
    total_chapter_images: AtomicU64,
}

impl SessionCounters {
    /// Reset the per-chapter counters for a chapter of `pages` pages
    pub(crate) fn start_chapter(&self, pages: usize) {
        self.images_downloaded.store(0, Ordering::Relaxed);
        self.last_read.store(0, Ordering::Relaxed);
        self.total_chapter_images
            .store(pages as u64, Ordering::Relaxed);
    }

    pub(crate) fn image_downloaded(&self) {
        self.images_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn download_failed(&self) {
        self.failed_downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chapter_downloaded(&self) -> u64 {
        self.content_downloaded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn content_downloaded(&self) -> u64 {
        self.content_downloaded.load(Ordering::Relaxed)
    }

    /// Images per second since the previous call
    pub(crate) fn sample_speed(&self, elapsed: Duration) -> u64 {
        let current = self.images_downloaded.load(Ordering::Relaxed);
        let previous = self.last_read.swap(current, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (current.saturating_sub(previous) as f64 / secs).round() as u64
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        SessionStats {
            content_downloaded: self.content_downloaded.load(Ordering::Relaxed),
            images_downloaded: self.images_downloaded.load(Ordering::Relaxed),
            failed_downloads: self.failed_downloads.load(Ordering::Relaxed),
            total_chapter_images: self.total_chapter_images.load(Ordering::Relaxed),
        }
    }
}

/// Holds the first error reported by any worker and cancels its token
///
/// Later errors are dropped, only one abort is ever needed. Cancellation is
/// never stored.
#[derive(Debug)]
pub(crate) struct ErrorSlot {
    slot: Mutex<Option<Error>>,
    token: CancellationToken,
}

impl ErrorSlot {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            slot: Mutex::new(None),
            token,
        }
    }

    /// Store `err` unless an error is already present. Returns whether it was stored.
    pub(crate) fn set(&self, err: Error) -> bool {
        if err.is_cancelled() {
            return false;
        }
        let stored = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                false
            } else {
                *slot = Some(err);
                true
            }
        };
        if stored {
            self.token.cancel();
        }
        stored
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_chapter_resets_per_chapter_counters() {
        let counters = SessionCounters::default();
        counters.image_downloaded();
        counters.image_downloaded();
        counters.download_failed();
        counters.chapter_downloaded();

        counters.start_chapter(12);
        let stats = counters.snapshot();

        assert_eq!(stats.images_downloaded, 0);
        assert_eq!(stats.total_chapter_images, 12);
        assert_eq!(stats.failed_downloads, 1, "failures are session-wide");
        assert_eq!(stats.content_downloaded, 1);
    }

    #[test]
    fn speed_is_measured_since_last_sample() {
        let counters = SessionCounters::default();
        counters.start_chapter(10);
        for _ in 0..4 {
            counters.image_downloaded();
        }

        assert_eq!(counters.sample_speed(Duration::from_secs(2)), 2);
        assert_eq!(counters.sample_speed(Duration::from_secs(2)), 0);

        counters.image_downloaded();
        assert_eq!(counters.sample_speed(Duration::from_secs(1)), 1);
        assert_eq!(counters.sample_speed(Duration::ZERO), 0);
    }

    #[test]
    fn first_error_wins_and_cancels() {
        let token = CancellationToken::new();
        let slot = ErrorSlot::new(token.clone());

        assert!(slot.set(Error::Other("first".into())));
        assert!(!slot.set(Error::Other("second".into())));
        assert!(token.is_cancelled());
        assert!(slot.is_set());

        let err = slot.take().unwrap();
        assert_eq!(err.to_string(), "first");
        assert!(slot.take().is_none());
    }

    #[test]
    fn cancellation_is_not_stored() {
        let token = CancellationToken::new();
        let slot = ErrorSlot::new(token.clone());

        assert!(!slot.set(Error::Cancelled));
        assert!(!token.is_cancelled());
        assert!(!slot.is_set());
    }
}

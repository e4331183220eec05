//! Background progress reporting for a running session

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::counters::SessionCounters;
use crate::types::{ContentState, Event, SessionId};

/// Interval between progress update emissions
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_secs(2);

/// Parameters for spawning a progress reporter background task
pub(crate) struct ProgressReporterParams {
    /// Session ID
    pub id: SessionId,
    /// Number of chapters planned
    pub size: usize,
    /// Counters shared with the chapter workers
    pub counters: Arc<SessionCounters>,
    /// Live session state, speed is reported as 0 once in cleanup
    pub state: Arc<AtomicU8>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Tick period
    pub interval: Duration,
    /// Stops the reporter
    pub cancel_token: CancellationToken,
}

/// Build a progress snapshot and sample the image speed
pub(crate) fn progress_event(
    id: &SessionId,
    size: usize,
    counters: &SessionCounters,
    state: ContentState,
    elapsed: Duration,
) -> Event {
    let stats = counters.snapshot();
    let percent = if size > 0 {
        (stats.content_downloaded as f32 / size as f32) * 100.0
    } else {
        0.0
    };
    let speed = match state {
        ContentState::Cleanup => 0,
        _ => counters.sample_speed(elapsed),
    };

    Event::Progress {
        id: id.clone(),
        percent,
        speed,
        images_downloaded: stats.images_downloaded,
        total_chapter_images: stats.total_chapter_images,
    }
}

/// Spawn a background task that periodically reports download progress.
pub(crate) fn spawn_progress_reporter(
    params: ProgressReporterParams,
) -> tokio::task::JoinHandle<()> {
    let ProgressReporterParams {
        id,
        size,
        counters,
        state,
        event_tx,
        interval,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_sample = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = ContentState::from_u8(state.load(Ordering::Relaxed));
                    let event = progress_event(&id, size, &counters, current, last_sample.elapsed());
                    last_sample = Instant::now();
                    event_tx.send(event).ok();
                }
                _ = cancel_token.cancelled() => {
                    tracing::trace!(session_id = %id, "progress reporter stopped");
                    break;
                }
            }
        }
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_chapters_done_over_planned() {
        let counters = SessionCounters::default();
        counters.chapter_downloaded();

        let event = progress_event(
            &SessionId::new("s"),
            4,
            &counters,
            ContentState::Downloading,
            Duration::from_secs(2),
        );
        match event {
            Event::Progress { percent, .. } => assert!((percent - 25.0).abs() < f32::EPSILON),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn speed_is_zero_during_cleanup() {
        let counters = SessionCounters::default();
        counters.start_chapter(10);
        for _ in 0..6 {
            counters.image_downloaded();
        }

        let event = progress_event(
            &SessionId::new("s"),
            1,
            &counters,
            ContentState::Cleanup,
            Duration::from_secs(1),
        );
        let Event::Progress {
            speed,
            images_downloaded,
            total_chapter_images,
            ..
        } = event
        else {
            panic!("expected a progress event");
        };
        assert_eq!(speed, 0);
        assert_eq!(images_downloaded, 6);
        assert_eq!(total_chapter_images, 10);
    }

    #[test]
    fn empty_plan_reports_zero_percent() {
        let counters = SessionCounters::default();
        let event = progress_event(
            &SessionId::new("s"),
            0,
            &counters,
            ContentState::Downloading,
            Duration::from_secs(1),
        );
        assert!(matches!(event, Event::Progress { percent, .. } if percent == 0.0));
    }

    #[tokio::test]
    async fn reporter_ticks_until_cancelled() {
        let (event_tx, mut event_rx) = broadcast::channel(64);
        let token = CancellationToken::new();
        let handle = spawn_progress_reporter(ProgressReporterParams {
            id: SessionId::new("s"),
            size: 2,
            counters: Arc::new(SessionCounters::default()),
            state: Arc::new(AtomicU8::new(ContentState::Downloading.to_u8())),
            event_tx,
            interval: Duration::from_millis(20),
            cancel_token: token.clone(),
        });

        let first = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, Event::Progress { .. }));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter should exit on cancellation")
            .unwrap();
    }
}

use mosaic_common::channel::{Channel, Snapshot};
use mosaic_common::config::RefreshConfig;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::FrameCapture;
use crate::dispatcher::dispatch;
use crate::playlist::PlaylistSource;
use crate::snapshot::SnapshotPublisher;

/// Where the refresh loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Dispatching,
    Publishing,
    CoolingDown,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Dispatching => "dispatching",
            Self::Publishing => "publishing",
            Self::CoolingDown => "cooling_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives refresh cycles: fetch every playlist, capture every channel, publish the snapshot,
/// then hold off until the minimum cycle duration has passed.
pub struct CycleScheduler {
    config: RefreshConfig,
    playlists: Arc<dyn PlaylistSource>,
    capture: Arc<dyn FrameCapture>,
    publisher: SnapshotPublisher,
    state: watch::Sender<SchedulerState>,
    cycle: u64,
}

impl CycleScheduler {
    pub fn new(
        config: RefreshConfig,
        playlists: Arc<dyn PlaylistSource>,
        capture: Arc<dyn FrameCapture>,
        publisher: SnapshotPublisher,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            config,
            playlists,
            capture,
            publisher,
            state,
            cycle: 0,
        }
    }

    /// Observe state transitions, e.g. for a health endpoint.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        debug!(%state, cycle = self.cycle, "scheduler state");
        self.state.send_replace(state);
    }

    /// Run cycles until `token` is cancelled.
    ///
    /// A cycle in progress always runs to publication; cancellation only interrupts the
    /// cooldown between cycles.
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            sources = self.config.sources.len(),
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            min_cycle_duration = ?self.config.min_cycle_duration,
            "refresh loop started"
        );

        while !token.is_cancelled() {
            let started = Instant::now();
            self.run_cycle().await;

            if token.is_cancelled() {
                break;
            }

            let elapsed = started.elapsed();
            if let Some(remaining) = self.config.min_cycle_duration.checked_sub(elapsed) {
                if !remaining.is_zero() {
                    self.set_state(SchedulerState::CoolingDown);
                    debug!(?elapsed, ?remaining, "cycle finished early, cooling down");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(remaining) => {}
                    }
                }
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!(cycles = self.cycle, "refresh loop stopped");
    }

    /// Run one full cycle and publish its snapshot.
    pub async fn run_cycle(&mut self) -> Arc<Snapshot> {
        let started = Instant::now();
        self.cycle += 1;

        self.set_state(SchedulerState::Fetching);
        let channels = self.fetch_all().await;

        self.set_state(SchedulerState::Dispatching);
        let aggregator = dispatch(&channels, &self.config, self.capture.as_ref()).await;

        self.set_state(SchedulerState::Publishing);
        let snapshot = self.publisher.publish(aggregator.into_snapshot(self.cycle));

        info!(
            cycle = self.cycle,
            channels = snapshot.len(),
            captured = snapshot.captured_count(),
            elapsed = ?started.elapsed(),
            "snapshot published"
        );
        snapshot
    }

    /// Channels of every source, in source order then playlist order.
    async fn fetch_all(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        for source in &self.config.sources {
            match self.playlists.fetch_playlist(source).await {
                Ok(found) => {
                    debug!(source = %source, channels = found.len(), "playlist fetched");
                    channels.extend(found);
                }
                Err(e) => {
                    warn!(
                        source = %source,
                        error = %e,
                        "playlist fetch failed, skipping source this cycle"
                    );
                }
            }
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::playlist::PlaylistError;
    use crate::snapshot::snapshot_slot;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves fixed channel lists; unknown sources fail.
    struct FakePlaylists {
        lists: HashMap<String, Vec<Channel>>,
        fetches: AtomicUsize,
    }

    impl FakePlaylists {
        fn new(lists: &[(&str, usize)]) -> Self {
            let lists = lists
                .iter()
                .map(|(source, n)| {
                    let channels = (0..*n)
                        .map(|i| Channel::new(format!("{source}{i}"), format!("http://{source}/{i}")))
                        .collect();
                    (source.to_string(), channels)
                })
                .collect();
            Self {
                lists,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlaylistSource for FakePlaylists {
        async fn fetch_playlist(&self, source: &str) -> Result<Vec<Channel>, PlaylistError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.lists
                .get(source)
                .cloned()
                .ok_or(PlaylistError::InvalidFormat)
        }
    }

    /// Counts capture calls and how many ran at once; fails for addresses containing "bad".
    #[derive(Default)]
    struct CountingCapture {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl FrameCapture for CountingCapture {
        async fn capture_frame(&self, address: &str) -> Result<Bytes, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if address.contains("bad") {
                Err(CaptureError::EmptyOutput)
            } else {
                Ok(Bytes::from_static(b"png"))
            }
        }
    }

    fn config(sources: &[&str], concurrency: usize, batch_size: usize) -> RefreshConfig {
        RefreshConfig {
            concurrency,
            batch_size,
            min_cycle_interval: Duration::ZERO,
            min_cycle_duration: Duration::from_secs(30),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.results.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn concatenates_sources_before_partitioning() {
        let playlists = Arc::new(FakePlaylists::new(&[("A", 3), ("B", 2)]));
        let capture = Arc::new(CountingCapture::default());
        let (publisher, reader) = snapshot_slot();
        let mut scheduler = CycleScheduler::new(
            config(&["A", "B"], 2, 2),
            playlists,
            capture.clone(),
            publisher,
        );

        let started = Instant::now();
        let snapshot = scheduler.run_cycle().await;

        assert_eq!(names(&snapshot), ["A0", "A1", "A2", "B0", "B1"]);
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(reader.current().cycle, 1);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 5);
        assert_eq!(capture.max_in_flight.load(Ordering::SeqCst), 2);
        // Runs of 2, 2 and 1 with two slots: the third run starts after the first pair.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_source_is_skipped_and_cycle_still_publishes() {
        let playlists = Arc::new(FakePlaylists::new(&[("A", 3)]));
        let (publisher, reader) = snapshot_slot();
        let mut scheduler = CycleScheduler::new(
            config(&["A", "B"], 2, 2),
            playlists.clone(),
            Arc::new(CountingCapture::default()),
            publisher,
        );

        scheduler.run_cycle().await;

        assert_eq!(playlists.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(names(&reader.current()), ["A0", "A1", "A2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_still_publish_placeholders() {
        let playlists = Arc::new(FakePlaylists::new(&[("bad", 4)]));
        let (publisher, reader) = snapshot_slot();
        let mut scheduler = CycleScheduler::new(
            config(&["bad"], 3, 1),
            playlists,
            Arc::new(CountingCapture::default()),
            publisher,
        );

        scheduler.run_cycle().await;

        let snapshot = reader.current();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.captured_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_channels_publishes_an_empty_snapshot() {
        let capture = Arc::new(CountingCapture::default());
        let (publisher, reader) = snapshot_slot();
        let mut scheduler = CycleScheduler::new(
            config(&["missing"], 2, 2),
            Arc::new(FakePlaylists::new(&[])),
            capture.clone(),
            publisher,
        );

        scheduler.run_cycle().await;

        assert_eq!(reader.current().cycle, 1);
        assert!(reader.current().is_empty());
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_start_no_sooner_than_the_minimum_duration() {
        let (publisher, mut reader) = snapshot_slot();
        let scheduler = CycleScheduler::new(
            config(&["A"], 1, 1),
            Arc::new(FakePlaylists::new(&[("A", 1)])),
            Arc::new(CountingCapture::default()),
            publisher,
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        let started = Instant::now();
        let first = reader.next().await.unwrap();
        let first_at = started.elapsed();
        let second = reader.next().await.unwrap();
        let second_at = started.elapsed();

        assert_eq!(first.cycle, 1);
        assert_eq!(second.cycle, 2);
        assert!(first_at < Duration::from_secs(1), "{first_at:?}");
        // The next cycle starts 30s after the first one started, then takes 100ms.
        assert!(second_at >= Duration::from_millis(30_100), "{second_at:?}");
        assert!(second_at < Duration::from_millis(30_200), "{second_at:?}");

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_cooldown_stops_promptly() {
        let (publisher, mut reader) = snapshot_slot();
        let scheduler = CycleScheduler::new(
            config(&["A"], 1, 1),
            Arc::new(FakePlaylists::new(&[("A", 1)])),
            Arc::new(CountingCapture::default()),
            publisher,
        );
        let mut state = scheduler.state();
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        reader.next().await.unwrap();
        state
            .wait_for(|s| *s == SchedulerState::CoolingDown)
            .await
            .unwrap();

        let cancelled_at = Instant::now();
        token.cancel();
        handle.await.unwrap();

        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert_eq!(*state.borrow(), SchedulerState::Stopped);
        assert_eq!(reader.current().cycle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_cycle_waits_for_publication() {
        let (publisher, reader) = snapshot_slot();
        let scheduler = CycleScheduler::new(
            config(&["A"], 1, 2),
            Arc::new(FakePlaylists::new(&[("A", 4)])),
            Arc::new(CountingCapture::default()),
            publisher,
        );
        let mut state = scheduler.state();
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        state
            .wait_for(|s| *s == SchedulerState::Dispatching)
            .await
            .unwrap();
        token.cancel();
        handle.await.unwrap();

        let snapshot = reader.current();
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.captured_count(), 4);
    }
}

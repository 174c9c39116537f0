use crate::clock::Clock;
use crate::fetcher::{LoadedLyrics, LyricSource, LyricsLoader};
use crate::playback::{PlaybackState, PlaybackUpdate, SongIdentity};
use crate::position::{AnchorChange, PositionEstimator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::info;

const LOG_TARGET: &str = "overlyric::sync";

/// Events emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Track changed to a new track
    TrackChanged {
        identity: SongIdentity,
        position_ms: u64,
    },
    /// Playback was paused
    PlaybackPaused { position_ms: u64 },
    /// Playback was resumed
    PlaybackResumed { position_ms: u64 },
    /// A seek occurred within the current track
    SeekOccurred { position_ms: u64 },
    /// Lyrics were loaded for current track
    LyricsLoaded { lines: usize },
    /// No lyrics found for current track
    LyricsNotFound,
}

/// Engine that keeps playback state, position extrapolation and lyrics in step
/// with the authoritative playback source.
pub struct SyncEngine {
    state: Arc<PlaybackState>,
    estimator: Arc<PositionEstimator>,
    loader: Arc<LyricsLoader>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Arguments
    /// * `state` - Shared playback store
    /// * `estimator` - Position estimator fed by every applied update
    /// * `source` - Lyric source used by the background loader
    /// * `clock` - Clock used to pace lyric retries
    /// * `retry_interval` - Minimum wait before re-fetching after a miss
    #[must_use]
    pub fn new(
        state: Arc<PlaybackState>,
        estimator: Arc<PositionEstimator>,
        source: Arc<LyricSource>,
        clock: Arc<dyn Clock>,
        retry_interval: Duration,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        let loader = LyricsLoader::new(source, clock, retry_interval, event_tx.clone());

        Arc::new(Self {
            state,
            estimator,
            loader,
            event_tx,
        })
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to lyrics changes
    pub fn subscribe_lyrics(&self) -> watch::Receiver<Option<Arc<LoadedLyrics>>> {
        self.loader.subscribe()
    }

    /// Apply an authoritative update from the playback source.
    ///
    /// Must run inside a tokio runtime: a missing lyric fetch is spawned from here.
    pub fn apply(&self, update: PlaybackUpdate) {
        self.state.write(update);
        let snapshot = self.state.read();
        let identity = snapshot.identity();
        let position_ms = snapshot.position_ms;

        let event = match self.estimator.observe(&snapshot) {
            AnchorChange::TrackChanged => {
                info!(target: LOG_TARGET, "Track changed: {}", identity);
                Some(SyncEvent::TrackChanged {
                    identity: identity.clone(),
                    position_ms,
                })
            }
            AnchorChange::Seeked => Some(SyncEvent::SeekOccurred { position_ms }),
            AnchorChange::Paused => Some(SyncEvent::PlaybackPaused { position_ms }),
            AnchorChange::Resumed => Some(SyncEvent::PlaybackResumed { position_ms }),
            AnchorChange::Resynced => None,
        };
        if let Some(event) = event {
            let _ = self.event_tx.send(event);
        }

        self.loader.request(&identity, snapshot.duration_ms);
    }

    #[must_use]
    pub fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }

    #[must_use]
    pub fn estimator(&self) -> &Arc<PositionEstimator> {
        &self.estimator
    }

    /// Get current lyrics
    #[must_use]
    pub fn lyrics(&self) -> Option<Arc<LoadedLyrics>> {
        self.loader.current()
    }

    /// Raw lyric text for the current song, from the loaded lyrics or the cache
    #[must_use]
    pub fn lyric_text(&self) -> Option<String> {
        let identity = self.state.identity();
        match self.loader.current() {
            Some(loaded) if loaded.identity == identity => Some(loaded.raw.clone()),
            _ => self.loader.source().cached(&identity),
        }
    }

    /// Get interpolated current position
    #[must_use]
    pub fn current_position_ms(&self) -> u64 {
        self.estimator.position_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LyricsCache;
    use crate::clock::ManualClock;
    use crate::error::CoreError;
    use crate::playback::TrackInfo;
    use crate::provider::{LyricsProvider, LyricsQuery};
    use async_trait::async_trait;

    struct StaticProvider(&'static str);

    #[async_trait]
    impl LyricsProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, _query: &LyricsQuery) -> Result<Option<String>, CoreError> {
            Ok(Some(self.0.to_string()))
        }
    }

    /// Records the track length each query carried.
    struct DurationRecorder(Arc<std::sync::Mutex<Vec<Option<u32>>>>);

    #[async_trait]
    impl LyricsProvider for DurationRecorder {
        fn name(&self) -> &str {
            "durations"
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError> {
            self.0.lock().unwrap().push(query.duration_secs);
            Ok(Some("[00:01.00]one".to_string()))
        }
    }

    fn engine(clock: Arc<ManualClock>) -> Arc<SyncEngine> {
        engine_with(
            clock,
            Box::new(StaticProvider("[00:01.00]one\n[00:02.00]two")),
        )
    }

    fn engine_with(clock: Arc<ManualClock>, provider: Box<dyn LyricsProvider>) -> Arc<SyncEngine> {
        let source = Arc::new(LyricSource::new(
            Arc::new(LyricsCache::new()),
            vec![provider],
            Duration::from_secs(1),
        ));
        SyncEngine::new(
            Arc::new(PlaybackState::new()),
            Arc::new(PositionEstimator::new(clock.clone(), Duration::from_secs(2))),
            source,
            clock,
            Duration::from_secs(1),
        )
    }

    fn update(title: &str, position_ms: u64, is_playing: bool) -> PlaybackUpdate {
        PlaybackUpdate {
            track: Some(TrackInfo {
                title: Some(title.to_string()),
                artist: Some("Artist".to_string()),
                album: None,
                duration_ms: Some(200_000),
                cover_url: None,
            }),
            is_playing: Some(is_playing),
            position_ms: Some(position_ms),
            volume: Some(40),
        }
    }

    #[tokio::test]
    async fn test_track_change_emits_event_and_loads_lyrics() {
        let engine = engine(Arc::new(ManualClock::new(0)));
        let mut events = engine.subscribe();
        let mut lyrics = engine.subscribe_lyrics();

        engine.apply(update("Song", 0, true));

        assert!(matches!(events.recv().await.unwrap(), SyncEvent::TrackChanged { .. }));
        lyrics.wait_for(Option::is_some).await.unwrap();
        assert_eq!(engine.lyrics().unwrap().timeline.len(), 2);
        assert_eq!(engine.lyric_text().as_deref(), Some("[00:01.00]one\n[00:02.00]two"));
    }

    #[tokio::test]
    async fn test_polled_duration_reaches_lyrics_query() {
        let durations = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(
            Arc::new(ManualClock::new(0)),
            Box::new(DurationRecorder(Arc::clone(&durations))),
        );
        let mut lyrics = engine.subscribe_lyrics();

        engine.apply(update("Song", 0, true));
        lyrics.wait_for(Option::is_some).await.unwrap();

        assert_eq!(*durations.lock().unwrap(), vec![Some(200)]);
    }

    #[tokio::test]
    async fn test_pause_and_seek_events() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock.clone());
        let mut events = engine.subscribe();

        engine.apply(update("Song", 1000, true));
        clock.advance(Duration::from_millis(100));
        engine.apply(update("Song", 1100, false));
        engine.apply(update("Song", 90_000, false));

        assert!(matches!(events.recv().await.unwrap(), SyncEvent::TrackChanged { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::PlaybackPaused { position_ms: 1100 }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::SeekOccurred { position_ms: 90_000 }
        );
        assert_eq!(engine.current_position_ms(), 90_000);
    }

    #[tokio::test]
    async fn test_regular_resync_is_silent() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock.clone());
        let mut events = engine.subscribe();

        engine.apply(update("Song", 1000, true));
        clock.advance(Duration::from_millis(100));
        engine.apply(update("Song", 1100, true));

        assert!(matches!(events.recv().await.unwrap(), SyncEvent::TrackChanged { .. }));
        // Only the loader's event may follow
        if let Ok(event) = events.try_recv() {
            assert!(matches!(event, SyncEvent::LyricsLoaded { .. }));
        }
        assert_eq!(engine.state().read().volume, 40);
    }
}

//! Control API handlers, independent of the HTTP layer.

use crate::error::{Result, ServerError};
use overlyric_core::{
    format_position, CommandDispatcher, CoverImage, CoverSource, MediaCommand, SyncEngine,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "overlyric::server::api";

const SUCCESS: &str = "success";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingResponse {
    pub status: &'static str,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub is_playing: bool,
    /// Estimated position in milliseconds
    pub position: u64,
    pub volume: u8,
    /// Capture time of the underlying snapshot
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub status: &'static str,
    pub action: &'static str,
    pub is_playing: bool,
    pub volume: u8,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LyricResponse {
    pub status: &'static str,
    pub lyric: String,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub status: &'static str,
    pub position: u64,
    /// `MM:SS:mmm`
    pub formatted: String,
}

/// Shared state behind every control endpoint.
///
/// Command handlers read playback state back after `settle_delay`. That wait
/// lets the optimistic update land but does not order concurrent commands, so
/// a response can reflect another request's change.
pub struct ControlApi {
    dispatcher: Arc<CommandDispatcher>,
    engine: Arc<SyncEngine>,
    cover: Option<Arc<dyn CoverSource>>,
    settle_delay: Duration,
}

impl ControlApi {
    #[must_use]
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        engine: Arc<SyncEngine>,
        cover: Option<Arc<dyn CoverSource>>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            dispatcher,
            engine,
            cover,
            settle_delay,
        }
    }

    #[must_use]
    pub fn now_playing(&self) -> NowPlayingResponse {
        let snapshot = self.engine.state().read();
        NowPlayingResponse {
            status: SUCCESS,
            title: snapshot.title,
            artist: snapshot.artist,
            album: snapshot.album,
            is_playing: snapshot.is_playing,
            position: self.engine.current_position_ms(),
            volume: snapshot.volume,
            timestamp: snapshot.timestamp,
        }
    }

    /// Dispatch `command`, wait for the settle delay, then report the state.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Command`] if the transport rejected the command.
    /// The optimistic state change is kept in that case.
    pub async fn command(&self, command: MediaCommand) -> Result<CommandResponse> {
        let action = command.as_str();
        self.dispatcher
            .dispatch(command)
            .map_err(|source| ServerError::Command { action, source })?;

        tokio::time::sleep(self.settle_delay).await;

        let state = self.dispatcher.state();
        Ok(CommandResponse {
            status: SUCCESS,
            action,
            is_playing: state.is_playing(),
            volume: state.volume(),
            message: format!("Sent {action}"),
        })
    }

    /// Raw lyric text of the current song.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LyricNotFound`] when no provider resolved the song.
    pub fn lyric(&self) -> Result<LyricResponse> {
        self.engine
            .lyric_text()
            .map(|lyric| LyricResponse {
                status: SUCCESS,
                lyric,
            })
            .ok_or(ServerError::LyricNotFound)
    }

    /// Cover image of the current song.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::CoverNotFound`] when there is no cover URL, no
    /// cover source, or the download fails.
    pub async fn cover(&self) -> Result<CoverImage> {
        let Some(source) = &self.cover else {
            return Err(ServerError::CoverNotFound);
        };
        let Some(cover_url) = self.engine.state().read().cover_url else {
            return Err(ServerError::CoverNotFound);
        };

        match source.fetch_cover(&cover_url).await {
            Ok(Some(image)) => Ok(image),
            Ok(None) => {
                debug!(target: LOG_TARGET, "Cover not available at {}", cover_url);
                Err(ServerError::CoverNotFound)
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Cover download failed: {}", e);
                Err(ServerError::CoverNotFound)
            }
        }
    }

    #[must_use]
    pub fn current_position(&self) -> PositionResponse {
        let position = self.engine.current_position_ms();
        PositionResponse {
            status: SUCCESS,
            position,
            formatted: format_position(position),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use overlyric_core::{
        CoreError, LyricSource, LyricsCache, ManualClock, PlaybackState, PlaybackUpdate,
        PositionEstimator, SongIdentity, TrackInfo, TransportControl,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<MediaCommand>>,
        pub(crate) fail: bool,
    }

    impl TransportControl for RecordingTransport {
        fn send(&self, command: MediaCommand) -> std::result::Result<(), CoreError> {
            self.sent.lock().unwrap().push(command);
            if self.fail {
                return Err(CoreError::TransportFailed {
                    command: command.to_string(),
                    reason: "player offline".to_string(),
                });
            }
            Ok(())
        }
    }

    pub(crate) struct StaticCover;

    #[async_trait]
    impl CoverSource for StaticCover {
        async fn fetch_cover(
            &self,
            cover_url: &str,
        ) -> std::result::Result<Option<CoverImage>, CoreError> {
            Ok((cover_url == "/art/1.png").then(|| CoverImage {
                bytes: vec![1, 2, 3],
                content_type: "image/png".to_string(),
            }))
        }
    }

    pub(crate) struct Fixture {
        pub(crate) api: ControlApi,
        pub(crate) transport: Arc<RecordingTransport>,
        pub(crate) cache: Arc<LyricsCache>,
        pub(crate) clock: Arc<ManualClock>,
    }

    pub(crate) fn fixture(fail: bool) -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let state = Arc::new(PlaybackState::new());
        let estimator = Arc::new(PositionEstimator::new(clock.clone(), Duration::from_secs(2)));
        let cache = Arc::new(LyricsCache::new());
        let engine = SyncEngine::new(
            Arc::clone(&state),
            Arc::clone(&estimator),
            Arc::new(LyricSource::new(
                Arc::clone(&cache),
                Vec::new(),
                Duration::from_secs(1),
            )),
            clock.clone(),
            Duration::from_secs(1),
        );
        engine.apply(PlaybackUpdate {
            track: Some(TrackInfo {
                title: Some("Song".to_string()),
                artist: Some("Artist".to_string()),
                album: Some("Album".to_string()),
                duration_ms: Some(200_000),
                cover_url: Some("/art/1.png".to_string()),
            }),
            is_playing: Some(true),
            position_ms: Some(61_234),
            volume: Some(40),
        });

        let transport = Arc::new(RecordingTransport {
            fail,
            ..Default::default()
        });
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            state,
            estimator,
            5,
        ));
        let api = ControlApi::new(
            dispatcher,
            engine,
            Some(Arc::new(StaticCover)),
            Duration::from_millis(50),
        );
        Fixture {
            api,
            transport,
            cache,
            clock,
        }
    }

    fn current_identity() -> SongIdentity {
        SongIdentity::new(Some("Song"), Some("Artist"), Some("Album"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_reports_optimistic_state() {
        let fixture = fixture(false);

        let response = fixture.api.command(MediaCommand::PlayPause).await.unwrap();
        assert_eq!(response.action, "play-pause");
        assert!(!response.is_playing);
        assert_eq!(response.volume, 40);

        let response = fixture.api.command(MediaCommand::VolumeDown).await.unwrap();
        assert_eq!(response.volume, 35);

        let response = fixture.api.command(MediaCommand::Mute).await.unwrap();
        assert_eq!(response.volume, 0);

        assert_eq!(
            *fixture.transport.sent.lock().unwrap(),
            vec![
                MediaCommand::PlayPause,
                MediaCommand::VolumeDown,
                MediaCommand::Mute
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_waits_for_settle_delay() {
        let fixture = fixture(false);
        let start = tokio::time::Instant::now();
        fixture.api.command(MediaCommand::NextTrack).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_optimistic_update() {
        let fixture = fixture(true);
        let err = fixture.api.command(MediaCommand::VolumeUp).await.unwrap_err();
        assert!(matches!(err, ServerError::Command { action: "volume-up", .. }));
        assert_eq!(fixture.api.now_playing().volume, 45);
    }

    #[tokio::test]
    async fn test_now_playing_uses_estimated_position() {
        let fixture = fixture(false);
        fixture.clock.advance(Duration::from_millis(500));

        let response = fixture.api.now_playing();
        assert_eq!(response.title.as_deref(), Some("Song"));
        assert!(response.is_playing);
        assert_eq!(response.position, 61_734);
        assert_eq!(response.volume, 40);
    }

    #[tokio::test]
    async fn test_current_position_is_formatted() {
        let fixture = fixture(false);
        let response = fixture.api.current_position();
        assert_eq!(response.position, 61_234);
        assert_eq!(response.formatted, "01:01:234");
    }

    #[tokio::test]
    async fn test_lyric_from_cache_or_not_found() {
        let fixture = fixture(false);
        assert!(matches!(fixture.api.lyric(), Err(ServerError::LyricNotFound)));

        fixture
            .cache
            .store(current_identity(), "[00:01.00]Hello".to_string());
        assert_eq!(fixture.api.lyric().unwrap().lyric, "[00:01.00]Hello");
    }

    #[tokio::test]
    async fn test_cover_lookup() {
        let fixture = fixture(false);
        let image = fixture.api.cover().await.unwrap();
        assert_eq!(image.content_type, "image/png");

        fixture.api.engine.state().write(PlaybackUpdate {
            track: Some(TrackInfo {
                title: Some("Song".to_string()),
                artist: Some("Artist".to_string()),
                album: Some("Album".to_string()),
                duration_ms: None,
                cover_url: Some("/art/other.png".to_string()),
            }),
            ..Default::default()
        });
        assert!(matches!(
            fixture.api.cover().await,
            Err(ServerError::CoverNotFound)
        ));
    }
}

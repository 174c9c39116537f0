//! Fixed-rate lyric line selection and transition animation.
//!
//! [`SyncRenderer`] owns the [`AnimationState`] exclusively. Each tick it asks
//! the position estimator where playback is, resolves that against the loaded
//! timeline, and advances the cross-fade, the vertical offset and the horizontal
//! scroll of over-wide lines. Drawing is left to whoever subscribes.

use crate::clock::Clock;
use crate::config::RendererConfig;
use crate::fetcher::LoadedLyrics;
use crate::playback::{PlaybackState, SongIdentity};
use crate::position::PositionEstimator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const LOG_TARGET: &str = "overlyric::renderer";

/// Offsets smaller than this are snapped to zero.
const OFFSET_EPSILON: f32 = 0.01;

/// Measures the rendered width of a line.
pub trait TextMeasure: Send + Sync {
    fn width_px(&self, text: &str) -> f32;
}

/// Fixed-pitch measurement: wide (CJK, fullwidth) characters take two cells.
#[derive(Debug, Clone, Copy)]
pub struct CharWidthMeasure {
    char_width_px: f32,
}

impl CharWidthMeasure {
    #[must_use]
    pub const fn new(char_width_px: f32) -> Self {
        Self { char_width_px }
    }
}

impl TextMeasure for CharWidthMeasure {
    fn width_px(&self, text: &str) -> f32 {
        let cells: u32 = text.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum();
        #[allow(clippy::cast_precision_loss)]
        let cells = cells as f32;
        cells * self.char_width_px
    }
}

fn is_wide(c: char) -> bool {
    matches!(u32::from(c),
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1F64F
        | 0x20000..=0x3FFFD)
}

/// What the overlay should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// No lyrics for the current song (yet)
    #[default]
    Placeholder,
    /// Timed lines are being followed
    Synced,
    /// Lyrics arrived without usable timing; show the raw text
    Unsynced,
}

/// Horizontal scroll of an active line wider than the viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollState {
    pub active: bool,
    pub offset_px: f32,
    pub line_width_px: f32,
    /// Clock reading when the current pass started; scrolling waits for the delay
    started_at_ms: u64,
}

/// Animation state read by the rendering collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationState {
    pub identity: SongIdentity,
    pub display: DisplayMode,
    pub current_index: Option<usize>,
    pub previous_index: Option<usize>,
    pub current_text: Option<String>,
    pub previous_text: Option<String>,
    /// Cross-fade from previous to current line, always within `0..=1`
    pub progress: f32,
    /// Vertical offset of the current line, smoothed toward zero
    pub offset_y: f32,
    pub scroll: ScrollState,
    /// Raw lyric text when [`DisplayMode::Unsynced`]
    pub plain_text: Option<String>,
}

impl AnimationState {
    fn reset(identity: SongIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }
}

/// Drives [`AnimationState`] from the estimated playback position.
pub struct SyncRenderer {
    config: RendererConfig,
    clock: Arc<dyn Clock>,
    state: Arc<PlaybackState>,
    estimator: Arc<PositionEstimator>,
    lyrics: watch::Receiver<Option<Arc<LoadedLyrics>>>,
    measure: Box<dyn TextMeasure>,
    animation: AnimationState,
    animation_tx: watch::Sender<AnimationState>,
}

impl SyncRenderer {
    #[must_use]
    pub fn new(
        config: RendererConfig,
        clock: Arc<dyn Clock>,
        state: Arc<PlaybackState>,
        estimator: Arc<PositionEstimator>,
        lyrics: watch::Receiver<Option<Arc<LoadedLyrics>>>,
    ) -> Self {
        let measure = Box::new(CharWidthMeasure::new(config.char_width_px));
        let (animation_tx, _) = watch::channel(AnimationState::default());
        Self {
            config,
            clock,
            state,
            estimator,
            lyrics,
            measure,
            animation: AnimationState::default(),
            animation_tx,
        }
    }

    /// Replace the text measurement used to decide scrolling
    #[must_use]
    pub fn with_measure(mut self, measure: Box<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    /// Subscribe to animation state after every tick that changed it
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AnimationState> {
        self.animation_tx.subscribe()
    }

    #[must_use]
    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    /// Advance one frame.
    pub fn tick(&mut self) -> &AnimationState {
        let identity = self.state.identity();
        if identity != self.animation.identity {
            debug!(target: LOG_TARGET, "Resetting animation for {}", identity);
            self.animation = AnimationState::reset(identity);
        }

        let loaded = self
            .lyrics
            .borrow()
            .clone()
            .filter(|loaded| loaded.identity == self.animation.identity);

        match loaded {
            None => {
                if self.animation.display != DisplayMode::Placeholder {
                    self.animation = AnimationState::reset(self.animation.identity.clone());
                }
            }
            Some(loaded) if loaded.timeline.is_empty() => {
                self.animation.display = DisplayMode::Unsynced;
                if self.animation.plain_text.is_none() {
                    self.animation.plain_text = Some(loaded.raw.trim().to_string());
                }
            }
            Some(loaded) => {
                self.animation.display = DisplayMode::Synced;
                self.animation.plain_text = None;
                let index = loaded.timeline.resolve(self.estimator.position_ms());
                let text = index
                    .and_then(|i| loaded.timeline.line(i))
                    .map(|line| line.text.clone());
                self.advance(index, text);
            }
        }

        &self.animation
    }

    fn advance(&mut self, index: Option<usize>, text: Option<String>) {
        let now = self.clock.now_ms();
        let animation = &mut self.animation;

        if index == animation.current_index {
            animation.progress = (animation.progress + self.config.progress_step).clamp(0.0, 1.0);
            animation.offset_y *= 1.0 - self.config.offset_smoothing;
            if animation.offset_y.abs() < OFFSET_EPSILON {
                animation.offset_y = 0.0;
            }
        } else {
            animation.previous_index = animation.current_index;
            animation.previous_text = animation.current_text.take();
            animation.current_index = index;
            animation.current_text = text;
            if self.config.animate {
                animation.progress = 0.0;
                animation.offset_y = self.config.line_offset_px;
            } else {
                animation.progress = 1.0;
                animation.offset_y = 0.0;
            }

            let line_width_px = animation
                .current_text
                .as_deref()
                .map_or(0.0, |t| self.measure.width_px(t));
            animation.scroll = ScrollState {
                active: self.config.scroll_enabled && line_width_px > self.config.viewport_width_px,
                offset_px: 0.0,
                line_width_px,
                started_at_ms: now,
            };
            return;
        }

        let scroll = &mut animation.scroll;
        if scroll.active && now.saturating_sub(scroll.started_at_ms) >= self.config.scroll_delay_ms {
            scroll.offset_px += self.config.scroll_speed_px;
            if scroll.offset_px >= scroll.line_width_px + self.config.scroll_gap_px {
                scroll.offset_px = 0.0;
                scroll.started_at_ms = now;
            }
        }
    }

    /// Tick at the configured interval until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            target: LOG_TARGET,
            "Renderer started ({}ms ticks)", self.config.tick_interval_ms
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let animation = self.tick().clone();
                    self.animation_tx.send_if_modified(|current| {
                        if *current == animation {
                            false
                        } else {
                            *current = animation;
                            true
                        }
                    });
                }
            }
        }

        info!(target: LOG_TARGET, "Renderer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lrc::LyricTimeline;
    use crate::playback::{PlaybackUpdate, TrackInfo};
    use std::time::Duration;

    struct Harness {
        clock: Arc<ManualClock>,
        state: Arc<PlaybackState>,
        estimator: Arc<PositionEstimator>,
        lyrics_tx: watch::Sender<Option<Arc<LoadedLyrics>>>,
        renderer: SyncRenderer,
    }

    fn harness(config: RendererConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(0));
        let state = Arc::new(PlaybackState::new());
        let estimator = Arc::new(PositionEstimator::new(clock.clone(), Duration::from_secs(2)));
        let (lyrics_tx, lyrics_rx) = watch::channel(None);
        let renderer = SyncRenderer::new(
            config,
            clock.clone(),
            Arc::clone(&state),
            Arc::clone(&estimator),
            lyrics_rx,
        );
        Harness {
            clock,
            state,
            estimator,
            lyrics_tx,
            renderer,
        }
    }

    impl Harness {
        fn play(&self, title: &str, position_ms: u64) {
            self.state.write(PlaybackUpdate {
                track: Some(TrackInfo {
                    title: Some(title.to_string()),
                    artist: Some("Artist".to_string()),
                    ..Default::default()
                }),
                is_playing: Some(true),
                position_ms: Some(position_ms),
                volume: None,
            });
            self.estimator.observe(&self.state.read());
        }

        fn load(&self, raw: &str) {
            let identity = self.state.identity();
            self.lyrics_tx.send_replace(Some(Arc::new(LoadedLyrics {
                identity,
                raw: raw.to_string(),
                timeline: LyricTimeline::parse(raw),
            })));
        }

        fn step(&mut self, ms: u64) -> AnimationState {
            self.clock.advance(Duration::from_millis(ms));
            self.renderer.tick().clone()
        }
    }

    const LRC: &str = "[00:01.00]first\n[00:02.00]second\n[00:03.00]third";

    #[test]
    fn test_placeholder_without_lyrics() {
        let mut h = harness(RendererConfig::default());
        h.play("Song", 0);
        let state = h.step(16);
        assert_eq!(state.display, DisplayMode::Placeholder);
        assert_eq!(state.current_index, None);
    }

    #[test]
    fn test_line_change_resets_progress() {
        let mut h = harness(RendererConfig::default());
        h.play("Song", 900);
        h.load(LRC);

        let state = h.step(50);
        assert_eq!(state.current_index, None);

        let state = h.step(100);
        assert_eq!(state.display, DisplayMode::Synced);
        assert_eq!(state.current_index, Some(0));
        assert_eq!(state.current_text.as_deref(), Some("first"));
        assert!(state.progress.abs() < f32::EPSILON);
        assert!((state.offset_y - 24.0).abs() < f32::EPSILON);

        let state = h.step(1000);
        assert_eq!(state.current_index, Some(1));
        assert_eq!(state.previous_index, Some(0));
        assert_eq!(state.previous_text.as_deref(), Some("first"));
        assert!(state.progress.abs() < f32::EPSILON);
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut h = harness(RendererConfig::default());
        h.play("Song", 1000);
        h.load(LRC);
        h.step(0);

        let mut last_progress = 0.0;
        let mut last_offset = f32::MAX;
        for _ in 0..40 {
            let state = h.step(10);
            assert_eq!(state.current_index, Some(0));
            assert!(state.progress >= last_progress);
            assert!((0.0..=1.0).contains(&state.progress));
            assert!(state.offset_y <= last_offset);
            last_progress = state.progress;
            last_offset = state.offset_y;
        }
        assert!((last_progress - 1.0).abs() < f32::EPSILON);
        assert!(last_offset < 1.0);
    }

    #[test]
    fn test_animation_disabled_applies_instantly() {
        let mut h = harness(RendererConfig {
            animate: false,
            ..RendererConfig::default()
        });
        h.play("Song", 1000);
        h.load(LRC);
        let state = h.step(0);
        assert!((state.progress - 1.0).abs() < f32::EPSILON);
        assert!(state.offset_y.abs() < f32::EPSILON);
    }

    #[test]
    fn test_song_change_resets_state() {
        let mut h = harness(RendererConfig::default());
        h.play("First", 1500);
        h.load(LRC);
        assert_eq!(h.step(0).current_index, Some(0));

        h.play("Second", 1500);
        let state = h.step(16);
        assert_eq!(state.identity.title(), "Second");
        assert_eq!(state.current_index, None);
        assert_eq!(state.previous_index, None);
        assert_eq!(state.display, DisplayMode::Placeholder);
    }

    #[test]
    fn test_unparseable_lyrics_fall_back_to_raw_text() {
        let mut h = harness(RendererConfig::default());
        h.play("Song", 0);
        h.load("plain lyrics\nno timing\n");
        let state = h.step(16);
        assert_eq!(state.display, DisplayMode::Unsynced);
        assert_eq!(state.plain_text.as_deref(), Some("plain lyrics\nno timing"));
    }

    #[test]
    fn test_wide_line_scrolls_after_delay_and_wraps() {
        let mut h = harness(RendererConfig {
            viewport_width_px: 100.0,
            char_width_px: 10.0,
            scroll_speed_px: 10.0,
            scroll_gap_px: 20.0,
            scroll_delay_ms: 100,
            ..RendererConfig::default()
        });
        h.play("Song", 1000);
        h.load("[00:01.00]0123456789abcdef\n[00:30.00]next");

        let state = h.step(0);
        assert!(state.scroll.active);
        assert!((state.scroll.line_width_px - 160.0).abs() < f32::EPSILON);

        // Still inside the delay
        assert!(h.step(50).scroll.offset_px.abs() < f32::EPSILON);

        let state = h.step(50);
        assert!((state.scroll.offset_px - 10.0).abs() < f32::EPSILON);

        // 160 + 20 gap = 18 steps to wrap
        let mut wrapped = false;
        for _ in 0..17 {
            if h.step(16).scroll.offset_px.abs() < f32::EPSILON {
                wrapped = true;
            }
        }
        assert!(wrapped);
    }

    #[test]
    fn test_line_change_cancels_scroll() {
        let mut h = harness(RendererConfig {
            viewport_width_px: 100.0,
            char_width_px: 10.0,
            scroll_delay_ms: 0,
            ..RendererConfig::default()
        });
        h.play("Song", 1000);
        h.load("[00:01.00]0123456789abcdef\n[00:02.00]short");
        assert!(h.step(0).scroll.active);
        assert!(h.step(16).scroll.offset_px > 0.0);

        let state = h.step(1000);
        assert_eq!(state.current_text.as_deref(), Some("short"));
        assert!(!state.scroll.active);
        assert!(state.scroll.offset_px.abs() < f32::EPSILON);
    }

    #[test]
    fn test_wide_characters_measure_double() {
        let measure = CharWidthMeasure::new(10.0);
        assert!((measure.width_px("ab") - 20.0).abs() < f32::EPSILON);
        assert!((measure.width_px("你好") - 40.0).abs() < f32::EPSILON);
    }

    struct FixedMeasure(f32);

    impl TextMeasure for FixedMeasure {
        fn width_px(&self, _text: &str) -> f32 {
            self.0
        }
    }

    #[test]
    fn test_custom_measure_decides_scrolling() {
        let mut h = harness(RendererConfig::default());
        h.renderer = h.renderer.with_measure(Box::new(FixedMeasure(5000.0)));
        h.play("Song", 1000);
        h.load(LRC);

        let state = h.step(0);
        assert_eq!(state.current_text.as_deref(), Some("first"));
        assert!(state.scroll.active);
        assert!((state.scroll.line_width_px - 5000.0).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_until_cancelled() {
        let h = harness(RendererConfig::default());
        h.play("Song", 1000);
        h.load(LRC);
        let mut rx = h.renderer.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.renderer.run(cancel.clone()));

        rx.wait_for(|state| state.current_index == Some(0)).await.unwrap();
        cancel.cancel();
        task.await.unwrap();
    }
}

//! Playback position extrapolation between authoritative polls.

use crate::clock::Clock;
use crate::playback::{PlaybackSnapshot, SongIdentity};
use crate::time::DurationExt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

const LOG_TARGET: &str = "overlyric::position";

/// How an observed snapshot moved the extrapolation anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorChange {
    /// A different track started; extrapolation restarted from its position
    TrackChanged,
    /// Position jumped further than the seek threshold
    Seeked,
    /// Playing state flipped to paused
    Paused,
    /// Playing state flipped to playing
    Resumed,
    /// Regular drift correction
    Resynced,
}

/// Last authoritative position and the clock reading it was taken at.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    position_ms: u64,
    at_ms: u64,
    playing: bool,
    /// 0 when unknown
    duration_ms: u64,
}

/// Estimates the current playback position from the last authoritative anchor.
///
/// While playing the estimate is `anchor + (now - anchor_time)`; while paused it
/// is the frozen anchor. The anchor is replaced as a whole, so a reader never
/// pairs a new position with an old anchor time.
pub struct PositionEstimator {
    clock: Arc<dyn Clock>,
    seek_threshold_ms: u64,
    anchor: RwLock<Anchor>,
    identity: RwLock<Option<SongIdentity>>,
}

impl PositionEstimator {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, seek_threshold: Duration) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            seek_threshold_ms: seek_threshold.as_millis_u64(),
            anchor: RwLock::new(Anchor {
                position_ms: 0,
                at_ms: now,
                playing: false,
                duration_ms: 0,
            }),
            identity: RwLock::new(None),
        }
    }

    /// Estimated position in milliseconds right now.
    #[must_use]
    pub fn position_ms(&self) -> u64 {
        self.estimate(&self.load_anchor())
    }

    fn estimate(&self, anchor: &Anchor) -> u64 {
        if !anchor.playing {
            return anchor.position_ms;
        }

        let elapsed = self.clock.now_ms().saturating_sub(anchor.at_ms);
        let estimate = anchor.position_ms.saturating_add(elapsed);

        match anchor.duration_ms {
            0 => estimate,
            duration => estimate.min(duration),
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.load_anchor().playing
    }

    fn load_anchor(&self) -> Anchor {
        *self.anchor.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resynchronize from an authoritative snapshot.
    pub fn observe(&self, snapshot: &PlaybackSnapshot) -> AnchorChange {
        let identity = snapshot.identity();
        let track_changed = {
            let mut current = self
                .identity
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = current.as_ref() != Some(&identity);
            if changed {
                *current = Some(identity);
            }
            changed
        };

        let (was_playing, expected) = {
            let mut anchor = self.anchor.write().unwrap_or_else(PoisonError::into_inner);
            let previous = *anchor;
            let expected = self.estimate(&previous);
            *anchor = Anchor {
                position_ms: snapshot.position_ms,
                at_ms: self.clock.now_ms(),
                playing: snapshot.is_playing,
                duration_ms: snapshot.duration_ms.unwrap_or(0),
            };
            (previous.playing, expected)
        };

        let change = if track_changed {
            AnchorChange::TrackChanged
        } else if expected.abs_diff(snapshot.position_ms) > self.seek_threshold_ms {
            AnchorChange::Seeked
        } else if was_playing && !snapshot.is_playing {
            AnchorChange::Paused
        } else if !was_playing && snapshot.is_playing {
            AnchorChange::Resumed
        } else {
            AnchorChange::Resynced
        };

        if change != AnchorChange::Resynced {
            debug!(
                target: LOG_TARGET,
                "Anchor {:?} at {}ms (expected {}ms)", change, snapshot.position_ms, expected
            );
        }
        change
    }

    /// Switch between playing and paused without an authoritative snapshot.
    ///
    /// Pausing freezes the current estimate; resuming restarts extrapolation
    /// from it.
    pub fn set_playing(&self, playing: bool) {
        let mut anchor = self.anchor.write().unwrap_or_else(PoisonError::into_inner);
        *anchor = Anchor {
            position_ms: self.estimate(&anchor),
            at_ms: self.clock.now_ms(),
            playing,
            ..*anchor
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn snapshot(title: &str, position_ms: u64, is_playing: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            album: Some("Album".to_string()),
            is_playing,
            position_ms,
            duration_ms: None,
            volume: 50,
            cover_url: None,
            timestamp: 0,
        }
    }

    fn estimator() -> (Arc<ManualClock>, PositionEstimator) {
        let clock = Arc::new(ManualClock::new(10_000));
        let estimator = PositionEstimator::new(clock.clone(), Duration::from_secs(2));
        (clock, estimator)
    }

    #[test]
    fn test_extrapolates_while_playing() {
        let (clock, estimator) = estimator();
        estimator.observe(&snapshot("Song", 1000, true));
        clock.advance(Duration::from_millis(500));
        assert_eq!(estimator.position_ms(), 1500);
    }

    #[test]
    fn test_frozen_while_paused() {
        let (clock, estimator) = estimator();
        estimator.observe(&snapshot("Song", 1000, true));
        clock.advance(Duration::from_millis(300));
        let change = estimator.observe(&snapshot("Song", 1300, false));
        assert_eq!(change, AnchorChange::Paused);

        clock.advance(Duration::from_secs(60));
        assert_eq!(estimator.position_ms(), 1300);
    }

    #[test]
    fn test_track_change_resets_without_extrapolation() {
        let (clock, estimator) = estimator();
        estimator.observe(&snapshot("First", 90_000, true));
        clock.advance(Duration::from_secs(5));

        let change = estimator.observe(&snapshot("Second", 0, true));
        assert_eq!(change, AnchorChange::TrackChanged);
        assert_eq!(estimator.position_ms(), 0);
    }

    #[test]
    fn test_seek_detected_beyond_threshold() {
        let (clock, estimator) = estimator();
        estimator.observe(&snapshot("Song", 1000, true));
        clock.advance(Duration::from_millis(100));

        assert_eq!(
            estimator.observe(&snapshot("Song", 1150, true)),
            AnchorChange::Resynced
        );
        assert_eq!(
            estimator.observe(&snapshot("Song", 60_000, true)),
            AnchorChange::Seeked
        );
        assert_eq!(estimator.position_ms(), 60_000);
    }

    #[test]
    fn test_clamped_to_duration() {
        let (clock, estimator) = estimator();
        let mut snap = snapshot("Song", 178_000, true);
        snap.duration_ms = Some(180_000);
        estimator.observe(&snap);
        clock.advance(Duration::from_secs(10));
        assert_eq!(estimator.position_ms(), 180_000);
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_anchor() {
        let (clock, estimator) = estimator();
        let estimator = Arc::new(estimator);
        // Position tracks the clock exactly: position = now - 10_000
        estimator.observe(&snapshot("Song", 0, true));

        let writer = {
            let clock = Arc::clone(&clock);
            let estimator = Arc::clone(&estimator);
            std::thread::spawn(move || {
                for _ in 0..20_000 {
                    clock.advance(Duration::from_millis(1000));
                    estimator.observe(&snapshot("Song", clock.now_ms() - 10_000, true));
                }
            })
        };

        while !writer.is_finished() {
            let before = clock.now_ms() - 10_000;
            let estimate = estimator.position_ms();
            let after = clock.now_ms() - 10_000;
            assert!(
                (before..=after).contains(&estimate),
                "{estimate} outside {before}..={after}"
            );
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_local_pause_freezes_estimate() {
        let (clock, estimator) = estimator();
        estimator.observe(&snapshot("Song", 2000, true));
        clock.advance(Duration::from_millis(700));
        estimator.set_playing(false);
        clock.advance(Duration::from_secs(3));
        assert_eq!(estimator.position_ms(), 2700);

        estimator.set_playing(true);
        clock.advance(Duration::from_millis(300));
        assert_eq!(estimator.position_ms(), 3000);
    }
}

//! Shared playback-state store.
//!
//! [`PlaybackState`] holds the latest known snapshot of what is playing. Every
//! field is stored independently: writers touch only the fields they own and
//! readers may observe a combination of fields written by different writers in
//! close succession. No operation blocks on another field and none can fail.

use crate::time::unix_millis_now;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

/// Upper bound of the volume scale.
pub const MAX_VOLUME: u8 = 100;

/// Point-in-time capture of the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub is_playing: bool,
    pub position_ms: u64,
    /// Track length when the source reports one
    pub duration_ms: Option<u64>,
    /// Always within `0..=100`
    pub volume: u8,
    pub cover_url: Option<String>,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PlaybackSnapshot {
    /// Derive the identity of the track in this snapshot.
    #[must_use]
    pub fn identity(&self) -> SongIdentity {
        SongIdentity::new(
            self.title.as_deref(),
            self.artist.as_deref(),
            self.album.as_deref(),
        )
    }
}

/// Key distinguishing one track from another.
///
/// Two identities are equal exactly when title, artist and album are all equal,
/// so a change in any of them invalidates cached lyric state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SongIdentity {
    title: String,
    artist: String,
    album: String,
}

impl SongIdentity {
    #[must_use]
    pub fn new(title: Option<&str>, artist: Option<&str>, album: Option<&str>) -> Self {
        Self {
            title: title.unwrap_or_default().to_owned(),
            artist: artist.unwrap_or_default().to_owned(),
            album: album.unwrap_or_default().to_owned(),
        }
    }

    /// Concatenated key. Fields are joined with U+001F so that moving text
    /// between fields still yields a different key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.title, self.artist, self.album)
    }

    /// True when nothing identifies a track (no title, artist or album).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty() && self.album.is_empty()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn album(&self) -> &str {
        &self.album
    }
}

impl std::fmt::Display for SongIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Track metadata carried by an authoritative poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub cover_url: Option<String>,
}

/// Partial write to [`PlaybackState`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PlaybackUpdate {
    pub track: Option<TrackInfo>,
    pub is_playing: Option<bool>,
    pub position_ms: Option<u64>,
    /// Clamped into `0..=100` on write
    pub volume: Option<i64>,
}

/// A nullable string field behind its own lock.
#[derive(Debug, Default)]
struct TextField(RwLock<Option<String>>);

impl TextField {
    fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

/// Lock-free (per field) store of the latest playback snapshot.
#[derive(Debug, Default)]
pub struct PlaybackState {
    title: TextField,
    artist: TextField,
    album: TextField,
    cover_url: TextField,
    is_playing: AtomicBool,
    position_ms: AtomicU64,
    /// 0 when unknown
    duration_ms: AtomicU64,
    volume: AtomicU8,
    muted: AtomicBool,
    volume_before_mute: AtomicU8,
    timestamp: AtomicI64,
}

impl PlaybackState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every field. The result is not guaranteed to come from one write.
    #[must_use]
    pub fn read(&self) -> PlaybackSnapshot {
        let duration_ms = self.duration_ms.load(Ordering::Acquire);
        PlaybackSnapshot {
            title: self.title.get(),
            artist: self.artist.get(),
            album: self.album.get(),
            is_playing: self.is_playing.load(Ordering::Acquire),
            position_ms: self.position_ms.load(Ordering::Acquire),
            duration_ms: (duration_ms > 0).then_some(duration_ms),
            volume: self.volume.load(Ordering::Acquire),
            cover_url: self.cover_url.get(),
            timestamp: self.timestamp.load(Ordering::Acquire),
        }
    }

    /// Identity of the track currently stored.
    #[must_use]
    pub fn identity(&self) -> SongIdentity {
        SongIdentity::new(
            self.title.get().as_deref(),
            self.artist.get().as_deref(),
            self.album.get().as_deref(),
        )
    }

    /// Apply a partial update and stamp the capture time.
    pub fn write(&self, update: PlaybackUpdate) {
        if let Some(track) = update.track {
            self.title.set(track.title);
            self.artist.set(track.artist);
            self.album.set(track.album);
            self.cover_url.set(track.cover_url);
            self.duration_ms
                .store(track.duration_ms.unwrap_or(0), Ordering::Release);
        }
        if let Some(position_ms) = update.position_ms {
            self.position_ms.store(position_ms, Ordering::Release);
        }
        if let Some(is_playing) = update.is_playing {
            self.is_playing.store(is_playing, Ordering::Release);
        }
        if let Some(volume) = update.volume {
            self.volume.store(clamp_volume(volume), Ordering::Release);
        }
        self.timestamp.store(unix_millis_now(), Ordering::Release);
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, is_playing: bool) {
        self.is_playing.store(is_playing, Ordering::Release);
    }

    /// Flip the play state and return the new value.
    pub fn toggle_playing(&self) -> bool {
        !self.is_playing.fetch_xor(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Acquire)
    }

    /// Add `delta` to the volume, clamped to `0..=100`. Returns the new volume.
    pub fn adjust_volume(&self, delta: i16) -> u8 {
        let previous = self
            .volume
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(clamp_volume(i64::from(current) + i64::from(delta)))
            })
            .unwrap_or_else(|current| current);
        self.muted.store(false, Ordering::Release);
        clamp_volume(i64::from(previous) + i64::from(delta))
    }

    /// Mute, or restore the volume saved by the previous mute.
    ///
    /// When no usable volume was saved, `fallback` is restored instead.
    /// Returns the new volume.
    pub fn toggle_mute(&self, fallback: u8) -> u8 {
        if self.muted.swap(false, Ordering::AcqRel) {
            let saved = self.volume_before_mute.load(Ordering::Acquire);
            let restored = if saved == 0 { fallback.min(MAX_VOLUME) } else { saved };
            self.volume.store(restored, Ordering::Release);
            restored
        } else {
            let current = self.volume.swap(0, Ordering::AcqRel);
            self.volume_before_mute.store(current, Ordering::Release);
            self.muted.store(true, Ordering::Release);
            0
        }
    }
}

fn clamp_volume(volume: i64) -> u8 {
    u8::try_from(volume.clamp(0, i64::from(MAX_VOLUME))).unwrap_or(MAX_VOLUME)
}

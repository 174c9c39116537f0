use crate::error::CoreError;
use crate::playback::SongIdentity;
use async_trait::async_trait;

/// Query parameters for fetching lyrics
#[derive(Debug, Clone)]
pub struct LyricsQuery {
    /// Track name
    pub track_name: String,
    /// Artist name
    pub artist_name: String,
    /// Album name (optional)
    pub album_name: Option<String>,
    /// Track duration in seconds (for matching)
    pub duration_secs: Option<u32>,
}

impl LyricsQuery {
    /// Create a new lyrics query
    pub fn new(track_name: impl Into<String>, artist_name: impl Into<String>) -> Self {
        Self {
            track_name: track_name.into(),
            artist_name: artist_name.into(),
            album_name: None,
            duration_secs: None,
        }
    }

    /// Build a query from a song identity
    #[must_use]
    pub fn from_identity(identity: &SongIdentity) -> Self {
        let query = Self::new(identity.title(), identity.artist());
        if identity.album().is_empty() {
            query
        } else {
            query.with_album(identity.album())
        }
    }

    /// Set album name
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album_name = Some(album.into());
        self
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration_secs: u32) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }
}

/// Trait for lyrics providers.
///
/// `Ok(None)` means the provider answered but has nothing for the query
/// (not found, or any other non-success status). `Err` means the request itself
/// failed. Callers treat both as "try the next provider".
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Fetch raw timed-lyric text for a query
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError>;
}

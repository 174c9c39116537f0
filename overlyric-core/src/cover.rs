use crate::error::CoreError;
use async_trait::async_trait;

/// Album art as served by the playback source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    /// MIME type reported by the provider
    pub content_type: String,
}

/// Fetches album art for a cover URL reported in a now-playing snapshot.
///
/// `Ok(None)` when the provider has no image for the URL.
#[async_trait]
pub trait CoverSource: Send + Sync {
    async fn fetch_cover(&self, cover_url: &str) -> Result<Option<CoverImage>, CoreError>;
}

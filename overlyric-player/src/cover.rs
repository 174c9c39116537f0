use async_trait::async_trait;
use overlyric_core::{CoreError, CoverImage, CoverSource, PlayerConfig};
use tracing::{debug, warn};
use url::Url;

const LOG_TARGET: &str = "overlyric::player::cover";

/// Used when the provider does not name a content type
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Downloads album art. Relative cover URLs are resolved against the player's
/// base URL.
pub struct HttpCoverSource {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpCoverSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &PlayerConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let base_url = Url::parse(&config.base_url)
            .inspect_err(|e| warn!(target: LOG_TARGET, "Ignoring player base URL: {}", e))
            .ok();
        Ok(Self { client, base_url })
    }

    fn resolve(&self, cover_url: &str) -> Option<Url> {
        match Url::parse(cover_url) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base_url.as_ref().and_then(|base| base.join(cover_url).ok())
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Invalid cover URL {}: {}", cover_url, e);
                None
            }
        }
    }
}

#[async_trait]
impl CoverSource for HttpCoverSource {
    async fn fetch_cover(&self, cover_url: &str) -> Result<Option<CoverImage>, CoreError> {
        let Some(url) = self.resolve(cover_url) else {
            return Ok(None);
        };
        debug!(target: LOG_TARGET, "Fetching cover from {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            debug!(target: LOG_TARGET, "Cover request returned status: {}", response.status());
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(Some(CoverImage {
            bytes,
            content_type,
        }))
    }
}

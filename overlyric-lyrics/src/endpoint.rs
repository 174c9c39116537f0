use async_trait::async_trait;
use overlyric_core::{CoreError, LyricsProvider, LyricsQuery};
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "overlyric::lyrics::endpoint";

/// Provider for any HTTP endpoint that answers with raw LRC text.
///
/// The URL template may contain `{title}`, `{artist}` and `{album}`; each is
/// replaced with the URL-encoded query value (empty when unknown).
pub struct EndpointProvider {
    name: String,
    url_template: String,
    client: reqwest::Client,
}

impl EndpointProvider {
    /// Create a new endpoint provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("Overlyric/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name: name.into(),
            url_template: url_template.into(),
            client,
        })
    }

    fn url_for(&self, query: &LyricsQuery) -> String {
        self.url_template
            .replace("{title}", &urlencoding::encode(&query.track_name))
            .replace("{artist}", &urlencoding::encode(&query.artist_name))
            .replace(
                "{album}",
                &urlencoding::encode(query.album_name.as_deref().unwrap_or_default()),
            )
    }
}

#[async_trait]
impl LyricsProvider for EndpointProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError> {
        let url = self.url_for(query);
        debug!(target: LOG_TARGET, "{} GET: {}", self.name, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            if status != reqwest::StatusCode::NOT_FOUND {
                warn!(target: LOG_TARGET, "{} returned status: {}", self.name, status);
            }
            return Ok(None);
        }

        let body = response.text().await?;
        Ok((!body.trim().is_empty()).then_some(body))
    }
}

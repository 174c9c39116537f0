use async_trait::async_trait;
use overlyric_core::{CoreError, LyricsProvider, LyricsQuery};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "overlyric::lyrics::lrclib";

pub const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 1;

/// Duration tolerance for matching (±2 seconds)
const DURATION_TOLERANCE_SECS: f64 = 2.0;

/// Calculate a score for duration matching (lower is better).
/// Returns 0 for exact matches, higher values for larger differences.
/// Capped at `i32::MAX` to prevent overflow.
fn duration_score(actual: Option<f64>, expected: Option<u32>, scale: f64) -> i32 {
    match (actual, expected) {
        (Some(d), Some(q)) => {
            let diff = (d - f64::from(q)).abs() * scale;
            #[allow(clippy::cast_possible_truncation)]
            if diff > f64::from(i32::MAX) {
                i32::MAX
            } else {
                diff as i32
            }
        }
        _ => 50, // Default score when duration is unknown
    }
}

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider.
    ///
    /// # Arguments
    /// * `timeout` - Per-request timeout of the underlying HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("Overlyric/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: LRCLIB_API_URL.to_string(),
        })
    }

    /// Point the provider at another LRCLIB-compatible API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Response from LRCLIB API. Unused fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibResponse {
    id: i64,
    artist_name: String,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError> {
        info!(
            target: LOG_TARGET,
            "Fetching lyrics from LRCLIB for: {} - {} (duration: {:?}s)",
            query.artist_name, query.track_name, query.duration_secs
        );

        // Exact match on artist + track (+ album + duration when known)
        let mut url = format!(
            "{}/get?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(&query.artist_name),
            urlencoding::encode(&query.track_name)
        );

        if let Some(ref album) = query.album_name {
            use std::fmt::Write;
            let _ = write!(url, "&album_name={}", urlencoding::encode(album));
        }

        if let Some(duration) = query.duration_secs {
            use std::fmt::Write;
            let _ = write!(url, "&duration={duration}");
        }

        debug!(target: LOG_TARGET, "LRCLIB GET (exact match): {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(target: LOG_TARGET, "LRCLIB exact match not found, searching by track name");
            return self.search_by_track_name(query).await;
        }

        if !status.is_success() {
            warn!(target: LOG_TARGET, "LRCLIB returned status: {}", status);
            return Ok(None);
        }

        let result: LrclibResponse = response.json().await?;
        info!(target: LOG_TARGET, "LRCLIB found match with id: {}", result.id);
        Ok(Self::lyrics_text(result))
    }
}

impl LrclibProvider {
    /// Search by track name only and match duration within ±2 seconds
    async fn search_by_track_name(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError> {
        let url = format!(
            "{}/search?track_name={}",
            self.base_url,
            urlencoding::encode(&query.track_name)
        );

        debug!(target: LOG_TARGET, "LRCLIB GET (search by track): {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB search returned status: {}", response.status());
            return self.search_fallback(query).await;
        }

        let results: Vec<LrclibResponse> = response.json().await?;

        let filtered: Vec<_> = if let Some(query_duration) = query.duration_secs {
            let query_duration = f64::from(query_duration);
            results
                .into_iter()
                .filter(|r| {
                    r.duration
                        .is_some_and(|d| (d - query_duration).abs() <= DURATION_TOLERANCE_SECS)
                })
                .collect()
        } else {
            results
        };

        match Self::pick_best(filtered, query.duration_secs, 10.0) {
            Some(result) => {
                info!(
                    target: LOG_TARGET,
                    "LRCLIB found match by track name (id: {}, artist: {}, duration: {:?})",
                    result.id, result.artist_name, result.duration
                );
                Ok(Self::lyrics_text(result))
            }
            None => {
                debug!(target: LOG_TARGET, "LRCLIB search by track name: no usable lyrics, trying full search");
                self.search_fallback(query).await
            }
        }
    }

    async fn search_fallback(&self, query: &LyricsQuery) -> Result<Option<String>, CoreError> {
        let search_query = format!("{} {}", query.artist_name, query.track_name);
        let url = format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(&search_query)
        );

        debug!(target: LOG_TARGET, "LRCLIB GET (full search): {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB full search returned status: {}", response.status());
            return Ok(None);
        }

        let results: Vec<LrclibResponse> = response.json().await?;

        Ok(Self::pick_best(results, query.duration_secs, 1.0).and_then(|result| {
            info!(
                target: LOG_TARGET,
                "LRCLIB found match via full search (id: {}, artist: {})",
                result.id, result.artist_name
            );
            Self::lyrics_text(result)
        }))
    }

    /// Prefer synced lyrics, then the closest duration
    fn pick_best(
        results: Vec<LrclibResponse>,
        duration_secs: Option<u32>,
        scale: f64,
    ) -> Option<LrclibResponse> {
        results
            .into_iter()
            .filter(|r| r.synced_lyrics.is_some() || r.plain_lyrics.is_some())
            .min_by_key(|r| {
                let sync_score: i32 = if r.synced_lyrics.is_some() { 0 } else { 100 };
                sync_score.saturating_add(duration_score(r.duration, duration_secs, scale))
            })
    }

    /// Synced text when present, plain text otherwise
    fn lyrics_text(result: LrclibResponse) -> Option<String> {
        if result.instrumental {
            debug!(target: LOG_TARGET, "Track is instrumental (lrclib id: {})", result.id);
            return None;
        }

        result
            .synced_lyrics
            .filter(|synced| !synced.trim().is_empty())
            .or_else(|| result.plain_lyrics.filter(|plain| !plain.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn response(id: i64, duration: Option<f64>, synced: Option<&str>, plain: Option<&str>) -> LrclibResponse {
        LrclibResponse {
            id,
            artist_name: "Artist".to_string(),
            duration,
            instrumental: false,
            plain_lyrics: plain.map(str::to_string),
            synced_lyrics: synced.map(str::to_string),
        }
    }

    #[test]
    fn test_duration_score() {
        assert_eq!(duration_score(Some(200.0), Some(200), 10.0), 0);
        assert_eq!(duration_score(Some(201.5), Some(200), 10.0), 15);
        assert_eq!(duration_score(None, Some(200), 10.0), 50);
        assert_eq!(duration_score(Some(1e12), Some(0), 10.0), i32::MAX);
    }

    #[test]
    fn test_pick_best_prefers_synced_then_duration() {
        let results = vec![
            response(1, Some(200.0), None, Some("plain")),
            response(2, Some(210.0), Some("[00:01.00]far"), None),
            response(3, Some(201.0), Some("[00:01.00]near"), None),
        ];
        let best = LrclibProvider::pick_best(results, Some(200), 10.0).unwrap();
        assert_eq!(best.id, 3);
    }

    #[test]
    fn test_lyrics_text_falls_back_to_plain() {
        let text = LrclibProvider::lyrics_text(response(1, None, Some("  "), Some("plain words")));
        assert_eq!(text.as_deref(), Some("plain words"));
    }

    #[test]
    fn test_instrumental_has_no_lyrics() {
        let mut result = response(1, None, Some("[00:01.00]x"), None);
        result.instrumental = true;
        assert!(LrclibProvider::lyrics_text(result).is_none());
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn test_exact_match() {
        let router = Router::new().route(
            "/api/get",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("track_name").map(String::as_str), Some("Song Name"));
                Json(record(1, "[00:01.00]exact"))
            }),
        );
        let provider = LrclibProvider::new(Duration::from_secs(2))
            .unwrap()
            .with_base_url(serve(router).await);

        let text = provider.fetch(&LyricsQuery::new("Song Name", "Artist")).await.unwrap();
        assert_eq!(text.as_deref(), Some("[00:01.00]exact"));
    }

    #[tokio::test]
    async fn test_not_found_falls_back_to_search() {
        let router = Router::new()
            .route("/api/get", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/api/search",
                get(|| async { Json(vec![record(7, "[00:02.00]searched")]) }),
            );
        let provider = LrclibProvider::new(Duration::from_secs(2))
            .unwrap()
            .with_base_url(serve(router).await);

        let text = provider
            .fetch(&LyricsQuery::new("Song", "Artist").with_duration(200))
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("[00:02.00]searched"));
    }

    #[tokio::test]
    async fn test_server_error_is_a_miss() {
        let router = Router::new().route("/api/get", get(|| async { StatusCode::BAD_REQUEST }));
        let provider = LrclibProvider::new(Duration::from_secs(2))
            .unwrap()
            .with_base_url(serve(router).await);

        assert!(provider.fetch(&LyricsQuery::new("Song", "Artist")).await.unwrap().is_none());
    }

    /// A record shaped like the LRCLIB API returns
    fn record(id: i64, synced: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "trackName": "Song",
            "artistName": "Artist",
            "albumName": "Album",
            "duration": 200.0,
            "instrumental": false,
            "plainLyrics": "plain",
            "syncedLyrics": synced,
        })
    }
}

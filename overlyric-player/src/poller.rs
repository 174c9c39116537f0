//! Now-playing polling.

use crate::error::{PlayerError, Result};
use overlyric_core::{DurationExt, PlayerConfig, PlaybackUpdate, SyncEngine, TrackInfo};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const LOG_TARGET: &str = "overlyric::player::poller";

/// JSON served by the playback source's now-playing endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NowPlayingPayload {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub is_playing: bool,
    /// Milliseconds
    pub position: Option<u64>,
    /// Milliseconds
    pub duration: Option<u64>,
    pub volume: Option<i64>,
    pub cover_url: Option<String>,
}

impl NowPlayingPayload {
    /// Convert to a store update. `latency` is added to a playing position.
    #[must_use]
    pub fn into_update(self, latency: Duration) -> PlaybackUpdate {
        let position_ms = self.position.unwrap_or(0);
        let position_ms = if self.is_playing {
            position_ms.saturating_add(latency.as_millis_u64())
        } else {
            position_ms
        };

        PlaybackUpdate {
            track: Some(TrackInfo {
                title: self.title,
                artist: self.artist,
                album: self.album,
                duration_ms: self.duration,
                cover_url: self.cover_url,
            }),
            is_playing: Some(self.is_playing),
            position_ms: Some(position_ms),
            volume: self.volume,
        }
    }
}

/// Polls the playback source and feeds each answer to the [`SyncEngine`].
pub struct NowPlayingPoller {
    client: reqwest::Client,
    url: Url,
    sync_engine: Arc<SyncEngine>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
}

impl NowPlayingPoller {
    /// Create a new poller
    ///
    /// # Arguments
    /// * `config` - Player endpoint and timing settings
    /// * `sync_engine` - Sync engine to update with playback state
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the now-playing URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(
        config: &PlayerConfig,
        sync_engine: Arc<SyncEngine>,
        cancel_token: Option<CancellationToken>,
    ) -> Result<Self> {
        let url = Url::parse(&config.base_url)?.join(&config.now_playing_path)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            url,
            sync_engine,
            poll_interval: config.poll_interval(),
            cancel_token: cancel_token.unwrap_or_default(),
        })
    }

    /// Start polling in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Fetch and decode one now-playing answer.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn fetch(&self) -> Result<PlaybackUpdate> {
        let request_start = Instant::now();
        let response = self.client.get(self.url.clone()).send().await?;
        let request_latency = request_start.elapsed();

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            // Nothing playing
            return Ok(NowPlayingPayload::default().into_update(Duration::ZERO));
        }
        if !status.is_success() {
            return Err(PlayerError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let payload: NowPlayingPayload = serde_json::from_str(&body)?;

        // Assume the position was sampled halfway through the request
        Ok(payload.into_update(request_latency / 2))
    }

    async fn poll_once(&self) -> Result<()> {
        let update = self.fetch().await?;
        debug!(
            target: LOG_TARGET,
            "Polled player: playing={:?}, position={:?}",
            update.is_playing,
            update.position_ms
        );
        self.sync_engine.apply(update);
        Ok(())
    }

    /// Poll until cancelled, backing off while the source is unreachable.
    pub async fn run(&self) {
        info!(target: LOG_TARGET, "Starting now-playing poller for {}", self.url);

        let mut consecutive_errors: u32 = 0;
        let max_backoff = Duration::from_secs(30);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: LOG_TARGET, "Poller shutting down gracefully");
                    break;
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    match self.poll_once().await {
                        Ok(()) => {
                            if consecutive_errors > 0 {
                                info!(target: LOG_TARGET, "Player reachable again");
                            }
                            consecutive_errors = 0;
                        }
                        Err(e) => {
                            consecutive_errors = consecutive_errors.saturating_add(1);
                            warn!(target: LOG_TARGET, "Poll error (attempt {}): {}", consecutive_errors, e);

                            // Exponential backoff: 100ms * 2^errors, capped at max_backoff
                            let backoff_ms = 100_u64
                                .saturating_mul(2_u64.saturating_pow(consecutive_errors.min(10)));
                            let backoff = Duration::from_millis(backoff_ms.min(max_backoff.as_millis_u64()));

                            if consecutive_errors >= 5 {
                                error!(target: LOG_TARGET, "Too many consecutive errors, waiting {} seconds", backoff.as_secs());
                            }

                            tokio::select! {
                                () = self.cancel_token.cancelled() => break,
                                () = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}

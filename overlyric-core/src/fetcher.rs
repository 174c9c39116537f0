//! Lyrics fetching: provider fallback with caching, and the background loader
//! that keeps lyrics in step with the current song.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cache::LyricsCache;
use crate::clock::Clock;
use crate::lrc::LyricTimeline;
use crate::playback::SongIdentity;
use crate::provider::{LyricsProvider, LyricsQuery};
use crate::sync::SyncEvent;
use crate::time::DurationExt;

const LOG_TARGET: &str = "overlyric::fetcher";

/// Resolves raw lyric text for a song from an ordered list of providers.
pub struct LyricSource {
    cache: Arc<LyricsCache>,
    providers: Vec<Box<dyn LyricsProvider>>,
    timeout: Duration,
}

impl LyricSource {
    /// Create a new lyric source
    ///
    /// # Arguments
    /// * `cache` - Session cache consulted before any provider
    /// * `providers` - Providers to try in order
    /// * `timeout` - Upper bound for each provider request
    pub fn new(
        cache: Arc<LyricsCache>,
        providers: Vec<Box<dyn LyricsProvider>>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            providers,
            timeout,
        }
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Lyrics already fetched for a song, without touching the network.
    #[must_use]
    pub fn cached(&self, identity: &SongIdentity) -> Option<String> {
        self.cache.get(identity)
    }

    /// Fetch raw lyric text for a song.
    ///
    /// A cached entry is returned without network access. Otherwise providers are
    /// tried in order; a miss, an error or a timeout moves on to the next one, and
    /// the first non-blank payload is cached and returned. `None` when every
    /// provider came up empty; nothing is cached in that case.
    ///
    /// A known `duration_ms` is passed on to providers so they can prefer the
    /// candidate whose length matches the track.
    pub async fn fetch(
        &self,
        identity: &SongIdentity,
        duration_ms: Option<u64>,
    ) -> Option<String> {
        if let Some(cached) = self.cache.get(identity) {
            info!(target: LOG_TARGET, "Using cached lyrics for {}", identity);
            return Some(cached);
        }

        let query = query_for(identity, duration_ms);

        for provider in &self.providers {
            debug!(target: LOG_TARGET, "Trying provider: {}", provider.name());
            match tokio::time::timeout(self.timeout, provider.fetch(&query)).await {
                Ok(Ok(Some(text))) if !text.trim().is_empty() => {
                    info!(
                        target: LOG_TARGET,
                        "Found lyrics for {} from {}",
                        identity,
                        provider.name()
                    );
                    self.cache.store(identity.clone(), text.clone());
                    return Some(text);
                }
                Ok(Ok(_)) => {
                    info!(target: LOG_TARGET, "Provider {} returned no lyrics", provider.name());
                }
                Ok(Err(e)) => {
                    warn!(target: LOG_TARGET, "Provider {} failed with error: {}", provider.name(), e);
                }
                Err(_) => {
                    warn!(
                        target: LOG_TARGET,
                        "Provider {} timed out after {}ms",
                        provider.name(),
                        self.timeout.as_millis_u64()
                    );
                }
            }
        }

        info!(
            target: LOG_TARGET,
            "No lyrics found for {} (tried {} providers: {:?})",
            identity,
            self.providers.len(),
            self.provider_names()
        );
        None
    }
}

fn query_for(identity: &SongIdentity, duration_ms: Option<u64>) -> LyricsQuery {
    let query = LyricsQuery::from_identity(identity);
    match duration_ms
        .map(|ms| ms / 1000)
        .and_then(|secs| u32::try_from(secs).ok())
    {
        Some(secs) if secs > 0 => query.with_duration(secs),
        _ => query,
    }
}

/// Lyrics loaded for one song.
#[derive(Debug, Clone)]
pub struct LoadedLyrics {
    pub identity: SongIdentity,
    /// Text as returned by the provider
    pub raw: String,
    /// Parsed timeline; empty when the text carried no usable timing
    pub timeline: LyricTimeline,
}

/// Keeps the published lyrics in step with the current song.
///
/// Called once per poll cycle. A new song clears the published lyrics at once
/// and starts a background fetch; a miss is retried on a later cycle.
pub struct LyricsLoader {
    source: Arc<LyricSource>,
    clock: Arc<dyn Clock>,
    retry_interval_ms: u64,
    wanted: RwLock<Option<SongIdentity>>,
    in_flight: AtomicBool,
    /// Clock reading of the last miss for the wanted song, `u64::MAX` if none
    last_miss_ms: AtomicU64,
    lyrics_tx: watch::Sender<Option<Arc<LoadedLyrics>>>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl LyricsLoader {
    #[must_use]
    pub fn new(
        source: Arc<LyricSource>,
        clock: Arc<dyn Clock>,
        retry_interval: Duration,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> Arc<Self> {
        let (lyrics_tx, _) = watch::channel(None);
        Arc::new(Self {
            source,
            clock,
            retry_interval_ms: retry_interval.as_millis_u64(),
            wanted: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            last_miss_ms: AtomicU64::new(u64::MAX),
            lyrics_tx,
            event_tx,
        })
    }

    /// Subscribe to lyrics changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<LoadedLyrics>>> {
        self.lyrics_tx.subscribe()
    }

    /// Currently published lyrics
    #[must_use]
    pub fn current(&self) -> Option<Arc<LoadedLyrics>> {
        self.lyrics_tx.borrow().clone()
    }

    #[must_use]
    pub fn source(&self) -> &Arc<LyricSource> {
        &self.source
    }

    /// Make sure lyrics for `identity` are loaded or being loaded.
    ///
    /// `duration_ms` is the track length reported with the song, if any.
    pub fn request(self: &Arc<Self>, identity: &SongIdentity, duration_ms: Option<u64>) {
        let changed = {
            let mut wanted = self.wanted.write().unwrap_or_else(PoisonError::into_inner);
            if wanted.as_ref() == Some(identity) {
                false
            } else {
                *wanted = Some(identity.clone());
                true
            }
        };

        if changed {
            self.last_miss_ms.store(u64::MAX, Ordering::Release);
            self.lyrics_tx.send_replace(None);
        }

        if identity.is_empty() {
            return;
        }

        if self
            .lyrics_tx
            .borrow()
            .as_ref()
            .is_some_and(|loaded| &loaded.identity == identity)
        {
            return;
        }

        let last_miss = self.last_miss_ms.load(Ordering::Acquire);
        if last_miss != u64::MAX
            && self.clock.now_ms().saturating_sub(last_miss) < self.retry_interval_ms
        {
            return;
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return;
        }

        let loader = Arc::clone(self);
        let identity = identity.clone();
        tokio::spawn(async move {
            let fetched = loader.source.fetch(&identity, duration_ms).await;
            loader.finish(identity, fetched);
        });
    }

    fn finish(&self, identity: SongIdentity, fetched: Option<String>) {
        self.in_flight.store(false, Ordering::Release);

        let still_wanted = self
            .wanted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            == Some(&identity);
        if !still_wanted {
            debug!(target: LOG_TARGET, "Discarding lyrics for {}, song changed", identity);
            return;
        }

        match fetched {
            Some(raw) => {
                let timeline = LyricTimeline::parse(&raw);
                if timeline.metadata.contradicts(&identity) {
                    warn!(
                        target: LOG_TARGET,
                        "Lyrics for {} are tagged as {} - {}",
                        identity,
                        timeline.metadata.artist.as_deref().unwrap_or("?"),
                        timeline.metadata.title.as_deref().unwrap_or("?")
                    );
                }
                let lines = timeline.len();
                self.lyrics_tx.send_replace(Some(Arc::new(LoadedLyrics {
                    identity,
                    raw,
                    timeline,
                })));
                let _ = self.event_tx.send(SyncEvent::LyricsLoaded { lines });
            }
            None => {
                self.last_miss_ms
                    .store(self.clock.now_ms(), Ordering::Release);
                let _ = self.event_tx.send(SyncEvent::LyricsNotFound);
            }
        }
    }
}

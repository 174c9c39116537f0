mod console;

use overlyric_core::{
    Clock, CommandDispatcher, CoreError, CoverSource, LyricSource, LyricsCache, OverlyricConfig,
    PlaybackState, PositionEstimator, SyncEngine, SyncEvent, SyncRenderer, SystemClock,
};
use overlyric_lyrics::build_providers;
use overlyric_native::{platform_source, NativeMediaBridge};
use overlyric_player::{HttpCoverSource, HttpTransport, NowPlayingPoller};
use overlyric_server::{ControlApi, ControlServer};
use std::fs::File;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    // Check config for logging.enabled before full config load
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let config = match OverlyricConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigParseError(parse_error)) => {
            error!(
                "Config file {} has a syntax error: {}",
                OverlyricConfig::config_path().display(),
                parse_error
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run(config, cancel_token)) {
        error!("{e}");
        std::process::exit(1);
    }
}

/// Wire every component, wait for cancellation, then stop them in order:
/// control server, media-key bridge, renderer and poller.
#[allow(clippy::too_many_lines)]
async fn run(config: OverlyricConfig, cancel_token: CancellationToken) -> Result<(), String> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let state = Arc::new(PlaybackState::new());
    let estimator = Arc::new(PositionEstimator::new(
        Arc::clone(&clock),
        config.sync.seek_threshold(),
    ));

    let providers = build_providers(&config.lyrics);
    let source = Arc::new(LyricSource::new(
        Arc::new(LyricsCache::new()),
        providers,
        config.lyrics.timeout(),
    ));
    info!(
        "Initialized {} lyrics provider(s): {:?}",
        source.provider_names().len(),
        source.provider_names()
    );

    let sync_engine = SyncEngine::new(
        Arc::clone(&state),
        Arc::clone(&estimator),
        source,
        Arc::clone(&clock),
        config.lyrics.retry_interval(),
    );
    tokio::spawn(log_sync_events(Arc::clone(&sync_engine)));

    // Poller
    let poller_token = CancellationToken::new();
    let poller = NowPlayingPoller::new(
        &config.player,
        Arc::clone(&sync_engine),
        Some(poller_token.clone()),
    )
    .map_err(|e| format!("Failed to create now-playing poller: {e}"))?;
    info!(
        "Starting now-playing poller (interval: {}ms)",
        config.player.poll_interval_ms
    );
    let poller_handle = Arc::new(poller).start();

    // Commands from media keys and the control server share one dispatcher
    let transport = HttpTransport::new(&config.player, Handle::current())
        .map_err(|e| format!("Failed to create player transport: {e}"))?;
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::new(transport),
        Arc::clone(&state),
        Arc::clone(&estimator),
        config.native.volume_step,
    ));

    let mut bridge = if config.native.enabled {
        let mut bridge = NativeMediaBridge::new(
            platform_source(),
            Arc::clone(&dispatcher),
            config.native.shutdown_timeout(),
        );
        match tokio::task::block_in_place(|| bridge.init()) {
            Ok(()) => Some(bridge),
            Err(e) => {
                warn!("Media keys disabled: {e}");
                None
            }
        }
    } else {
        info!("Media keys disabled in config");
        None
    };

    let server_token = CancellationToken::new();
    let server_handle = if config.server.enabled {
        start_server(&config, dispatcher, Arc::clone(&sync_engine), server_token.clone()).await
    } else {
        info!("Control server disabled in config");
        None
    };

    // Renderer and its console output
    let renderer_token = CancellationToken::new();
    let renderer = SyncRenderer::new(
        config.renderer.clone(),
        clock,
        state,
        estimator,
        sync_engine.subscribe_lyrics(),
    );
    let console_handle = tokio::spawn(console::run(renderer.subscribe(), renderer_token.clone()));
    let renderer_handle = tokio::spawn(renderer.run(renderer_token.clone()));

    cancel_token.cancelled().await;

    server_token.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    if let Some(bridge) = bridge.as_mut() {
        if let Err(e) = tokio::task::block_in_place(|| bridge.shutdown()) {
            warn!("Media-key bridge: {e}");
        }
    }

    renderer_token.cancel();
    poller_token.cancel();
    let _ = renderer_handle.await;
    let _ = console_handle.await;
    let _ = poller_handle.await;

    info!("Shutdown complete");
    Ok(())
}

async fn start_server(
    config: &OverlyricConfig,
    dispatcher: Arc<CommandDispatcher>,
    sync_engine: Arc<SyncEngine>,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    let cover = match HttpCoverSource::new(&config.player) {
        Ok(cover) => Some(Arc::new(cover) as Arc<dyn CoverSource>),
        Err(e) => {
            warn!("Cover images unavailable: {e}");
            None
        }
    };
    let api = Arc::new(ControlApi::new(
        dispatcher,
        sync_engine,
        cover,
        config.server.settle_delay(),
    ));

    match ControlServer::bind(&config.server, api).await {
        Ok(server) => Some(tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                error!("{e}");
            }
        })),
        Err(e) => {
            error!("Control server not started: {e}");
            None
        }
    }
}

/// Log all sync events to the console
async fn log_sync_events(sync_engine: Arc<SyncEngine>) {
    let mut rx = sync_engine.subscribe();

    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                SyncEvent::TrackChanged {
                    identity,
                    position_ms,
                } => {
                    info!("Track changed: {} (at {}ms)", identity, position_ms);
                }
                SyncEvent::PlaybackPaused { position_ms } => {
                    info!("Playback paused at {}ms", position_ms);
                }
                SyncEvent::PlaybackResumed { position_ms } => {
                    info!("Playback resumed at {}ms", position_ms);
                }
                SyncEvent::SeekOccurred { position_ms } => {
                    info!("Seek to {}ms", position_ms);
                }
                SyncEvent::LyricsLoaded { lines } => {
                    info!("Lyrics loaded: {} lines", lines);
                }
                SyncEvent::LyricsNotFound => {
                    info!("No lyrics found for current track");
                }
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                info!("Sync event channel closed");
                break;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} sync events", n);
            }
        }
    }
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled() -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(OverlyricConfig::config_path()) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest_retry=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = overlyric_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

pub mod cache;
pub mod clock;
pub mod config;
pub mod cover;
pub mod error;
pub mod fetcher;
pub mod lrc;
pub mod paths;
pub mod playback;
pub mod position;
pub mod provider;
pub mod renderer;
pub mod sync;
pub mod time;
pub mod transport;

pub use cache::LyricsCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    LoggingConfig, LyricsConfig, LyricsProviderConfig, NativeConfig, OverlyricConfig,
    PlayerConfig, RendererConfig, ServerConfig, SyncConfig, CONFIG_TEMPLATE,
};
pub use cover::{CoverImage, CoverSource};
pub use error::{CoreError, Result};
pub use fetcher::{LoadedLyrics, LyricSource, LyricsLoader};
pub use lrc::{LyricLine, LyricMetadata, LyricTimeline};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use playback::{PlaybackSnapshot, PlaybackState, PlaybackUpdate, SongIdentity, TrackInfo};
pub use position::{AnchorChange, PositionEstimator};
pub use provider::{LyricsProvider, LyricsQuery};
pub use renderer::{
    AnimationState, CharWidthMeasure, DisplayMode, ScrollState, SyncRenderer, TextMeasure,
};
pub use sync::{SyncEngine, SyncEvent};
pub use time::{format_position, DurationExt};
pub use transport::{CommandDispatcher, CommandOutcome, MediaCommand, TransportControl};

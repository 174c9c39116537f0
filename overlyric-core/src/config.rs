use crate::error::{CoreError, Result};
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const LOG_TARGET: &str = "overlyric::config";

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 35373;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 50;
pub const DEFAULT_PLAYER_BASE_URL: &str = "http://127.0.0.1:35374";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LYRICS_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;
pub const DEFAULT_SCROLL_DELAY_MS: u64 = 1000;
pub const DEFAULT_VOLUME_STEP: u8 = 5;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_SEEK_THRESHOLD_MS: u64 = 2000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlyricConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub native: NativeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local HTTP control server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Wait between dispatching a command and reading state back
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

const fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

const fn default_settle_delay() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// External playback source reachable over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_base_url")]
    pub base_url: String,
    #[serde(default = "default_now_playing_path")]
    pub now_playing_path: String,
    #[serde(default = "default_command_path")]
    pub command_path: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_player_base_url() -> String {
    DEFAULT_PLAYER_BASE_URL.to_string()
}

fn default_now_playing_path() -> String {
    "/now-playing".to_string()
}

fn default_command_path() -> String {
    "/command".to_string()
}

const fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_url: default_player_base_url(),
            now_playing_path: default_now_playing_path(),
            command_path: default_command_path(),
            poll_interval_ms: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl PlayerConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// One entry of the lyric provider chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LyricsProviderConfig {
    /// lrclib.net
    Lrclib,
    /// Any HTTP endpoint returning LRC text; `url` accepts `{title}`, `{artist}`
    /// and `{album}` placeholders
    Endpoint { name: String, url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider priority: providers are tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<LyricsProviderConfig>,
    #[serde(default = "default_lyrics_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
}

fn default_providers() -> Vec<LyricsProviderConfig> {
    vec![LyricsProviderConfig::Lrclib]
}

const fn default_lyrics_timeout() -> u64 {
    DEFAULT_LYRICS_TIMEOUT_MS
}

const fn default_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            timeout_ms: default_lyrics_timeout(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

impl LyricsConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Line animation and scrolling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// When false, line changes apply instantly without cross-fade or offset
    #[serde(default = "default_true")]
    pub animate: bool,
    /// Cross-fade progress added per tick
    #[serde(default = "default_progress_step")]
    pub progress_step: f32,
    /// Fraction of the remaining vertical offset removed per tick
    #[serde(default = "default_offset_smoothing")]
    pub offset_smoothing: f32,
    /// Vertical offset a new line starts from
    #[serde(default = "default_line_offset")]
    pub line_offset_px: f32,
    #[serde(default = "default_viewport_width")]
    pub viewport_width_px: f32,
    #[serde(default = "default_true")]
    pub scroll_enabled: bool,
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed_px: f32,
    #[serde(default = "default_scroll_gap")]
    pub scroll_gap_px: f32,
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay_ms: u64,
    /// Width of a narrow character, used to measure lines
    #[serde(default = "default_char_width")]
    pub char_width_px: f32,
}

const fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

const fn default_progress_step() -> f32 {
    0.08
}

const fn default_offset_smoothing() -> f32 {
    0.2
}

const fn default_line_offset() -> f32 {
    24.0
}

const fn default_viewport_width() -> f32 {
    800.0
}

const fn default_scroll_speed() -> f32 {
    1.5
}

const fn default_scroll_gap() -> f32 {
    80.0
}

const fn default_scroll_delay() -> u64 {
    DEFAULT_SCROLL_DELAY_MS
}

const fn default_char_width() -> f32 {
    12.0
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            animate: true,
            progress_step: default_progress_step(),
            offset_smoothing: default_offset_smoothing(),
            line_offset_px: default_line_offset(),
            viewport_width_px: default_viewport_width(),
            scroll_enabled: true,
            scroll_speed_px: default_scroll_speed(),
            scroll_gap_px: default_scroll_gap(),
            scroll_delay_ms: default_scroll_delay(),
            char_width_px: default_char_width(),
        }
    }
}

impl RendererConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// OS media-key interception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Volume change per volume key press
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

const fn default_volume_step() -> u8 {
    DEFAULT_VOLUME_STEP
}

const fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume_step: default_volume_step(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl NativeConfig {
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Position jump that counts as a seek rather than drift
    #[serde(default = "default_seek_threshold")]
    pub seek_threshold_ms: u64,
}

const fn default_seek_threshold() -> u64 {
    DEFAULT_SEEK_THRESHOLD_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            seek_threshold_ms: default_seek_threshold(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn seek_threshold(&self) -> Duration {
        Duration::from_millis(self.seek_threshold_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `overlyric.log` in the config directory
    #[serde(default)]
    pub enabled: bool,
}

impl OverlyricConfig {
    /// Get the config file path (~/.config/overlyric/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, writing the template on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, written or parsed, or
    /// holds out-of-range values.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `path`. A missing file is created from the template and
    /// the defaults are used for this run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, written or parsed, or
    /// holds out-of-range values.
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, CONFIG_TEMPLATE)?;
            info!(target: LOG_TARGET, "Wrote config template to {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure or holds
    /// out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: &str) -> CoreError {
            CoreError::ConfigInvalid {
                message: message.to_string(),
            }
        }
        fn positive(value: f32) -> bool {
            value.is_finite() && value > 0.0
        }

        if self.player.poll_interval_ms == 0 {
            return Err(invalid("player.poll_interval_ms must be greater than 0"));
        }
        if self.renderer.tick_interval_ms == 0 {
            return Err(invalid("renderer.tick_interval_ms must be greater than 0"));
        }
        if !(self.renderer.progress_step > 0.0 && self.renderer.progress_step <= 1.0) {
            return Err(invalid("renderer.progress_step must be in (0, 1]"));
        }
        if !(self.renderer.offset_smoothing > 0.0 && self.renderer.offset_smoothing <= 1.0) {
            return Err(invalid("renderer.offset_smoothing must be in (0, 1]"));
        }
        if !positive(self.renderer.viewport_width_px) {
            return Err(invalid("renderer.viewport_width_px must be greater than 0"));
        }
        if !positive(self.renderer.scroll_speed_px) {
            return Err(invalid("renderer.scroll_speed_px must be greater than 0"));
        }
        if !(self.renderer.scroll_gap_px.is_finite() && self.renderer.scroll_gap_px >= 0.0) {
            return Err(invalid("renderer.scroll_gap_px must not be negative"));
        }
        if !positive(self.renderer.char_width_px) {
            return Err(invalid("renderer.char_width_px must be greater than 0"));
        }
        if self.native.volume_step == 0 || self.native.volume_step > crate::playback::MAX_VOLUME {
            return Err(invalid("native.volume_step must be in 1..=100"));
        }
        if self.lyrics.providers.is_empty() {
            return Err(invalid("lyrics.providers must list at least one provider"));
        }
        Ok(())
    }
}

/// Commented config written on first run
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"# Overlyric Configuration
# ~/.config/overlyric/config.toml

[server]
# Local control API under http://<host>:<port>/api
enabled = true
host = ""#,
    DEFAULT_SERVER_HOST,
    "\"\nport = ",
    DEFAULT_SERVER_PORT,
    "\n# Wait after a command before reading state back\nsettle_delay_ms = ",
    DEFAULT_SETTLE_DELAY_MS,
    r#"

[player]
base_url = ""#,
    DEFAULT_PLAYER_BASE_URL,
    r#""
now_playing_path = "/now-playing"
command_path = "/command"
poll_interval_ms = "#,
    DEFAULT_POLL_INTERVAL_MS,
    "\nrequest_timeout_ms = ",
    DEFAULT_REQUEST_TIMEOUT_MS,
    r#"

[lyrics]
# Providers are tried in order; first non-empty result wins
# Custom endpoint: { type = "endpoint", name = "mirror", url = "https://example.com/lrc?t={title}&a={artist}&al={album}" }
providers = [{ type = "lrclib" }]
timeout_ms = "#,
    DEFAULT_LYRICS_TIMEOUT_MS,
    "\n# Minimum wait before asking again after no provider had lyrics\nretry_interval_ms = ",
    DEFAULT_RETRY_INTERVAL_MS,
    r#"

[renderer]
tick_interval_ms = "#,
    DEFAULT_TICK_INTERVAL_MS,
    r#"
animate = true
progress_step = 0.08
offset_smoothing = 0.2
line_offset_px = 24.0
viewport_width_px = 800.0
scroll_enabled = true
scroll_speed_px = 1.5
scroll_gap_px = 80.0
scroll_delay_ms = "#,
    DEFAULT_SCROLL_DELAY_MS,
    r#"
char_width_px = 12.0

[native]
# Intercept OS media keys (Windows only)
enabled = true
volume_step = "#,
    DEFAULT_VOLUME_STEP,
    "\nshutdown_timeout_ms = ",
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
    r#"

[sync]
seek_threshold_ms = "#,
    DEFAULT_SEEK_THRESHOLD_MS,
    r#"

[logging]
# Also write logs to ~/.config/overlyric/overlyric.log
enabled = false
"#
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let config = OverlyricConfig::from_toml_str(CONFIG_TEMPLATE).unwrap();
        let defaults = OverlyricConfig::default();

        assert_eq!(config.server.host, defaults.server.host);
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.player.base_url, defaults.player.base_url);
        assert_eq!(config.lyrics.providers, vec![LyricsProviderConfig::Lrclib]);
        assert_eq!(config.renderer, defaults.renderer);
        assert_eq!(config.native.volume_step, DEFAULT_VOLUME_STEP);
        assert_eq!(config.sync.seek_threshold_ms, DEFAULT_SEEK_THRESHOLD_MS);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = OverlyricConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.player.poll_interval(), Duration::from_millis(100));
        assert!(config.renderer.animate);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = OverlyricConfig::from_toml_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, DEFAULT_SERVER_HOST);
    }

    #[test]
    fn test_endpoint_provider() {
        let toml = r#"
[lyrics]
providers = [
    { type = "endpoint", name = "mirror", url = "http://localhost/lrc?t={title}" },
    { type = "lrclib" },
]
"#;
        let config = OverlyricConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.lyrics.providers,
            vec![
                LyricsProviderConfig::Endpoint {
                    name: "mirror".to_string(),
                    url: "http://localhost/lrc?t={title}".to_string(),
                },
                LyricsProviderConfig::Lrclib,
            ]
        );
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let err = OverlyricConfig::from_toml_str("[renderer]\nprogress_step = 0.0\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let err = OverlyricConfig::from_toml_str("[native]\nvolume_step = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));

        let err = OverlyricConfig::from_toml_str("[lyrics]\nproviders = []\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_renderer_geometry_must_be_positive() {
        for text in [
            "[renderer]\nscroll_speed_px = 0.0\n",
            "[renderer]\nscroll_speed_px = -40.0\n",
            "[renderer]\nchar_width_px = 0.0\n",
            "[renderer]\nviewport_width_px = -1.0\n",
            "[renderer]\nscroll_gap_px = -10.0\n",
        ] {
            let err = OverlyricConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, CoreError::ConfigInvalid { .. }), "{text}");
        }

        assert!(OverlyricConfig::from_toml_str("[renderer]\nscroll_gap_px = 0.0\n").is_ok());
    }

    #[test]
    fn test_unknown_provider_type_is_parse_error() {
        let err = OverlyricConfig::from_toml_str("[lyrics]\nproviders = [{ type = \"nope\" }]\n")
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfigParseError(_)));
    }

    #[test]
    fn test_first_run_writes_template() {
        let dir = std::env::temp_dir().join(format!("overlyric-config-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_dir_all(&dir);

        let config = OverlyricConfig::load_or_create_at(&path).unwrap();
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(fs::read_to_string(&path).unwrap(), CONFIG_TEMPLATE);

        let reloaded = OverlyricConfig::load_or_create_at(&path).unwrap();
        assert_eq!(reloaded.server.port, DEFAULT_SERVER_PORT);
        let _ = fs::remove_dir_all(&dir);
    }
}

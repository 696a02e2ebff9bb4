use crate::validate_enum;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub wall: WallSettings,

    #[serde(default = "default_screens")]
    pub screen: Vec<ScreenConfig>,

    #[serde(default)]
    pub sources: SourceSettings,

    #[serde(default)]
    pub player: PlayerSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Playback controller tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WallSettings {
    /// Upper bound on tiles playing network streams at once
    #[serde(default = "default_max_active_players")]
    pub max_active_players: usize,

    /// Failed attempts before a tile is demoted to local content
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Debounce before retrying after a playback error
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Seconds between automatic reassignment passes (0 disables)
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,

    #[serde(default = "default_loading_status_ms")]
    pub loading_status_ms: u64,

    #[serde(default = "default_short_status_ms")]
    pub retry_status_ms: u64,

    #[serde(default = "default_short_status_ms")]
    pub local_status_ms: u64,

    #[serde(default = "default_error_status_ms")]
    pub error_status_ms: u64,
}

impl Default for WallSettings {
    fn default() -> Self {
        Self {
            max_active_players: default_max_active_players(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            rotation_interval_secs: default_rotation_interval(),
            loading_status_ms: default_loading_status_ms(),
            retry_status_ms: default_short_status_ms(),
            local_status_ms: default_short_status_ms(),
            error_status_ms: default_error_status_ms(),
        }
    }
}

impl WallSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Periodic reassignment interval, None when disabled
    pub fn rotation_interval(&self) -> Option<Duration> {
        (self.rotation_interval_secs > 0).then(|| Duration::from_secs(self.rotation_interval_secs))
    }
}

fn default_max_active_players() -> usize {
    15
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_rotation_interval() -> u64 {
    900
} // 15 minutes
fn default_loading_status_ms() -> u64 {
    5000
}
fn default_short_status_ms() -> u64 {
    3000
}
fn default_error_status_ms() -> u64 {
    2000
}

/// One video wall, laid out as a grid on a single monitor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenConfig {
    pub name: String,

    #[serde(default = "default_grid")]
    pub rows: usize,

    #[serde(default = "default_grid")]
    pub cols: usize,
}

impl ScreenConfig {
    pub fn tile_count(&self) -> usize {
        self.rows * self.cols
    }
}

fn default_grid() -> usize {
    3
}

fn default_screens() -> Vec<ScreenConfig> {
    vec![ScreenConfig {
        name: "default".to_string(),
        rows: default_grid(),
        cols: default_grid(),
    }]
}

/// Where candidate media comes from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSettings {
    /// Playlist file with one stream URL per line
    #[serde(default)]
    pub playlist: Option<String>,

    #[serde(default = "default_true")]
    pub use_local_videos: bool,

    #[serde(default)]
    pub local_dirs: Vec<String>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            playlist: None,
            use_local_videos: true,
            local_dirs: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["mp4", "mkv", "webm", "mov", "avi", "m4v"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

/// Playback engine settings applied to every tile
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerSettings {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: i32,

    #[serde(default = "default_network_caching_ms")]
    pub network_caching_ms: u64,

    #[serde(default = "default_true")]
    pub hardware_decode: bool,

    #[serde(default = "default_video_sink")]
    pub video_sink: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            network_caching_ms: default_network_caching_ms(),
            hardware_decode: true,
            video_sink: default_video_sink(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_buffer_size() -> i32 {
    8192
}
fn default_network_caching_ms() -> u64 {
    1500
}
fn default_video_sink() -> String {
    "autovideosink".to_string()
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::with_default_screens());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("vidwall");

        Ok(config_dir.join("config.toml"))
    }

    /// Built-in defaults with a single screen
    pub fn with_default_screens() -> Self {
        Self {
            screen: default_screens(),
            ..Default::default()
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        if self.screen.is_empty() {
            anyhow::bail!("At least one [[screen]] must be configured");
        }

        let mut names = HashSet::new();
        for screen in &self.screen {
            if screen.rows == 0 || screen.cols == 0 {
                anyhow::bail!(
                    "Screen '{}' has an empty grid ({}x{})",
                    screen.name,
                    screen.rows,
                    screen.cols
                );
            }
            if !names.insert(screen.name.as_str()) {
                anyhow::bail!("Duplicate screen name: {}", screen.name);
            }
        }

        if self.sources.use_local_videos && self.sources.extensions.is_empty() {
            anyhow::bail!("Local videos are enabled but no extensions are configured");
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }
}

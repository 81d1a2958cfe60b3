use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub refresh: RefreshSection,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// `[refresh]` section as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause a worker slot takes after finishing a run, before starting the next one.
    #[serde(default = "default_min_cycle_interval")]
    pub min_cycle_interval_secs: u64,
    #[serde(default = "default_min_cycle_duration")]
    pub min_cycle_duration_secs: u64,
    pub playlists: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_seek")]
    pub seek_secs: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            timeout_secs: default_capture_timeout(),
            seek_secs: default_seek(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Validated, read-only settings that drive the refresh pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub concurrency: usize,
    pub batch_size: usize,
    pub min_cycle_interval: Duration,
    pub min_cycle_duration: Duration,
    pub sources: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.concurrency < 1 {
            return Err(ConfigError::Invalid("refresh.concurrency must be at least 1".into()));
        }
        if self.refresh.batch_size < 1 {
            return Err(ConfigError::Invalid("refresh.batch_size must be at least 1".into()));
        }
        if self.refresh.playlists.is_empty() {
            return Err(ConfigError::Invalid("refresh.playlists must not be empty".into()));
        }
        if self.capture.timeout_secs == 0 {
            return Err(ConfigError::Invalid("capture.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            concurrency: self.refresh.concurrency,
            batch_size: self.refresh.batch_size,
            min_cycle_interval: Duration::from_secs(self.refresh.min_cycle_interval_secs),
            min_cycle_duration: Duration::from_secs(self.refresh.min_cycle_duration_secs),
            sources: self.refresh.playlists.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_listen() -> String {
    "0.0.0.0:8004".into()
}
fn default_concurrency() -> usize {
    10
}
fn default_batch_size() -> usize {
    4
}
fn default_min_cycle_interval() -> u64 {
    10
}
fn default_min_cycle_duration() -> u64 {
    30
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_capture_timeout() -> u64 {
    5
}
fn default_seek() -> u32 {
    2
}
fn default_width() -> u32 {
    160
}
fn default_height() -> u32 {
    100
}
fn default_request_timeout() -> u64 {
    3
}
fn default_log_level() -> String {
    "info".into()
}

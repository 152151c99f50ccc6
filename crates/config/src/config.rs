//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value is outside its accepted range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Scan-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Codec of the default video stream that marks an item for re-encoding
    #[serde(default = "default_source_codec")]
    pub source_codec: String,
    /// Seconds between scans (0 = run a single pass)
    #[serde(default)]
    pub interval_secs: u64,
}

fn default_source_codec() -> String {
    "hevc".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            source_codec: default_source_codec(),
            interval_secs: 0,
        }
    }
}

/// FFmpeg invocation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FfmpegConfig {
    /// Program to execute (looked up in PATH when not absolute)
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Target video encoder passed to `-c:v`
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Constant rate factor passed to `-crf`
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// Target audio encoder passed to `-c:a`
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Audio bitrate passed to `-b:a`
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Marker appended to the file stem of the output file
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
    /// Kill the encoder after this many seconds (0 = wait forever)
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_crf() -> u8 {
    23
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_output_suffix() -> String {
    "-tox264".to_string()
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            video_codec: default_video_codec(),
            crf: default_crf(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            output_suffix: default_output_suffix(),
            timeout_secs: 0,
        }
    }
}

/// Location of the library catalog export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.json")
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Serve `GET /metrics` while the daemon runs (default true)
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Listen address for the metrics endpoint
    #[serde(default = "default_metrics_bind")]
    pub bind: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_bind() -> String {
    "127.0.0.1:7879".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            bind: default_metrics_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SWEEP_SOURCE_CODEC -> scan.source_codec
    /// - SWEEP_SCAN_INTERVAL_SECS -> scan.interval_secs
    /// - SWEEP_FFMPEG_BINARY -> ffmpeg.binary
    /// - SWEEP_CRF -> ffmpeg.crf
    /// - SWEEP_TIMEOUT_SECS -> ffmpeg.timeout_secs
    /// - SWEEP_CATALOG_PATH -> catalog.path
    /// - SWEEP_METRICS_ENABLED -> metrics.enabled
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SWEEP_SOURCE_CODEC") {
            if !val.trim().is_empty() {
                self.scan.source_codec = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("SWEEP_SCAN_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.scan.interval_secs = secs;
            }
        }

        if let Ok(val) = env::var("SWEEP_FFMPEG_BINARY") {
            if !val.is_empty() {
                self.ffmpeg.binary = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("SWEEP_CRF") {
            if let Ok(crf) = val.parse::<u8>() {
                self.ffmpeg.crf = crf;
            }
        }

        if let Ok(val) = env::var("SWEEP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.ffmpeg.timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("SWEEP_CATALOG_PATH") {
            if !val.is_empty() {
                self.catalog.path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("SWEEP_METRICS_ENABLED") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.metrics.enabled = true,
                "false" | "0" | "no" => self.metrics.enabled = false,
                _ => {} // Invalid value, keep existing
            }
        }
    }

    /// Reject values that would make a transcode unsafe or meaningless.
    ///
    /// An empty output suffix would make the output path equal to the source,
    /// so a successful encode would delete the only copy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.source_codec.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scan.source_codec must not be empty".to_string(),
            ));
        }

        let suffix = &self.ffmpeg.output_suffix;
        if suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "ffmpeg.output_suffix must not be empty".to_string(),
            ));
        }
        if suffix.contains('/') || suffix.contains('\\') {
            return Err(ConfigError::Invalid(format!(
                "ffmpeg.output_suffix '{}' must not contain path separators",
                suffix
            )));
        }

        if self.ffmpeg.crf > 51 {
            return Err(ConfigError::Invalid(format!(
                "ffmpeg.crf {} is outside 0..=51",
                self.ffmpeg.crf
            )));
        }

        if self.ffmpeg.video_codec.trim().is_empty() || self.ffmpeg.audio_codec.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ffmpeg.video_codec and ffmpeg.audio_codec must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

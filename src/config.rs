//! ==============================================================================
//! config.rs - snapper configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for the snapper toml file and validates it.
//!     a config is either fully valid or rejected; nothing is half-applied.
//!
//! structure:
//!     - ServerConfig: where the grow controller lives and how to authenticate
//!     - DataConfig: which grow system to annotate and which readings to show
//!     - CameraConfig: capture size and command
//!     - OutputConfig: where photos land, strict vs lenient annotation
//!     - StyleConfig: font / logo assets for the composer
//!     - LoggingConfig: default log level
//!
//! ==============================================================================

use crate::domain::OverlayDescriptor;

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("server options missing required parameter: {0}")]
    ServerOptionsMissing(&'static str),
    #[error("data options missing required parameter: {0}")]
    DataOptionsMissing(&'static str),
    #[error("invalid camera options: {0}")]
    Camera(&'static str),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct SnapperConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host_name: String,
    pub port_number: u16,
    #[serde(default)]
    pub server_passphrase: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub grow_system_id: String,
    #[serde(default = "default_cache_directory")]
    pub cache_directory: PathBuf,
    #[serde(default)]
    pub sensor_readings: Vec<OverlayDescriptor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_camera_command")]
    pub command: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub image_destination: PathBuf,
    /// fail the run when no annotation could be produced
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogoCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StyleConfig {
    #[serde(default = "default_heading_font")]
    pub name_font: PathBuf,
    #[serde(default = "default_heading_font")]
    pub age_font: PathBuf,
    #[serde(default = "default_sensor_font")]
    pub sensor_font: PathBuf,
    #[serde(default)]
    pub logo: Option<PathBuf>,
    #[serde(default)]
    pub logo_corner: LogoCorner,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_request_timeout() -> u64 { 10 }
fn default_cache_directory() -> PathBuf { PathBuf::from("cache") }
fn default_width() -> u32 { 3840 }
fn default_height() -> u32 { 2160 }
fn default_camera_command() -> String { "libcamera-still".to_string() }
fn default_heading_font() -> PathBuf { PathBuf::from("assets/DejaVuSans-Bold.ttf") }
fn default_sensor_font() -> PathBuf { PathBuf::from("assets/DejaVuSansMono.ttf") }
fn default_log_level() -> String { "info".to_string() }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            command: default_camera_command(),
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            name_font: default_heading_font(),
            age_font: default_heading_font(),
            sensor_font: default_sensor_font(),
            logo: None,
            logo_corner: LogoCorner::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl SnapperConfig {
    /// Load and validate configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SnapperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host_name.trim().is_empty() {
            return Err(ConfigError::ServerOptionsMissing("host_name"));
        }
        if self.data.grow_system_id.trim().is_empty() {
            return Err(ConfigError::DataOptionsMissing("grow_system_id"));
        }
        if let Some(d) = self.data.sensor_readings.iter().find(|d| d.sensor_id.is_empty() || d.reading_id.is_empty()) {
            tracing::debug!(?d, "[CONFIG] Incomplete sensor reading entry");
            return Err(ConfigError::DataOptionsMissing("sensor_readings.sensor_id/reading_id"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Camera("width and height must be non-zero"));
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│          SNAPPER CONFIGURATION          │");
        tracing::info!("├─────────────────────────────────────────┤");
        tracing::info!("│ Controller: {}:{}", self.server.host_name, self.server.port_number);
        tracing::info!("│ Passphrase: {}", if self.server.server_passphrase.is_some() { "set" } else { "none" });
        tracing::info!("│ Grow System: {}", self.data.grow_system_id);
        tracing::info!("│ Sensor Overlays: {}", self.data.sensor_readings.len());
        tracing::info!("│ Capture: {}x{}", self.camera.width, self.camera.height);
        tracing::info!("│ Output: {}", self.output.image_destination.display());
        tracing::info!("│ Cache: {}", self.data.cache_directory.display());
        tracing::info!("└─────────────────────────────────────────┘");
    }
}

//! Capture configuration.
//!
//! Settings come from three layers: built-in defaults, an optional TOML
//! file, then command-line flags. The result is immutable once the
//! pipeline starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Raw sensor output format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum PixelFormat {
    /// 8 bits per pixel.
    #[default]
    #[serde(rename = "RAW8", alias = "raw8")]
    Raw8,
    /// 16 bits per pixel, little-endian.
    #[serde(rename = "RAW16", alias = "raw16")]
    Raw16,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Raw8 => 1,
            PixelFormat::Raw16 => 2,
        }
    }

    /// Matching `ffmpeg -pixel_format` name for the consumer side.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Raw8 => "gray8",
            PixelFormat::Raw16 => "gray16le",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Raw8 => f.write_str("RAW8"),
            PixelFormat::Raw16 => f.write_str("RAW16"),
        }
    }
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Stop after this long. `None` runs until a signal arrives.
    #[serde(with = "duration_ms")]
    pub duration: Option<Duration>,
    /// Exposure time in milliseconds.
    pub exposure_ms: u32,
    /// Gain (0-100). Seed value when auto-gain is on.
    pub gain: u32,
    /// Let the camera adjust gain.
    pub auto_gain: bool,
    /// Ceiling for auto-gain.
    pub auto_max_gain: u32,
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Verbose diagnostics.
    pub verbose: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration: None,
            exposure_ms: 250,
            gain: 50,
            auto_gain: false,
            auto_max_gain: 80,
            pixel_format: PixelFormat::Raw8,
            verbose: false,
        }
    }
}

/// Highest gain accepted on the command line and in config files.
pub const MAX_GAIN: u32 = 100;

impl CaptureConfig {
    /// Exposure as the camera expects it, in microseconds.
    #[inline]
    pub fn exposure_us(&self) -> i64 {
        i64::from(self.exposure_ms) * 1000
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exposure_ms == 0 {
            return Err(ConfigError::InvalidExposure);
        }
        if self.gain > MAX_GAIN {
            return Err(ConfigError::InvalidGain(self.gain));
        }
        if self.auto_max_gain > MAX_GAIN {
            return Err(ConfigError::InvalidGain(self.auto_max_gain));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid exposure time (must be at least 1 ms)")]
    InvalidExposure,
    #[error("invalid gain {0} (must be 0-{MAX_GAIN})")]
    InvalidGain(u32),
    #[error("invalid simulated frame rate {0} (must be positive)")]
    InvalidFrameRate(f64),
    #[error("invalid simulated resolution {0}x{1}")]
    InvalidDimensions(u32, u32),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Settings for the built-in simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Reported sensor width.
    pub width: u32,
    /// Reported sensor height.
    pub height: u32,
    /// Frame clock. `None` delivers frames as fast as they are requested.
    pub fps: Option<f64>,
    /// Report a color sensor.
    pub color: bool,
    /// Report multiple trigger modes.
    pub trigger_modes: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            fps: Some(10.0),
            color: false,
            trigger_modes: false,
        }
    }
}

impl SimulationConfig {
    /// Validates the simulated device description.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions(self.width, self.height));
        }
        match self.fps {
            Some(fps) if !(fps.is_finite() && fps > 0.0) => Err(ConfigError::InvalidFrameRate(fps)),
            _ => Ok(()),
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

/// Full configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.simulation.validate()?;
        Ok(config)
    }
}

/// Durations in config files are plain millisecond counts; -1 means unbounded.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_i64(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = i64::deserialize(d)?;
        match u64::try_from(ms) {
            Ok(ms) => Ok(Some(Duration::from_millis(ms))),
            Err(_) if ms == -1 => Ok(None),
            Err(_) => Err(serde::de::Error::custom(format!(
                "invalid duration {ms} ms (use -1 for unbounded)"
            ))),
        }
    }
}

//! Command-line interface.

use crate::capture::{CaptureConfig, ConfigError, FileConfig, PixelFormat, MAX_GAIN};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Stream raw frames from a ZWO ASI camera to stdout.
///
/// Pipe the output into an encoder that knows the sensor resolution and
/// pixel format, e.g.
/// `asi-frame-pipe -d 1h | ffmpeg -f rawvideo -pixel_format gray8 -video_size 1280x960 -i pipe:0 out.mkv`
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Stop after this long: a whole number with s, m or h suffix (e.g. 30s, 5m, 2h)
    #[arg(short = 'd', long, value_name = "N{s|m|h}", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Exposure time in milliseconds
    #[arg(short = 'e', long, value_name = "MS", value_parser = clap::value_parser!(u32).range(1..))]
    pub exposure: Option<u32>,

    /// Let the camera adjust gain
    #[arg(short = 'G', long = "auto-gain")]
    pub auto_gain: bool,

    /// Gain (0-100); starting value when auto-gain is on
    #[arg(short = 'g', long, value_name = "N", value_parser = clap::value_parser!(u32).range(0..=MAX_GAIN as i64))]
    pub gain: Option<u32>,

    /// Upper bound for auto-gain (0-100)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(0..=MAX_GAIN as i64))]
    pub auto_max_gain: Option<u32>,

    /// Pixel format
    #[arg(short = 'p', long = "pixel-format", value_enum, ignore_case = true)]
    pub pixel_format: Option<PixelFormat>,

    /// Verbose diagnostics
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// TOML configuration file; flags override its values
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use the built-in simulated camera instead of the SDK
    #[arg(long)]
    pub simulate: bool,

    /// Serve Prometheus metrics on this port (0 disables)
    #[arg(long, value_name = "PORT")]
    pub metrics_port: Option<u16>,
}

impl Args {
    /// Overlays the flags that were given on top of `base`.
    pub fn apply(&self, base: CaptureConfig) -> CaptureConfig {
        CaptureConfig {
            duration: self.duration.or(base.duration),
            exposure_ms: self.exposure.unwrap_or(base.exposure_ms),
            gain: self.gain.unwrap_or(base.gain),
            auto_gain: self.auto_gain || base.auto_gain,
            auto_max_gain: self.auto_max_gain.unwrap_or(base.auto_max_gain),
            pixel_format: self.pixel_format.unwrap_or(base.pixel_format),
            verbose: self.verbose || base.verbose,
        }
    }

    /// Builds the effective configuration: defaults, then the config
    /// file if one was given, then command-line flags.
    pub fn load_config(&self) -> Result<FileConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        config.capture = self.apply(config.capture);
        config.capture.validate()?;
        if let Some(port) = self.metrics_port {
            config.metrics.port = port;
        }
        Ok(config)
    }
}

/// Parses `N{s|m|h}` into a duration.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let Some(unit) = value.chars().last() else {
        return Err("empty duration".to_owned());
    };
    let millis_per_unit: u64 = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        _ => {
            return Err(format!(
                "invalid duration suffix in '{value}' (expected s, m or h)"
            ))
        }
    };

    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid duration '{value}'"));
    }
    let count: u64 = digits
        .parse()
        .map_err(|_| format!("duration '{value}' is too large"))?;
    let millis = count
        .checked_mul(millis_per_unit)
        .ok_or_else(|| format!("duration '{value}' is too large"))?;
    Ok(Duration::from_millis(millis))
}

//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over the camera SDK,
//! allowing the pipeline to drive either the vendor library or the
//! simulated camera used for testing.

use super::PixelFormat;
use std::time::Duration;
use thiserror::Error;

/// Bounded wait for a single frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(2000);

/// Status code returned by the camera SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: Self = Self(0);
    pub const INVALID_INDEX: Self = Self(1);
    pub const INVALID_ID: Self = Self(2);
    pub const INVALID_CONTROL_TYPE: Self = Self(3);
    pub const CAMERA_CLOSED: Self = Self(4);
    pub const CAMERA_REMOVED: Self = Self(5);
    pub const INVALID_SIZE: Self = Self(8);
    pub const INVALID_IMGTYPE: Self = Self(9);
    pub const OUTOF_BOUNDARY: Self = Self(10);
    pub const TIMEOUT: Self = Self(11);
    pub const INVALID_SEQUENCE: Self = Self(12);
    pub const BUFFER_TOO_SMALL: Self = Self(13);
    pub const VIDEO_MODE_ACTIVE: Self = Self(14);
    pub const EXPOSURE_IN_PROGRESS: Self = Self(15);
    pub const GENERAL_ERROR: Self = Self(16);
    pub const INVALID_MODE: Self = Self(17);

    /// Symbolic name of the code, when known.
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "success",
            1 => "invalid index",
            2 => "invalid id",
            3 => "invalid control type",
            4 => "camera closed",
            5 => "camera removed",
            6 => "invalid path",
            7 => "invalid file format",
            8 => "invalid size",
            9 => "invalid image type",
            10 => "out of boundary",
            11 => "timeout",
            12 => "invalid sequence",
            13 => "buffer too small",
            14 => "video mode active",
            15 => "exposure in progress",
            16 => "general error",
            17 => "invalid mode",
            _ => "unknown",
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera connected")]
    NoCamera,
    #[error("failed to open camera {name}: {code}, are you root?")]
    OpenFailed { name: String, code: ErrorCode },
    #[error("{op}() error: {code}")]
    Sdk { op: &'static str, code: ErrorCode },
    #[error("camera SDK unavailable: {0}")]
    Library(String),
    #[error("frame buffer holds {got} bytes, camera delivers {need}")]
    BufferSize { got: usize, need: usize },
    #[error("capture not started")]
    NotCapturing,
    #[error("camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// SDK status code carried by this error, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CameraError::OpenFailed { code, .. } | CameraError::Sdk { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Color filter layout of a color sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerPattern {
    Rg,
    Bg,
    Gr,
    Gb,
}

impl BayerPattern {
    /// Maps the SDK enumeration value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(BayerPattern::Rg),
            1 => Some(BayerPattern::Bg),
            2 => Some(BayerPattern::Gr),
            3 => Some(BayerPattern::Gb),
            _ => None,
        }
    }
}

impl std::fmt::Display for BayerPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BayerPattern::Rg => "RG",
            BayerPattern::Bg => "BG",
            BayerPattern::Gr => "GR",
            BayerPattern::Gb => "GB",
        })
    }
}

/// Static properties of an attached camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Model name.
    pub name: String,
    /// SDK camera identifier, used for every call after enumeration.
    pub id: i32,
    /// Full sensor width in pixels.
    pub max_width: u32,
    /// Full sensor height in pixels.
    pub max_height: u32,
    /// `Some` for color sensors.
    pub bayer: Option<BayerPattern>,
    /// Camera supports modes other than continuous streaming.
    pub is_trigger_cam: bool,
}

/// Adjustable camera controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Gain,
    /// Exposure in microseconds.
    Exposure,
    Gamma,
    WbR,
    WbB,
    Offset,
    BandwidthOverload,
    Overclock,
    /// Sensor temperature in tenths of a degree Celsius.
    Temperature,
    Flip,
    AutoMaxGain,
    AutoMaxExposure,
    AutoTargetBrightness,
    HardwareBin,
    HighSpeedMode,
    CoolerPowerPercent,
    TargetTemperature,
    CoolerOn,
    MonoBin,
    FanOn,
    PatternAdjust,
    AntiDewHeater,
    Other(i32),
}

impl ControlKind {
    /// SDK control type value.
    pub fn as_raw(self) -> i32 {
        match self {
            ControlKind::Gain => 0,
            ControlKind::Exposure => 1,
            ControlKind::Gamma => 2,
            ControlKind::WbR => 3,
            ControlKind::WbB => 4,
            ControlKind::Offset => 5,
            ControlKind::BandwidthOverload => 6,
            ControlKind::Overclock => 7,
            ControlKind::Temperature => 8,
            ControlKind::Flip => 9,
            ControlKind::AutoMaxGain => 10,
            ControlKind::AutoMaxExposure => 11,
            ControlKind::AutoTargetBrightness => 12,
            ControlKind::HardwareBin => 13,
            ControlKind::HighSpeedMode => 14,
            ControlKind::CoolerPowerPercent => 15,
            ControlKind::TargetTemperature => 16,
            ControlKind::CoolerOn => 17,
            ControlKind::MonoBin => 18,
            ControlKind::FanOn => 19,
            ControlKind::PatternAdjust => 20,
            ControlKind::AntiDewHeater => 21,
            ControlKind::Other(raw) => raw,
        }
    }

    /// Maps an SDK control type value.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ControlKind::Gain,
            1 => ControlKind::Exposure,
            2 => ControlKind::Gamma,
            3 => ControlKind::WbR,
            4 => ControlKind::WbB,
            5 => ControlKind::Offset,
            6 => ControlKind::BandwidthOverload,
            7 => ControlKind::Overclock,
            8 => ControlKind::Temperature,
            9 => ControlKind::Flip,
            10 => ControlKind::AutoMaxGain,
            11 => ControlKind::AutoMaxExposure,
            12 => ControlKind::AutoTargetBrightness,
            13 => ControlKind::HardwareBin,
            14 => ControlKind::HighSpeedMode,
            15 => ControlKind::CoolerPowerPercent,
            16 => ControlKind::TargetTemperature,
            17 => ControlKind::CoolerOn,
            18 => ControlKind::MonoBin,
            19 => ControlKind::FanOn,
            20 => ControlKind::PatternAdjust,
            21 => ControlKind::AntiDewHeater,
            other => ControlKind::Other(other),
        }
    }
}

/// Capability record for one control, as exposed by the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCaps {
    pub name: String,
    pub description: String,
    pub min: i64,
    pub max: i64,
    pub default: i64,
    pub auto_supported: bool,
    pub writable: bool,
    pub kind: ControlKind,
}

/// Current value of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlValue {
    pub value: i64,
    pub auto: bool,
}

/// Camera operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Continuous streaming.
    Normal,
    SoftEdge,
    RiseEdge,
    FallEdge,
    SoftLevel,
    HighLevel,
    LowLevel,
    Other(i32),
}

impl TriggerMode {
    pub fn as_raw(self) -> i32 {
        match self {
            TriggerMode::Normal => 0,
            TriggerMode::SoftEdge => 1,
            TriggerMode::RiseEdge => 2,
            TriggerMode::FallEdge => 3,
            TriggerMode::SoftLevel => 4,
            TriggerMode::HighLevel => 5,
            TriggerMode::LowLevel => 6,
            TriggerMode::Other(raw) => raw,
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => TriggerMode::Normal,
            1 => TriggerMode::SoftEdge,
            2 => TriggerMode::RiseEdge,
            3 => TriggerMode::FallEdge,
            4 => TriggerMode::SoftLevel,
            5 => TriggerMode::HighLevel,
            6 => TriggerMode::LowLevel,
            other => TriggerMode::Other(other),
        }
    }
}

/// Active sensor window and pixel depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiFormat {
    pub width: u32,
    pub height: u32,
    pub bin: u32,
    pub format: PixelFormat,
}

impl RoiFormat {
    /// Full sensor at bin 1.
    pub fn full_sensor(info: &CameraInfo, format: PixelFormat) -> Self {
        Self {
            width: info.max_width,
            height: info.max_height,
            bin: 1,
            format,
        }
    }

    /// Bytes delivered per frame in this format.
    #[inline]
    pub fn frame_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel()
    }
}

/// Trait for an opened camera.
///
/// Mirrors the SDK call surface one to one; implementations report
/// failures with the SDK status code and never retry.
pub trait Camera {
    /// Static properties of this camera.
    fn info(&self) -> &CameraInfo;

    /// Lists every control the camera exposes.
    fn control_caps(&self) -> Result<Vec<ControlCaps>, CameraError>;

    /// Reads the current value of a control.
    fn control(&self, kind: ControlKind) -> Result<ControlValue, CameraError>;

    /// Writes a control value, optionally handing it to the camera's auto loop.
    fn set_control(&mut self, kind: ControlKind, value: i64, auto: bool)
        -> Result<(), CameraError>;

    /// Configures the sensor window and pixel depth.
    fn set_roi_format(&mut self, roi: &RoiFormat) -> Result<(), CameraError>;

    /// Reads the operating mode.
    fn trigger_mode(&self) -> Result<TriggerMode, CameraError>;

    /// Selects the operating mode.
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), CameraError>;

    /// Starts continuous capture.
    fn start_capture(&mut self) -> Result<(), CameraError>;

    /// Blocks up to `timeout` for the next frame and copies it into `buf`.
    fn next_frame(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), CameraError>;

    /// Frames the camera discarded since capture started.
    fn dropped_frames(&self) -> Result<u64, CameraError>;

    /// Stops continuous capture.
    fn stop_capture(&mut self) -> Result<(), CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources. Safe to call twice.
    fn close(&mut self);
}

/// Entry point of a camera SDK: enumeration and opening.
pub trait CameraDriver {
    type Camera: Camera;

    /// Lists attached cameras.
    fn connected(&self) -> Result<Vec<CameraInfo>, CameraError>;

    /// Opens and initializes a camera returned by [`connected`](Self::connected).
    fn open(&self, info: &CameraInfo) -> Result<Self::Camera, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display_names_code() {
        assert_eq!(ErrorCode::TIMEOUT.to_string(), "11 (timeout)");
        assert_eq!(ErrorCode(99).to_string(), "99 (unknown)");
    }

    #[test]
    fn test_sdk_error_message_contains_code() {
        let err = CameraError::Sdk {
            op: "ASIGetVideoData",
            code: ErrorCode::CAMERA_REMOVED,
        };
        assert_eq!(err.to_string(), "ASIGetVideoData() error: 5 (camera removed)");
        assert_eq!(err.code(), Some(ErrorCode::CAMERA_REMOVED));
    }

    #[test]
    fn test_open_error_hints_permissions() {
        let err = CameraError::OpenFailed {
            name: "ZWO ASI120MM".to_owned(),
            code: ErrorCode::INVALID_ID,
        };
        assert!(err.to_string().contains("are you root?"));
    }

    #[test]
    fn test_control_kind_raw_mapping() {
        for raw in 0..=21 {
            assert_eq!(ControlKind::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(ControlKind::from_raw(8), ControlKind::Temperature);
        assert_eq!(ControlKind::from_raw(42), ControlKind::Other(42));
    }

    #[test]
    fn test_roi_frame_len() {
        let info = CameraInfo {
            name: "test".to_owned(),
            id: 0,
            max_width: 1280,
            max_height: 960,
            bayer: None,
            is_trigger_cam: false,
        };
        let roi = RoiFormat::full_sensor(&info, PixelFormat::Raw16);
        assert_eq!(roi.bin, 1);
        assert_eq!(roi.frame_len(), 1280 * 960 * 2);
    }
}

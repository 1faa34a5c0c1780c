//! Camera input and frame handling.
//!
//! This module provides the camera abstraction the pipeline drives,
//! the reusable frame buffer, and capture configuration. Two backends
//! implement [`CameraDriver`]: the vendor SDK (`asi` feature) and a
//! simulated camera for tests and dry runs.

#[cfg(feature = "asi")]
mod asi;
mod camera;
mod config;
mod frame;
mod simulated;

#[cfg(feature = "asi")]
pub use asi::{AsiCamera, AsiDriver, LIBRARY_ENV};
pub use camera::{
    BayerPattern, Camera, CameraDriver, CameraError, CameraInfo, ControlCaps, ControlKind,
    ControlValue, ErrorCode, RoiFormat, TriggerMode, FRAME_TIMEOUT,
};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, MetricsConfig, PixelFormat, SimulationConfig,
    MAX_GAIN,
};
pub use frame::FrameBuffer;
pub use simulated::{SimulatedCamera, SimulatedDriver};

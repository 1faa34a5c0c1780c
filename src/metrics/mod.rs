//! Prometheus metrics exporter for capture monitoring.
//!
//! # Metrics Exposed
//!
//! - `asi_frame_pipe_frames_total` - Frames written to the output
//! - `asi_frame_pipe_dropped_frames` - Frames dropped by the camera
//! - `asi_frame_pipe_bytes_written_total` - Raw video bytes written
//! - `asi_frame_pipe_gain` - Current gain
//! - `asi_frame_pipe_exposure_seconds` - Current exposure time
//! - `asi_frame_pipe_sensor_temperature_celsius` - Sensor temperature
//!
//! The registry is always available; the HTTP endpoint requires the
//! `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use asi_frame_pipe::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     frames: 100,
//!     dropped: 2,
//!     gain: 70,
//!     exposure_us: 100_000,
//!     temperature_celsius: 21.5,
//!     bytes_written: 100 * 1280 * 960,
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};

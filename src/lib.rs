//! ASI Frame Pipe Library
//!
//! Captures raw frames from a ZWO ASI astronomy camera, stamps a short
//! diagnostic line onto each one and streams the pixel buffer to
//! standard output for an external encoder.
//!
//! # Architecture
//!
//! One device, one loop, one output stream:
//!
//! ```text
//! cli → capture (camera setup) → pipeline (capture loop) → stdout
//!                                    ↓           ↓
//!                                 overlay     metrics
//! ```
//!
//! # Design Principles
//!
//! - **Fail fast**: every SDK error ends the process; a supervisor restarts it
//! - **No buffering**: one reusable frame buffer, overwritten in place
//! - **stdout is data**: all diagnostics go to stderr
//!
//! # Example
//!
//! ```no_run
//! use asi_frame_pipe::{
//!     capture::{CaptureConfig, SimulatedDriver, SimulationConfig},
//!     pipeline::{run_session, CaptureContext, ExitFlag},
//! };
//! use std::time::Duration;
//!
//! let config = CaptureConfig {
//!     duration: Some(Duration::from_secs(3)),
//!     ..Default::default()
//! };
//! let driver = SimulatedDriver::new(SimulationConfig::default());
//! let mut ctx = CaptureContext::new(&config, ExitFlag::new());
//!
//! let mut out = std::io::sink();
//! let summary = run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();
//! println!("{summary}");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod cli;
pub mod metrics;
pub mod overlay;
pub mod pipeline;

// Re-export commonly used types at crate root
pub use capture::{Camera, CameraDriver, CaptureConfig, FrameBuffer, PixelFormat};
pub use cli::Args;
pub use overlay::FrameStatus;
pub use pipeline::{run_session, CaptureContext, CaptureSummary, ExitFlag, PipelineError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

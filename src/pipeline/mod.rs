//! Capture pipeline.
//!
//! Drives one camera from initialization to shutdown:
//!
//! ```text
//! open_first → describe → configure → capture loop → stop → close
//!                                        │
//!                    next_frame → query controls → overlay → stdout
//! ```
//!
//! Every camera or output error ends the run; there is no retry tier.
//! The process is meant to be restarted by an external supervisor.

pub mod setup;
pub mod signal;

pub use signal::{ExitFlag, SignalLatches};

use crate::capture::{
    Camera, CameraDriver, CameraError, CaptureConfig, ControlKind, FrameBuffer,
    PixelFormat, FRAME_TIMEOUT,
};
use crate::metrics::{MetricsError, MetricsRegistry, MetricsSnapshot};
use crate::overlay::{self, FrameStatus, OverlayStyle};
use chrono::Utc;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end a capture run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("failed to write frame: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to install signal handlers: {0}")]
    Signal(std::io::Error),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("built without camera SDK support, use --simulate")]
    NoBackend,
}

/// Why the capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM.
    Signal,
    /// The configured duration elapsed.
    DurationElapsed,
    /// Standard output is a terminal; the loop never ran.
    OutputIsTerminal,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StopReason::Signal => "signal",
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::OutputIsTerminal => "stdout is a terminal",
        })
    }
}

/// Frame counters, mutated only by the capture loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Frames fetched and written.
    pub frames: u64,
    /// Frames the camera reports as dropped.
    pub dropped: u64,
}

/// State owned by one capture run.
pub struct CaptureContext {
    /// Stop after this long, measured from loop start.
    pub duration: Option<Duration>,
    /// Bounded wait for each frame.
    pub timeout: Duration,
    /// Stop request from the signal handler.
    pub exit: ExitFlag,
    /// Overlay placement.
    pub style: OverlayStyle,
    counters: Counters,
    bytes_written: u64,
    metrics: Option<MetricsRegistry>,
}

impl CaptureContext {
    /// Creates a context for `config`, stopping when `exit` is set.
    pub fn new(config: &CaptureConfig, exit: ExitFlag) -> Self {
        Self {
            duration: config.duration,
            timeout: FRAME_TIMEOUT,
            exit,
            style: OverlayStyle::default(),
            counters: Counters::default(),
            bytes_written: 0,
            metrics: None,
        }
    }

    /// Publishes per-frame values to `registry`.
    pub fn with_metrics(mut self, registry: MetricsRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Counters so far.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Raw bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Checked once per iteration, before the frame fetch.
    fn stop_reason(&self, started: Instant) -> Option<StopReason> {
        if self.exit.is_set() {
            return Some(StopReason::Signal);
        }
        match self.duration {
            Some(limit) if started.elapsed() >= limit => Some(StopReason::DurationElapsed),
            _ => None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Frames written to the output.
    pub frames: u64,
    /// Last dropped-frame count reported by the camera.
    pub dropped: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of every frame.
    pub format: PixelFormat,
    /// Why the loop ended.
    pub stop: StopReason,
}

impl CaptureSummary {
    /// Bytes of one emitted frame.
    pub fn frame_len(&self) -> usize {
        FrameBuffer::frame_len(self.width, self.height, self.format)
    }
}

impl std::fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames written: {}, dropped: {} (stopped: {})",
            self.frames, self.dropped, self.stop
        )
    }
}

/// Runs the whole pipeline against the first camera of `driver`.
///
/// When `out_is_terminal` is set the camera is still initialized and
/// described, but no frames are written.
pub fn run_session<D: CameraDriver, W: Write>(
    driver: &D,
    config: &CaptureConfig,
    out: &mut W,
    out_is_terminal: bool,
    ctx: &mut CaptureContext,
) -> Result<CaptureSummary, PipelineError> {
    let mut camera = setup::open_first(driver)?;
    setup::describe(&camera)?;
    let roi = setup::configure(&mut camera, config)?;
    let mut frame = FrameBuffer::new(roi.width, roi.height, roi.format);

    let stop = if out_is_terminal {
        warn!("stdout is a tty, will not dump video data");
        StopReason::OutputIsTerminal
    } else {
        run_capture(&mut camera, &mut frame, out, ctx)?
    };
    camera.close();

    let counters = ctx.counters();
    Ok(CaptureSummary {
        frames: counters.frames,
        dropped: counters.dropped,
        width: roi.width,
        height: roi.height,
        format: roi.format,
        stop,
    })
}

/// Starts capture, runs the loop, and stops capture on every exit path.
pub fn run_capture<C: Camera, W: Write>(
    camera: &mut C,
    frame: &mut FrameBuffer,
    out: &mut W,
    ctx: &mut CaptureContext,
) -> Result<StopReason, PipelineError> {
    camera.start_capture()?;
    info!(
        duration_ms = ctx.duration.map(|d| d.as_millis() as u64),
        "Capture started"
    );

    let result = capture_loop(camera, frame, out, ctx);

    if let Err(e) = camera.stop_capture() {
        warn!(error = %e, "Failed to stop capture");
    }
    result
}

fn capture_loop<C: Camera, W: Write>(
    camera: &mut C,
    frame: &mut FrameBuffer,
    out: &mut W,
    ctx: &mut CaptureContext,
) -> Result<StopReason, PipelineError> {
    let started = Instant::now();
    loop {
        if let Some(reason) = ctx.stop_reason(started) {
            return Ok(reason);
        }

        camera.next_frame(frame.as_bytes_mut(), ctx.timeout)?;
        ctx.counters.frames += 1;

        let gain = camera.control(ControlKind::Gain)?;
        let exposure = camera.control(ControlKind::Exposure)?;
        let temperature = camera.control(ControlKind::Temperature)?;
        ctx.counters.dropped = camera.dropped_frames()?;

        let status = FrameStatus {
            timestamp: Utc::now(),
            gain: gain.value,
            exposure_us: exposure.value,
            frame: ctx.counters.frames,
            dropped: ctx.counters.dropped,
            temperature_tenths: temperature.value,
        };
        overlay::draw_text(frame, &status.to_string(), &ctx.style);

        out.write_all(frame.as_bytes())?;
        out.flush()?;
        ctx.bytes_written += frame.len() as u64;

        debug!(%status, "Frame written");
        if let Some(metrics) = &ctx.metrics {
            metrics.update(&MetricsSnapshot::from_status(&status, ctx.bytes_written));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ErrorCode, SimulatedDriver, SimulationConfig};

    fn sim(fps: Option<f64>) -> SimulationConfig {
        SimulationConfig {
            width: 64,
            height: 48,
            fps,
            ..Default::default()
        }
    }

    /// Sets the exit flag after a fixed number of frames.
    struct StopAfter {
        inner: Vec<u8>,
        frame_len: usize,
        frames: usize,
        exit: ExitFlag,
    }

    impl Write for StopAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.extend_from_slice(buf);
            if self.inner.len() >= self.frames * self.frame_len {
                self.exit.set();
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duration_bounds_instant_source() {
        let driver = SimulatedDriver::new(sim(None));
        let config = CaptureConfig {
            duration: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut ctx = CaptureContext::new(&config, ExitFlag::new());
        let mut out = Vec::new();

        let started = Instant::now();
        let summary = run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();

        assert_eq!(summary.stop, StopReason::DurationElapsed);
        assert!(started.elapsed() < Duration::from_millis(50) + FRAME_TIMEOUT);
        assert!(summary.frames > 0);
        assert_eq!(out.len(), summary.frames as usize * summary.frame_len());
    }

    #[test]
    fn test_zero_duration_writes_nothing() {
        let driver = SimulatedDriver::new(sim(None));
        let config = CaptureConfig {
            duration: Some(Duration::ZERO),
            ..Default::default()
        };
        let mut ctx = CaptureContext::new(&config, ExitFlag::new());
        let mut out = Vec::new();

        let summary = run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();
        assert_eq!(summary.frames, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_flag_stops_within_one_iteration() {
        let driver = SimulatedDriver::new(sim(None));
        let config = CaptureConfig {
            pixel_format: PixelFormat::Raw16,
            ..Default::default()
        };
        let exit = ExitFlag::new();
        let mut ctx = CaptureContext::new(&config, exit.clone());
        let mut out = StopAfter {
            inner: Vec::new(),
            frame_len: 64 * 48 * 2,
            frames: 3,
            exit,
        };

        let summary = run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();

        assert_eq!(summary.stop, StopReason::Signal);
        assert_eq!(summary.frames, 3);
        assert_eq!(out.inner.len(), 3 * 64 * 48 * 2);
    }

    #[test]
    fn test_capture_error_is_fatal_and_emits_nothing_more() {
        let driver =
            SimulatedDriver::new(sim(None)).with_capture_failure(2, ErrorCode::CAMERA_REMOVED);
        let config = CaptureConfig::default();
        let mut ctx = CaptureContext::new(&config, ExitFlag::new());
        let mut out = Vec::new();

        let err = run_session(&driver, &config, &mut out, false, &mut ctx).unwrap_err();

        assert!(err.to_string().contains("5 (camera removed)"));
        assert_eq!(ctx.counters().frames, 2);
        assert_eq!(out.len(), 2 * 64 * 48);
    }

    #[test]
    fn test_terminal_output_skips_loop() {
        let driver = SimulatedDriver::new(sim(None));
        let config = CaptureConfig::default();
        let mut ctx = CaptureContext::new(&config, ExitFlag::new());
        let mut out = Vec::new();

        let summary = run_session(&driver, &config, &mut out, true, &mut ctx).unwrap();

        assert_eq!(summary.stop, StopReason::OutputIsTerminal);
        assert_eq!(summary.frames, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_overlay_stamped_on_frame() {
        let driver = SimulatedDriver::new(SimulationConfig {
            width: 400,
            height: 40,
            fps: None,
            ..Default::default()
        });
        let config = CaptureConfig::default();
        let exit = ExitFlag::new();
        let mut ctx = CaptureContext::new(&config, exit.clone());
        let mut out = StopAfter {
            inner: Vec::new(),
            frame_len: 400 * 40,
            frames: 1,
            exit,
        };

        run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();

        // First glyph is the '2' of the year: its top row covers font
        // columns 1-3, i.e. frame x 7..13 at y 5 with the default style.
        assert_eq!(out.inner[5 * 400 + 7], 0xC8);
        assert_eq!(out.inner[5 * 400 + 12], 0xC8);
        // Column 0 of the glyph keeps the simulated gradient (x + y + 1).
        assert_eq!(out.inner[5 * 400 + 5], 11);
        assert_eq!(out.inner.len(), 400 * 40);
    }

    #[test]
    fn test_metrics_follow_loop() {
        let driver = SimulatedDriver::new(sim(None));
        let config = CaptureConfig::default();
        let exit = ExitFlag::new();
        let registry = MetricsRegistry::new().unwrap();
        let mut ctx = CaptureContext::new(&config, exit.clone()).with_metrics(registry.clone());
        let mut out = StopAfter {
            inner: Vec::new(),
            frame_len: 64 * 48,
            frames: 4,
            exit,
        };

        run_session(&driver, &config, &mut out, false, &mut ctx).unwrap();

        let encoded = registry.encode().unwrap();
        assert!(encoded.contains("asi_frame_pipe_frames_total 4"));
        assert!(encoded.contains("asi_frame_pipe_gain 50"));
        assert_eq!(ctx.bytes_written(), 4 * 64 * 48);
    }
}

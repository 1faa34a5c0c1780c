//! Simulated camera for testing and dry runs.
//!
//! A frame clock thread marks frames as ready on a one-slot channel.
//! When the consumer is too slow the slot is still full and the frame
//! is counted as dropped, the same way the real camera behaves.

use super::camera::{
    BayerPattern, Camera, CameraDriver, CameraError, CameraInfo, ControlCaps, ControlKind,
    ControlValue, ErrorCode, RoiFormat, TriggerMode,
};
use super::SimulationConfig;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Driver exposing a single simulated camera.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    config: SimulationConfig,
    attached: bool,
    fail_open: Option<ErrorCode>,
    fail_after: Option<(u64, ErrorCode)>,
    stuck_mode: bool,
}

impl SimulatedDriver {
    /// Creates a driver with one attached camera.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            attached: true,
            fail_open: None,
            fail_after: None,
            stuck_mode: false,
        }
    }

    /// Reports no attached cameras.
    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    /// Makes opening the camera fail with `code`.
    pub fn with_open_failure(mut self, code: ErrorCode) -> Self {
        self.fail_open = Some(code);
        self
    }

    /// Makes frame fetches fail with `code` once `frames` frames were delivered.
    pub fn with_capture_failure(mut self, frames: u64, code: ErrorCode) -> Self {
        self.fail_after = Some((frames, code));
        self
    }

    /// Reports a trigger camera that ignores mode changes and stays in
    /// soft-edge trigger mode.
    pub fn with_stuck_trigger_mode(mut self) -> Self {
        self.config.trigger_modes = true;
        self.stuck_mode = true;
        self
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            name: "Simulated ASI Camera".to_owned(),
            id: 0,
            max_width: self.config.width,
            max_height: self.config.height,
            bayer: self.config.color.then_some(BayerPattern::Rg),
            is_trigger_cam: self.config.trigger_modes,
        }
    }
}

impl CameraDriver for SimulatedDriver {
    type Camera = SimulatedCamera;

    fn connected(&self) -> Result<Vec<CameraInfo>, CameraError> {
        Ok(if self.attached { vec![self.info()] } else { Vec::new() })
    }

    fn open(&self, info: &CameraInfo) -> Result<Self::Camera, CameraError> {
        if let Some(code) = self.fail_open {
            return Err(CameraError::OpenFailed {
                name: info.name.clone(),
                code,
            });
        }
        let mut camera = SimulatedCamera::new(info.clone(), self.config.fps);
        camera.fail_after = self.fail_after;
        if self.stuck_mode {
            camera.mode = TriggerMode::SoftEdge;
            camera.stuck_mode = true;
        }
        tracing::debug!(name = %info.name, "Simulated camera opened");
        Ok(camera)
    }
}

/// Running frame clock.
struct FrameClock {
    ready: Receiver<u64>,
    /// Dropping it wakes the clock thread.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Simulated camera generating a moving gradient.
pub struct SimulatedCamera {
    info: CameraInfo,
    controls: HashMap<ControlKind, ControlValue>,
    roi: Option<RoiFormat>,
    mode: TriggerMode,
    fps: Option<f64>,
    fail_after: Option<(u64, ErrorCode)>,
    stuck_mode: bool,
    delivered: u64,
    dropped: Arc<AtomicU64>,
    clock: Option<FrameClock>,
    open: bool,
}

impl SimulatedCamera {
    fn new(info: CameraInfo, fps: Option<f64>) -> Self {
        let mut controls = HashMap::new();
        controls.insert(ControlKind::Gain, ControlValue { value: 0, auto: false });
        controls.insert(ControlKind::Exposure, ControlValue { value: 10_000, auto: false });
        controls.insert(ControlKind::AutoMaxGain, ControlValue { value: 100, auto: false });
        controls.insert(ControlKind::Temperature, ControlValue { value: 215, auto: false });
        Self {
            info,
            controls,
            roi: None,
            mode: TriggerMode::Normal,
            fps,
            fail_after: None,
            stuck_mode: false,
            delivered: 0,
            dropped: Arc::new(AtomicU64::new(0)),
            clock: None,
            open: true,
        }
    }

    /// Active ROI, once configured.
    pub fn roi(&self) -> Option<RoiFormat> {
        self.roi
    }

    /// True while the frame clock runs.
    pub fn is_capturing(&self) -> bool {
        self.clock.is_some()
    }

    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::NotInitialized)
        }
    }

    fn fill(&self, buf: &mut [u8], sequence: u64) {
        let width = self.roi.map_or(self.info.max_width, |r| r.width).max(1) as usize;
        for (i, byte) in buf.iter_mut().enumerate() {
            let x = i % width;
            let y = i / width;
            *byte = ((x + y) as u64).wrapping_add(sequence) as u8;
        }
    }
}

impl Camera for SimulatedCamera {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn control_caps(&self) -> Result<Vec<ControlCaps>, CameraError> {
        self.ensure_open()?;
        let cap = |kind: ControlKind,
                   name: &str,
                   description: &str,
                   min: i64,
                   max: i64,
                   default: i64,
                   auto_supported: bool| {
            ControlCaps {
                name: name.to_owned(),
                description: description.to_owned(),
                min,
                max,
                default,
                auto_supported,
                writable: kind != ControlKind::Temperature,
                kind,
            }
        };
        Ok(vec![
            cap(ControlKind::Gain, "Gain", "Gain", 0, 100, 0, true),
            cap(ControlKind::Exposure, "Exposure", "Exposure Time(us)", 32, 2_000_000_000, 10_000, true),
            cap(ControlKind::AutoMaxGain, "AutoExpMaxGain", "Auto exposure maximum gain value", 0, 100, 50, false),
            cap(ControlKind::Temperature, "Temperature", "Sensor temperature(degrees Celsius)", -500, 1000, 20, false),
        ])
    }

    fn control(&self, kind: ControlKind) -> Result<ControlValue, CameraError> {
        self.ensure_open()?;
        self.controls.get(&kind).copied().ok_or(CameraError::Sdk {
            op: "ASIGetControlValue",
            code: ErrorCode::INVALID_CONTROL_TYPE,
        })
    }

    fn set_control(
        &mut self,
        kind: ControlKind,
        value: i64,
        auto: bool,
    ) -> Result<(), CameraError> {
        self.ensure_open()?;
        if !self.controls.contains_key(&kind) || kind == ControlKind::Temperature {
            return Err(CameraError::Sdk {
                op: "ASISetControlValue",
                code: ErrorCode::INVALID_CONTROL_TYPE,
            });
        }
        self.controls.insert(kind, ControlValue { value, auto });
        Ok(())
    }

    fn set_roi_format(&mut self, roi: &RoiFormat) -> Result<(), CameraError> {
        self.ensure_open()?;
        if roi.width == 0
            || roi.height == 0
            || roi.width > self.info.max_width
            || roi.height > self.info.max_height
        {
            return Err(CameraError::Sdk {
                op: "ASISetROIFormat",
                code: ErrorCode::INVALID_SIZE,
            });
        }
        self.roi = Some(*roi);
        Ok(())
    }

    fn trigger_mode(&self) -> Result<TriggerMode, CameraError> {
        self.ensure_open()?;
        Ok(self.mode)
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), CameraError> {
        self.ensure_open()?;
        if !self.info.is_trigger_cam && mode != TriggerMode::Normal {
            return Err(CameraError::Sdk {
                op: "ASISetCameraMode",
                code: ErrorCode::INVALID_MODE,
            });
        }
        if !self.stuck_mode {
            self.mode = mode;
        }
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        if self.roi.is_none() {
            return Err(CameraError::Sdk {
                op: "ASIStartVideoCapture",
                code: ErrorCode::INVALID_SEQUENCE,
            });
        }
        if self.clock.is_some() {
            return Err(CameraError::Sdk {
                op: "ASIStartVideoCapture",
                code: ErrorCode::VIDEO_MODE_ACTIVE,
            });
        }
        self.delivered = 0;
        self.dropped.store(0, Ordering::Relaxed);

        let Some(fps) = self.fps else {
            // Unlimited rate: frames are produced on demand in `next_frame`.
            return Ok(());
        };

        let (tx, rx) = bounded(1);
        let (stop, stopped) = bounded::<()>(0);
        let dropped = Arc::clone(&self.dropped);
        let ticker = crossbeam_channel::tick(Duration::from_secs_f64(1.0 / fps));
        let handle = std::thread::spawn(move || {
            let mut sequence = 0u64;
            loop {
                select! {
                    recv(ticker) -> _ => {
                        sequence += 1;
                        match tx.try_send(sequence) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }
                    recv(stopped) -> _ => break,
                }
            }
        });
        self.clock = Some(FrameClock {
            ready: rx,
            stop,
            handle,
        });
        Ok(())
    }

    fn next_frame(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), CameraError> {
        self.ensure_open()?;
        let roi = self.roi.ok_or(CameraError::NotCapturing)?;
        if buf.len() < roi.frame_len() {
            return Err(CameraError::Sdk {
                op: "ASIGetVideoData",
                code: ErrorCode::BUFFER_TOO_SMALL,
            });
        }
        if let Some((after, code)) = self.fail_after {
            if self.delivered >= after {
                return Err(CameraError::Sdk {
                    op: "ASIGetVideoData",
                    code,
                });
            }
        }

        let sequence = match &self.clock {
            Some(clock) => match clock.ready.recv_timeout(timeout) {
                Ok(sequence) => sequence,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CameraError::Sdk {
                        op: "ASIGetVideoData",
                        code: ErrorCode::TIMEOUT,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CameraError::NotCapturing),
            },
            None if self.fps.is_none() => self.delivered + 1,
            None => return Err(CameraError::NotCapturing),
        };

        self.fill(&mut buf[..roi.frame_len()], sequence);
        self.delivered += 1;
        Ok(())
    }

    fn dropped_frames(&self) -> Result<u64, CameraError> {
        self.ensure_open()?;
        Ok(self.dropped.load(Ordering::Relaxed))
    }

    fn stop_capture(&mut self) -> Result<(), CameraError> {
        if let Some(FrameClock {
            ready,
            stop,
            handle,
        }) = self.clock.take()
        {
            drop(stop);
            drop(ready);
            if handle.join().is_err() {
                tracing::warn!("Simulated frame clock panicked");
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        let _ = self.stop_capture();
        self.open = false;
        tracing::debug!("Simulated camera closed");
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn small_config(fps: Option<f64>) -> SimulationConfig {
        SimulationConfig {
            width: 16,
            height: 8,
            fps,
            ..Default::default()
        }
    }

    fn open(driver: &SimulatedDriver) -> SimulatedCamera {
        let info = driver.connected().unwrap().remove(0);
        driver.open(&info).unwrap()
    }

    #[test]
    fn test_simulated_camera_lifecycle() {
        let driver = SimulatedDriver::new(small_config(None));
        let mut camera = open(&driver);
        assert!(camera.is_open());

        let roi = RoiFormat::full_sensor(camera.info(), PixelFormat::Raw8);
        camera.set_roi_format(&roi).unwrap();
        camera.start_capture().unwrap();

        let mut buf = vec![0u8; roi.frame_len()];
        camera.next_frame(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(buf[1], 2);

        camera.stop_capture().unwrap();
        camera.close();
        assert!(!camera.is_open());
        assert!(matches!(
            camera.dropped_frames(),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_detached_driver_reports_nothing() {
        let driver = SimulatedDriver::new(small_config(None)).detached();
        assert!(driver.connected().unwrap().is_empty());
    }

    #[test]
    fn test_frame_clock_delivers_frames() {
        let driver = SimulatedDriver::new(small_config(Some(200.0)));
        let mut camera = open(&driver);
        let roi = RoiFormat::full_sensor(camera.info(), PixelFormat::Raw16);
        camera.set_roi_format(&roi).unwrap();
        camera.start_capture().unwrap();
        assert!(camera.is_capturing());

        let mut buf = vec![0u8; roi.frame_len()];
        for _ in 0..3 {
            camera.next_frame(&mut buf, Duration::from_millis(500)).unwrap();
        }

        camera.stop_capture().unwrap();
        assert!(!camera.is_capturing());
    }

    #[test]
    fn test_stop_does_not_wait_for_next_tick() {
        let driver = SimulatedDriver::new(small_config(Some(0.2)));
        let mut camera = open(&driver);
        let roi = RoiFormat::full_sensor(camera.info(), PixelFormat::Raw8);
        camera.set_roi_format(&roi).unwrap();
        camera.start_capture().unwrap();

        let started = std::time::Instant::now();
        camera.stop_capture().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!camera.is_capturing());
    }

    #[test]
    fn test_slow_consumer_counts_drops() {
        let driver = SimulatedDriver::new(small_config(Some(200.0)));
        let mut camera = open(&driver);
        let roi = RoiFormat::full_sensor(camera.info(), PixelFormat::Raw8);
        camera.set_roi_format(&roi).unwrap();
        camera.start_capture().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(camera.dropped_frames().unwrap() > 0);
    }

    #[test]
    fn test_injected_failure_carries_code() {
        let driver = SimulatedDriver::new(small_config(None))
            .with_capture_failure(1, ErrorCode::CAMERA_REMOVED);
        let mut camera = open(&driver);
        let roi = RoiFormat::full_sensor(camera.info(), PixelFormat::Raw8);
        camera.set_roi_format(&roi).unwrap();
        camera.start_capture().unwrap();

        let mut buf = vec![0u8; roi.frame_len()];
        camera.next_frame(&mut buf, Duration::from_millis(10)).unwrap();
        let err = camera
            .next_frame(&mut buf, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CAMERA_REMOVED));
    }

    #[test]
    fn test_rejects_oversized_roi() {
        let driver = SimulatedDriver::new(small_config(None));
        let mut camera = open(&driver);
        let roi = RoiFormat {
            width: 32,
            height: 8,
            bin: 1,
            format: PixelFormat::Raw8,
        };
        assert!(camera.set_roi_format(&roi).is_err());
    }
}

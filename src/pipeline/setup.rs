//! Device initialization.

use super::PipelineError;
use crate::capture::{
    Camera, CameraDriver, CameraError, CaptureConfig, ControlCaps, ControlKind, RoiFormat,
    TriggerMode,
};
use tracing::{info, warn};

/// Enumerates attached cameras and opens the first one.
pub fn open_first<D: CameraDriver>(driver: &D) -> Result<D::Camera, PipelineError> {
    let cameras = driver.connected()?;
    let Some(first) = cameras.first() else {
        return Err(CameraError::NoCamera.into());
    };

    info!(count = cameras.len(), "Attached cameras");
    for (index, camera) in cameras.iter().enumerate() {
        info!("\t{}: {}", index, camera.name);
    }

    Ok(driver.open(first)?)
}

/// Logs the camera's properties and every control it exposes.
pub fn describe<C: Camera>(camera: &C) -> Result<Vec<ControlCaps>, PipelineError> {
    let info = camera.info();
    info!("{} information", info.name);
    info!("\tResolution: {}x{}", info.max_width, info.max_height);
    match info.bayer {
        Some(pattern) => info!("\tColor camera: bayer pattern: {}", pattern),
        None => info!("\tMono camera"),
    }

    let caps = camera.control_caps()?;
    for cap in &caps {
        info!(
            "\t{} '{}' [{},{}] {}",
            cap.name,
            cap.description,
            cap.min,
            cap.max,
            if cap.auto_supported {
                "(Auto supported)"
            } else {
                "(Manual only)"
            }
        );
    }
    Ok(caps)
}

/// Applies exposure, gain, trigger mode and the full-sensor ROI.
///
/// Returns the ROI the frame buffer must be sized for.
pub fn configure<C: Camera>(
    camera: &mut C,
    config: &CaptureConfig,
) -> Result<RoiFormat, PipelineError> {
    camera.set_control(ControlKind::Exposure, config.exposure_us(), false)?;
    camera.set_control(ControlKind::Gain, i64::from(config.gain), config.auto_gain)?;
    camera.set_control(
        ControlKind::AutoMaxGain,
        i64::from(config.auto_max_gain),
        true,
    )?;
    tracing::debug!(
        exposure_ms = config.exposure_ms,
        gain = config.gain,
        auto_gain = config.auto_gain,
        auto_max_gain = config.auto_max_gain,
        "Controls applied"
    );

    if camera.info().is_trigger_cam {
        ensure_normal_mode(camera);
    }

    let roi = RoiFormat::full_sensor(camera.info(), config.pixel_format);
    camera.set_roi_format(&roi)?;
    info!(
        width = roi.width,
        height = roi.height,
        format = %roi.format,
        ffmpeg_pixel_format = roi.format.ffmpeg_name(),
        "Output format"
    );
    Ok(roi)
}

/// Forces continuous streaming on a multi-mode camera. Failure is only
/// logged; returns whether the camera reports normal mode afterwards.
pub fn ensure_normal_mode<C: Camera>(camera: &mut C) -> bool {
    let result = camera
        .set_trigger_mode(TriggerMode::Normal)
        .and_then(|()| camera.trigger_mode());
    match result {
        Ok(TriggerMode::Normal) => true,
        Ok(mode) => {
            warn!(?mode, "Set mode failed!");
            false
        }
        Err(e) => {
            warn!(error = %e, "Set mode failed!");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ErrorCode, PixelFormat, SimulatedDriver, SimulationConfig};

    fn sim() -> SimulationConfig {
        SimulationConfig {
            width: 32,
            height: 24,
            fps: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_camera_is_fatal() {
        let driver = SimulatedDriver::new(sim()).detached();
        let err = open_first(&driver).err().unwrap();
        assert!(matches!(err, PipelineError::Camera(CameraError::NoCamera)));
    }

    #[test]
    fn test_open_failure_hints_permissions() {
        let driver = SimulatedDriver::new(sim()).with_open_failure(ErrorCode::INVALID_ID);
        let err = open_first(&driver).err().unwrap();
        assert!(err.to_string().contains("are you root?"));
    }

    #[test]
    fn test_configure_applies_controls_and_roi() {
        let driver = SimulatedDriver::new(sim());
        let mut camera = open_first(&driver).unwrap();
        let config = CaptureConfig {
            exposure_ms: 100,
            gain: 70,
            auto_gain: true,
            pixel_format: PixelFormat::Raw16,
            ..Default::default()
        };

        let roi = configure(&mut camera, &config).unwrap();

        assert_eq!(roi.width, 32);
        assert_eq!(roi.height, 24);
        assert_eq!(roi.format, PixelFormat::Raw16);
        assert_eq!(camera.roi(), Some(roi));

        let exposure = camera.control(ControlKind::Exposure).unwrap();
        assert_eq!(exposure.value, 100_000);
        assert!(!exposure.auto);
        let gain = camera.control(ControlKind::Gain).unwrap();
        assert_eq!(gain.value, 70);
        assert!(gain.auto);
        let ceiling = camera.control(ControlKind::AutoMaxGain).unwrap();
        assert_eq!(ceiling.value, 80);
        assert!(ceiling.auto);
    }

    #[test]
    fn test_describe_lists_controls() {
        let driver = SimulatedDriver::new(SimulationConfig {
            color: true,
            ..sim()
        });
        let camera = open_first(&driver).unwrap();
        let caps = describe(&camera).unwrap();
        assert!(caps.iter().any(|c| c.kind == ControlKind::Temperature));
    }

    #[test]
    fn test_trigger_camera_forced_to_normal() {
        let driver = SimulatedDriver::new(SimulationConfig {
            trigger_modes: true,
            ..sim()
        });
        let mut camera = open_first(&driver).unwrap();
        camera.set_trigger_mode(TriggerMode::SoftEdge).unwrap();

        assert!(ensure_normal_mode(&mut camera));
        assert_eq!(camera.trigger_mode().unwrap(), TriggerMode::Normal);
    }

    #[test]
    fn test_stuck_trigger_mode_is_not_fatal() {
        let driver = SimulatedDriver::new(sim()).with_stuck_trigger_mode();
        let mut camera = open_first(&driver).unwrap();

        assert!(!ensure_normal_mode(&mut camera));
        assert!(configure(&mut camera, &CaptureConfig::default()).is_ok());
    }
}

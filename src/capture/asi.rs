//! ZWO ASI camera backend.
//!
//! `libASICamera2` is loaded at runtime so the binary builds and tests
//! without the vendor SDK installed. Set `ASI_LIB` to point at a
//! non-standard library location.

#![allow(unsafe_code)]

use super::camera::{
    BayerPattern, Camera, CameraDriver, CameraError, CameraInfo, ControlCaps, ControlKind,
    ControlValue, ErrorCode, RoiFormat, TriggerMode,
};
use super::PixelFormat;
use libloading::Library;
use std::ffi::{c_char, c_int, c_long, c_uchar};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding the SDK library path.
pub const LIBRARY_ENV: &str = "ASI_LIB";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libASICamera2.dylib";
#[cfg(not(target_os = "macos"))]
const DEFAULT_LIBRARY: &str = "libASICamera2.so";

const ASI_TRUE: c_int = 1;
const ASI_FALSE: c_int = 0;

/// `ASI_CAMERA_INFO`.
#[repr(C)]
#[allow(dead_code)]
struct RawCameraInfo {
    name: [c_char; 64],
    camera_id: c_int,
    max_height: c_long,
    max_width: c_long,
    is_color_cam: c_int,
    bayer_pattern: c_int,
    supported_bins: [c_int; 16],
    supported_video_format: [c_int; 8],
    pixel_size: f64,
    mechanical_shutter: c_int,
    st4_port: c_int,
    is_cooler_cam: c_int,
    is_usb3_host: c_int,
    is_usb3_camera: c_int,
    elec_per_adu: f32,
    bit_depth: c_int,
    is_trigger_cam: c_int,
    unused: [c_char; 16],
}

/// `ASI_CONTROL_CAPS`.
#[repr(C)]
#[allow(dead_code)]
struct RawControlCaps {
    name: [c_char; 64],
    description: [c_char; 128],
    max_value: c_long,
    min_value: c_long,
    default_value: c_long,
    is_auto_supported: c_int,
    is_writable: c_int,
    control_type: c_int,
    unused: [c_char; 32],
}

type CountFn = unsafe extern "C" fn() -> c_int;
type PropertyFn = unsafe extern "C" fn(*mut RawCameraInfo, c_int) -> c_int;
type IdFn = unsafe extern "C" fn(c_int) -> c_int;
type IdOutFn = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;
type ControlCapsFn = unsafe extern "C" fn(c_int, c_int, *mut RawControlCaps) -> c_int;
type GetControlFn = unsafe extern "C" fn(c_int, c_int, *mut c_long, *mut c_int) -> c_int;
type SetControlFn = unsafe extern "C" fn(c_int, c_int, c_long, c_int) -> c_int;
type RoiFormatFn = unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int) -> c_int;
type VideoDataFn = unsafe extern "C" fn(c_int, *mut c_uchar, c_long, c_int) -> c_int;
type SetModeFn = unsafe extern "C" fn(c_int, c_int) -> c_int;

/// Resolved SDK entry points. The function pointers stay valid for as
/// long as `_library` is loaded.
struct Api {
    num_cameras: CountFn,
    camera_property: PropertyFn,
    open_camera: IdFn,
    init_camera: IdFn,
    close_camera: IdFn,
    num_controls: IdOutFn,
    control_caps: ControlCapsFn,
    get_control: GetControlFn,
    set_control: SetControlFn,
    set_roi_format: RoiFormatFn,
    start_video: IdFn,
    stop_video: IdFn,
    video_data: VideoDataFn,
    dropped_frames: IdOutFn,
    set_mode: SetModeFn,
    get_mode: IdOutFn,
    _library: Library,
}

impl Api {
    fn load() -> Result<Self, CameraError> {
        let path = std::env::var_os(LIBRARY_ENV).unwrap_or_else(|| DEFAULT_LIBRARY.into());
        // SAFETY: loading the vendor library runs its initializers; nothing
        // else in the process depends on their side effects.
        let library = unsafe { Library::new(&path) }.map_err(|e| {
            CameraError::Library(format!("{}: {e}", path.to_string_lossy()))
        })?;

        /// Copies a symbol out of the library.
        ///
        /// SAFETY: `T` must match the C signature of `name`.
        unsafe fn sym<T: Copy>(library: &Library, name: &[u8]) -> Result<T, CameraError> {
            library
                .get::<T>(name)
                .map(|symbol| *symbol)
                .map_err(|e| CameraError::Library(e.to_string()))
        }

        // SAFETY: signatures follow ASICamera2.h.
        unsafe {
            let num_cameras = sym(&library, b"ASIGetNumOfConnectedCameras\0")?;
            let camera_property = sym(&library, b"ASIGetCameraProperty\0")?;
            let open_camera = sym(&library, b"ASIOpenCamera\0")?;
            let init_camera = sym(&library, b"ASIInitCamera\0")?;
            let close_camera = sym(&library, b"ASICloseCamera\0")?;
            let num_controls = sym(&library, b"ASIGetNumOfControls\0")?;
            let control_caps = sym(&library, b"ASIGetControlCaps\0")?;
            let get_control = sym(&library, b"ASIGetControlValue\0")?;
            let set_control = sym(&library, b"ASISetControlValue\0")?;
            let set_roi_format = sym(&library, b"ASISetROIFormat\0")?;
            let start_video = sym(&library, b"ASIStartVideoCapture\0")?;
            let stop_video = sym(&library, b"ASIStopVideoCapture\0")?;
            let video_data = sym(&library, b"ASIGetVideoData\0")?;
            let dropped_frames = sym(&library, b"ASIGetDroppedFrames\0")?;
            let set_mode = sym(&library, b"ASISetCameraMode\0")?;
            let get_mode = sym(&library, b"ASIGetCameraMode\0")?;

            Ok(Self {
                num_cameras,
                camera_property,
                open_camera,
                init_camera,
                close_camera,
                num_controls,
                control_caps,
                get_control,
                set_control,
                set_roi_format,
                start_video,
                stop_video,
                video_data,
                dropped_frames,
                set_mode,
                get_mode,
                _library: library,
            })
        }
    }
}

fn check(op: &'static str, code: c_int) -> Result<(), CameraError> {
    let code = ErrorCode(code);
    if code.is_success() {
        Ok(())
    } else {
        Err(CameraError::Sdk { op, code })
    }
}

/// Reads a NUL-terminated fixed-size C string field.
fn fixed_str(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn image_type(format: PixelFormat) -> c_int {
    match format {
        PixelFormat::Raw8 => 0,
        PixelFormat::Raw16 => 2,
    }
}

fn to_c_long(op: &'static str, value: i64) -> Result<c_long, CameraError> {
    c_long::try_from(value).map_err(|_| CameraError::Sdk {
        op,
        code: ErrorCode::OUTOF_BOUNDARY,
    })
}

fn to_c_int(op: &'static str, value: u32) -> Result<c_int, CameraError> {
    c_int::try_from(value).map_err(|_| CameraError::Sdk {
        op,
        code: ErrorCode::OUTOF_BOUNDARY,
    })
}

/// Driver backed by the vendor SDK.
#[derive(Clone)]
pub struct AsiDriver {
    api: Arc<Api>,
}

impl AsiDriver {
    /// Loads the SDK library.
    pub fn load() -> Result<Self, CameraError> {
        let api = Api::load()?;
        tracing::debug!("Loaded camera SDK");
        Ok(Self { api: Arc::new(api) })
    }
}

impl CameraDriver for AsiDriver {
    type Camera = AsiCamera;

    fn connected(&self) -> Result<Vec<CameraInfo>, CameraError> {
        // SAFETY: no arguments.
        let count = unsafe { (self.api.num_cameras)() };
        let mut cameras = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            // SAFETY: plain-old-data struct, filled by the SDK below.
            let mut raw: RawCameraInfo = unsafe { std::mem::zeroed() };
            // SAFETY: `raw` is a valid, writable ASI_CAMERA_INFO.
            check("ASIGetCameraProperty", unsafe {
                (self.api.camera_property)(&mut raw, index)
            })?;
            cameras.push(CameraInfo {
                name: fixed_str(&raw.name),
                id: raw.camera_id,
                max_width: u32::try_from(raw.max_width).unwrap_or(0),
                max_height: u32::try_from(raw.max_height).unwrap_or(0),
                bayer: if raw.is_color_cam != ASI_FALSE {
                    BayerPattern::from_raw(raw.bayer_pattern)
                } else {
                    None
                },
                is_trigger_cam: raw.is_trigger_cam != ASI_FALSE,
            });
        }
        Ok(cameras)
    }

    fn open(&self, info: &CameraInfo) -> Result<Self::Camera, CameraError> {
        // SAFETY: the id comes from ASIGetCameraProperty.
        let opened = unsafe { (self.api.open_camera)(info.id) };
        // SAFETY: as above; init is only valid after open succeeded.
        let code = if opened == 0 {
            unsafe { (self.api.init_camera)(info.id) }
        } else {
            opened
        };
        if code != 0 {
            return Err(CameraError::OpenFailed {
                name: info.name.clone(),
                code: ErrorCode(code),
            });
        }
        Ok(AsiCamera {
            api: Arc::clone(&self.api),
            info: info.clone(),
            capturing: false,
            open: true,
        })
    }
}

/// An opened ASI camera. Closed on drop.
pub struct AsiCamera {
    api: Arc<Api>,
    info: CameraInfo,
    capturing: bool,
    open: bool,
}

impl AsiCamera {
    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::NotInitialized)
        }
    }
}

impl Camera for AsiCamera {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn control_caps(&self) -> Result<Vec<ControlCaps>, CameraError> {
        self.ensure_open()?;
        let mut count: c_int = 0;
        // SAFETY: `count` is a valid out pointer.
        check("ASIGetNumOfControls", unsafe {
            (self.api.num_controls)(self.info.id, &mut count)
        })?;

        let mut caps = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            // SAFETY: plain-old-data struct, filled by the SDK below.
            let mut raw: RawControlCaps = unsafe { std::mem::zeroed() };
            // SAFETY: `raw` is a valid, writable ASI_CONTROL_CAPS.
            check("ASIGetControlCaps", unsafe {
                (self.api.control_caps)(self.info.id, index, &mut raw)
            })?;
            caps.push(ControlCaps {
                name: fixed_str(&raw.name),
                description: fixed_str(&raw.description),
                min: i64::from(raw.min_value),
                max: i64::from(raw.max_value),
                default: i64::from(raw.default_value),
                auto_supported: raw.is_auto_supported != ASI_FALSE,
                writable: raw.is_writable != ASI_FALSE,
                kind: ControlKind::from_raw(raw.control_type),
            });
        }
        Ok(caps)
    }

    fn control(&self, kind: ControlKind) -> Result<ControlValue, CameraError> {
        self.ensure_open()?;
        let mut value: c_long = 0;
        let mut auto: c_int = ASI_FALSE;
        // SAFETY: both out pointers are valid.
        check("ASIGetControlValue", unsafe {
            (self.api.get_control)(self.info.id, kind.as_raw(), &mut value, &mut auto)
        })?;
        Ok(ControlValue {
            value: i64::from(value),
            auto: auto != ASI_FALSE,
        })
    }

    fn set_control(
        &mut self,
        kind: ControlKind,
        value: i64,
        auto: bool,
    ) -> Result<(), CameraError> {
        self.ensure_open()?;
        let value = to_c_long("ASISetControlValue", value)?;
        let auto = if auto { ASI_TRUE } else { ASI_FALSE };
        // SAFETY: value arguments only.
        check("ASISetControlValue", unsafe {
            (self.api.set_control)(self.info.id, kind.as_raw(), value, auto)
        })
    }

    fn set_roi_format(&mut self, roi: &RoiFormat) -> Result<(), CameraError> {
        self.ensure_open()?;
        let op = "ASISetROIFormat";
        let (width, height, bin) = (
            to_c_int(op, roi.width)?,
            to_c_int(op, roi.height)?,
            to_c_int(op, roi.bin)?,
        );
        // SAFETY: value arguments only.
        check(op, unsafe {
            (self.api.set_roi_format)(self.info.id, width, height, bin, image_type(roi.format))
        })
    }

    fn trigger_mode(&self) -> Result<TriggerMode, CameraError> {
        self.ensure_open()?;
        let mut mode: c_int = 0;
        // SAFETY: `mode` is a valid out pointer.
        check("ASIGetCameraMode", unsafe {
            (self.api.get_mode)(self.info.id, &mut mode)
        })?;
        Ok(TriggerMode::from_raw(mode))
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), CameraError> {
        self.ensure_open()?;
        // SAFETY: value arguments only.
        check("ASISetCameraMode", unsafe {
            (self.api.set_mode)(self.info.id, mode.as_raw())
        })
    }

    fn start_capture(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        // SAFETY: value arguments only.
        check("ASIStartVideoCapture", unsafe {
            (self.api.start_video)(self.info.id)
        })?;
        self.capturing = true;
        Ok(())
    }

    fn next_frame(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), CameraError> {
        self.ensure_open()?;
        if !self.capturing {
            return Err(CameraError::NotCapturing);
        }
        let op = "ASIGetVideoData";
        let len = c_long::try_from(buf.len()).map_err(|_| CameraError::Sdk {
            op,
            code: ErrorCode::INVALID_SIZE,
        })?;
        let wait_ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
        // SAFETY: the SDK writes at most `len` bytes into `buf`.
        check(op, unsafe {
            (self.api.video_data)(self.info.id, buf.as_mut_ptr(), len, wait_ms)
        })
    }

    fn dropped_frames(&self) -> Result<u64, CameraError> {
        self.ensure_open()?;
        let mut dropped: c_int = 0;
        // SAFETY: `dropped` is a valid out pointer.
        check("ASIGetDroppedFrames", unsafe {
            (self.api.dropped_frames)(self.info.id, &mut dropped)
        })?;
        Ok(u64::try_from(dropped).unwrap_or(0))
    }

    fn stop_capture(&mut self) -> Result<(), CameraError> {
        if !self.open || !self.capturing {
            return Ok(());
        }
        self.capturing = false;
        // SAFETY: value arguments only.
        check("ASIStopVideoCapture", unsafe {
            (self.api.stop_video)(self.info.id)
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.stop_capture() {
            tracing::warn!(error = %e, "Failed to stop capture before close");
        }
        self.open = false;
        // SAFETY: the camera was opened by this handle and is closed once.
        let code = ErrorCode(unsafe { (self.api.close_camera)(self.info.id) });
        if !code.is_success() {
            tracing::warn!(%code, "ASICloseCamera() failed");
        }
        tracing::debug!(name = %self.info.name, "Camera closed");
    }
}

impl Drop for AsiCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"ASI120MM\0junk".iter()) {
            *dst = *src as c_char;
        }
        assert_eq!(fixed_str(&raw), "ASI120MM");
    }

    #[test]
    fn test_image_type_mapping() {
        assert_eq!(image_type(PixelFormat::Raw8), 0);
        assert_eq!(image_type(PixelFormat::Raw16), 2);
    }

    #[test]
    fn test_missing_library_reports_path() {
        std::env::set_var(LIBRARY_ENV, "/nonexistent/libASICamera2.so");
        let err = AsiDriver::load().err().unwrap();
        std::env::remove_var(LIBRARY_ENV);
        assert!(matches!(err, CameraError::Library(ref msg) if msg.contains("/nonexistent")));
    }
}

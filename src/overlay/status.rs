//! Per-frame diagnostic line.

use chrono::{DateTime, Utc};

/// Values stamped onto each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStatus {
    /// Wall-clock capture time.
    pub timestamp: DateTime<Utc>,
    /// Gain as reported by the camera.
    pub gain: i64,
    /// Exposure as reported by the camera, in microseconds.
    pub exposure_us: i64,
    /// Frames captured so far, including this one.
    pub frame: u64,
    /// Frames the camera dropped so far.
    pub dropped: u64,
    /// Sensor temperature in tenths of a degree Celsius.
    pub temperature_tenths: i64,
}

impl FrameStatus {
    /// Sensor temperature in degrees Celsius.
    pub fn temperature_celsius(&self) -> f64 {
        self.temperature_tenths as f64 / 10.0
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Gain:{} Exp:{}ms Frame:{} Dropped:{} Temp:{:.0}C",
            self.timestamp.format("%Y%m%d %H%M%SZ"),
            self.gain,
            self.exposure_us / 1000,
            self.frame,
            self.dropped,
            self.temperature_celsius(),
        )
    }
}

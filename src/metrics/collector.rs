//! Metrics collection and registry.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of capture state for metrics update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Frames written to the output.
    pub frames: u64,
    /// Frames the camera reported as dropped.
    pub dropped: u64,
    /// Current gain.
    pub gain: i64,
    /// Current exposure in microseconds.
    pub exposure_us: i64,
    /// Sensor temperature in degrees Celsius.
    pub temperature_celsius: f64,
    /// Total bytes written to the output.
    pub bytes_written: u64,
}

/// Prometheus metrics registry for capture monitoring.
///
/// Cloning shares the underlying metrics, so one handle can be updated
/// from the capture loop while another is served over HTTP.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    frames_total: IntCounter,
    dropped_frames: IntGauge,
    bytes_written_total: IntCounter,

    gain: IntGauge,
    exposure_seconds: Gauge,
    sensor_temperature: Gauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_total = IntCounter::new(
            "asi_frame_pipe_frames_total",
            "Total number of frames written to the output",
        )?;
        let dropped_frames = IntGauge::new(
            "asi_frame_pipe_dropped_frames",
            "Frames dropped by the camera since capture started",
        )?;
        let bytes_written_total = IntCounter::new(
            "asi_frame_pipe_bytes_written_total",
            "Total bytes of raw video written to the output",
        )?;

        let gain = IntGauge::new("asi_frame_pipe_gain", "Current camera gain")?;
        let exposure_seconds = Gauge::new(
            "asi_frame_pipe_exposure_seconds",
            "Current exposure time in seconds",
        )?;
        let sensor_temperature = Gauge::new(
            "asi_frame_pipe_sensor_temperature_celsius",
            "Sensor temperature in degrees Celsius",
        )?;

        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(dropped_frames.clone()))?;
        registry.register(Box::new(bytes_written_total.clone()))?;
        registry.register(Box::new(gain.clone()))?;
        registry.register(Box::new(exposure_seconds.clone()))?;
        registry.register(Box::new(sensor_temperature.clone()))?;

        Ok(Self {
            registry,
            frames_total,
            dropped_frames,
            bytes_written_total,
            gain,
            exposure_seconds,
            sensor_temperature,
        })
    }

    /// Updates all metrics from a snapshot of capture state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Counters only move forward; apply the delta since the last update.
        let current_frames = self.frames_total.get();
        if snapshot.frames > current_frames {
            self.frames_total.inc_by(snapshot.frames - current_frames);
        }
        let current_bytes = self.bytes_written_total.get();
        if snapshot.bytes_written > current_bytes {
            self.bytes_written_total
                .inc_by(snapshot.bytes_written - current_bytes);
        }

        self.dropped_frames
            .set(i64::try_from(snapshot.dropped).unwrap_or(i64::MAX));
        self.gain.set(snapshot.gain);
        self.exposure_seconds
            .set(snapshot.exposure_us as f64 / 1_000_000.0);
        self.sensor_temperature.set(snapshot.temperature_celsius);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the loop counters and the latest status line.
    pub fn from_status(status: &crate::overlay::FrameStatus, bytes_written: u64) -> Self {
        Self {
            frames: status.frame,
            dropped: status.dropped,
            gain: status.gain,
            exposure_us: status.exposure_us,
            temperature_celsius: status.temperature_celsius(),
            bytes_written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            frames: 5,
            dropped: 1,
            gain: 70,
            exposure_us: 100_000,
            temperature_celsius: 23.4,
            bytes_written: 5 * 1024,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("asi_frame_pipe_frames_total 5"));
        assert!(output.contains("asi_frame_pipe_dropped_frames 1"));
        assert!(output.contains("asi_frame_pipe_gain 70"));
        assert!(output.contains("asi_frame_pipe_exposure_seconds 0.1"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames: 4,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("asi_frame_pipe_frames_total 10"));
    }

    #[test]
    fn test_clone_shares_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        let served = registry.clone();
        registry.update(&MetricsSnapshot {
            frames: 3,
            ..Default::default()
        });
        assert!(served.encode().unwrap().contains("asi_frame_pipe_frames_total 3"));
    }
}

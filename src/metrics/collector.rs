//! Metrics collection and registry.

use crate::capture::{CaptureState, CaptureStats};
use crate::presenter::Presenter;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of pipeline state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the capture source is running.
    pub running: bool,
    /// Buffers read from the device.
    pub frames_captured: u64,
    /// Frames handed to the slot.
    pub frames_published: u64,
    /// Buffers dropped because conversion failed.
    pub frames_dropped: u64,
    /// Transient stream read errors.
    pub stream_errors: u64,
    /// Distinct frames the presenter picked up.
    pub frames_presented: u64,
    /// Current display rotation in degrees.
    pub rotation_degrees: u16,
}

/// Prometheus metrics registry for the capture pipeline.
pub struct MetricsRegistry {
    registry: Registry,

    capture_running: IntGauge,
    frames_captured: IntCounter,
    frames_published: IntCounter,
    frames_dropped: IntCounter,
    stream_errors: IntCounter,

    frames_presented: IntCounter,
    rotation_degrees: IntGauge,
}

/// Advances a counter to an absolute total; totals never move backwards.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all pipeline metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let capture_running = IntGauge::new(
            "mirror_cam_capture_running",
            "Capture source state (1=running, 0=stopped)",
        )?;
        let frames_captured = IntCounter::new(
            "mirror_cam_frames_captured_total",
            "Total buffers read from the camera device",
        )?;
        let frames_published = IntCounter::new(
            "mirror_cam_frames_published_total",
            "Total converted frames published to the frame slot",
        )?;
        let frames_dropped = IntCounter::new(
            "mirror_cam_frames_dropped_total",
            "Total buffers dropped because pixel conversion failed",
        )?;
        let stream_errors = IntCounter::new(
            "mirror_cam_stream_errors_total",
            "Total transient stream read errors",
        )?;
        let frames_presented = IntCounter::new(
            "mirror_cam_frames_presented_total",
            "Total distinct frames picked up by the presenter",
        )?;
        let rotation_degrees = IntGauge::new(
            "mirror_cam_display_rotation_degrees",
            "Current display rotation before mirroring",
        )?;

        registry.register(Box::new(capture_running.clone()))?;
        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(frames_published.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(stream_errors.clone()))?;
        registry.register(Box::new(frames_presented.clone()))?;
        registry.register(Box::new(rotation_degrees.clone()))?;

        Ok(Self {
            registry,
            capture_running,
            frames_captured,
            frames_published,
            frames_dropped,
            stream_errors,
            frames_presented,
            rotation_degrees,
        })
    }

    /// Updates all metrics from a snapshot of pipeline state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.capture_running.set(i64::from(snapshot.running));

        advance(&self.frames_captured, snapshot.frames_captured);
        advance(&self.frames_published, snapshot.frames_published);
        advance(&self.frames_dropped, snapshot.frames_dropped);
        advance(&self.stream_errors, snapshot.stream_errors);
        advance(&self.frames_presented, snapshot.frames_presented);

        self.rotation_degrees.set(i64::from(snapshot.rotation_degrees));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
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
    /// Creates a snapshot from the capture source and presenter.
    pub fn from_components(
        state: CaptureState,
        stats: &CaptureStats,
        presenter: &Presenter,
    ) -> Self {
        Self {
            running: matches!(state, CaptureState::Running | CaptureState::Reconfiguring),
            frames_captured: stats.frames_captured,
            frames_published: stats.frames_published,
            frames_dropped: stats.frames_dropped,
            stream_errors: stats.stream_errors,
            frames_presented: presenter.frames_presented(),
            rotation_degrees: presenter.orientation().rotation_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{DeviceOrientation, FrameSlot, PresenterConfig};

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            running: true,
            frames_captured: 10,
            frames_published: 8,
            frames_dropped: 2,
            stream_errors: 0,
            frames_presented: 5,
            rotation_degrees: 90,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("mirror_cam_capture_running 1"));
        assert!(output.contains("mirror_cam_frames_published_total 8"));
        assert!(output.contains("mirror_cam_frames_dropped_total 2"));
        assert!(output.contains("mirror_cam_display_rotation_degrees 90"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames_captured: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_captured: 4,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("mirror_cam_frames_captured_total 10"));
    }

    #[test]
    fn test_snapshot_from_components() {
        let slot = FrameSlot::new();
        let mut presenter = crate::presenter::Presenter::new(&slot, &PresenterConfig::default());
        presenter.on_orientation_changed(DeviceOrientation::LandscapeLeft);

        let stats = CaptureStats {
            frames_captured: 3,
            frames_published: 3,
            ..Default::default()
        };
        let snapshot = MetricsSnapshot::from_components(CaptureState::Running, &stats, &presenter);
        assert!(snapshot.running);
        assert_eq!(snapshot.frames_published, 3);
        assert_eq!(snapshot.rotation_degrees, 270);
    }
}

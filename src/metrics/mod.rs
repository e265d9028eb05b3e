//! Prometheus metrics for the capture pipeline.
//!
//! # Metrics Exposed
//!
//! - `mirror_cam_capture_running` - 1 while the capture source is running
//! - `mirror_cam_frames_captured_total` - Buffers read from the device
//! - `mirror_cam_frames_published_total` - Frames published to the slot
//! - `mirror_cam_frames_dropped_total` - Buffers dropped on conversion failure
//! - `mirror_cam_stream_errors_total` - Transient stream read errors
//! - `mirror_cam_frames_presented_total` - Distinct frames picked up by the presenter
//! - `mirror_cam_display_rotation_degrees` - Current display rotation
//!
//! # Example
//!
//! ```no_run
//! use mirror_cam::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     running: true,
//!     frames_captured: 120,
//!     frames_published: 118,
//!     frames_dropped: 2,
//!     stream_errors: 0,
//!     frames_presented: 60,
//!     rotation_degrees: 0,
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};

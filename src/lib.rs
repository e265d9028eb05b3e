//! Mirror Cam
//!
//! A camera frame pipeline: a capture source pulls raw sensor buffers off a
//! background thread, converts them to displayable RGBA frames and
//! publishes them to a single-slot store that a renderer reads at its own
//! pace, with a mirrored display orientation and an aspect-preserving
//! display scale.
//!
//! # Architecture
//!
//! ```text
//! device → CaptureSource (capture thread) → FrameSlot → Presenter (render thread)
//!                 ↑                                          ↑
//!          reconfigure()                         on_orientation_changed()
//! ```
//!
//! # Design Principles
//!
//! - **Latest frame only**: the slot holds one frame; older frames are
//!   replaced, never queued
//! - **Capture never waits on rendering**: publishing does not block
//! - **Bad buffers are dropped**: a failed conversion skips that buffer only
//! - **Configuration is transactional**: focus/exposure changes are checked
//!   before the device is touched and rolled back if the device fails
//!
//! # Example
//!
//! ```no_run
//! use mirror_cam::{
//!     capture::{CaptureConfig, CaptureSource, MockProvider, StaticPermissions},
//!     presenter::{DeviceOrientation, FrameSlot, Presenter, PresenterConfig, Viewport},
//! };
//! use std::sync::Arc;
//!
//! let slot = FrameSlot::new();
//! let source = CaptureSource::new(
//!     Arc::new(MockProvider::new()),
//!     Arc::new(StaticPermissions::granted()),
//!     slot.clone(),
//! );
//! source.start(CaptureConfig::default()).unwrap();
//!
//! let mut presenter = Presenter::new(&slot, &PresenterConfig::default());
//! presenter.on_orientation_changed(DeviceOrientation::LandscapeRight);
//!
//! if let Some(plan) = presenter.render_plan(Viewport::new(390.0, 844.0)) {
//!     println!("frame {} at scale {:.2}", plan.frame.sequence(), plan.scale);
//! }
//!
//! source.stop();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod metrics;
pub mod presenter;

// Re-export commonly used types at crate root
pub use capture::{CaptureConfig, CaptureError, CaptureSource, CaptureState, Frame};
pub use presenter::{DeviceOrientation, FrameSlot, ImageOrientation, Presenter, Viewport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

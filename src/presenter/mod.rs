//! Frame sink and presentation.
//!
//! The capture thread publishes into a [`FrameSlot`]; the render thread
//! reads it through a [`Presenter`], which also tracks the mirrored display
//! orientation and computes the display scale.

mod orientation;
mod scale;
mod slot;
mod state;

pub use orientation::{DeviceOrientation, ImageOrientation};
pub use scale::{display_scale, Viewport};
pub use slot::{FrameSlot, FrameSubscription};
pub use state::{PresentationState, Presenter, RenderPlan};

use crate::capture::ConfigError;
use serde::{Deserialize, Serialize};

/// Presenter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Pixels per point on the display.
    pub device_scale: f64,
    /// Viewport width in points.
    pub viewport_width: f64,
    /// Viewport height in points.
    pub viewport_height: f64,
    /// Render refresh rate.
    pub refresh_hz: u32,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            device_scale: 1.0,
            viewport_width: 390.0,
            viewport_height: 844.0,
            refresh_hz: 60,
        }
    }
}

impl PresenterConfig {
    /// The configured drawable area.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_width, self.viewport_height)
    }

    /// Checks scale, viewport and refresh rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.device_scale.is_finite() || self.device_scale <= 0.0 {
            return Err(ConfigError::InvalidDeviceScale(self.device_scale));
        }
        if self.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.refresh_hz == 0 || self.refresh_hz > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

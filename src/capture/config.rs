//! Camera capture configuration.
//!
//! Device selection, stream hints and the focus/exposure settings that are
//! applied to the active device under its configuration lock.

use crate::presenter::PresenterConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Which side of the handset the camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPosition {
    /// User-facing camera.
    Front,
    /// World-facing camera.
    Back,
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => f.write_str("front"),
            Self::Back => f.write_str("back"),
        }
    }
}

/// Orientation the capture connection rotates buffers into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    /// Home button or bottom edge down.
    Portrait,
    /// Rotated 180 degrees from portrait.
    PortraitUpsideDown,
    /// Rotated so the right edge is up.
    LandscapeRight,
    /// Rotated so the left edge is up.
    LandscapeLeft,
}

/// Focus behaviour of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    /// Focus once, then hold.
    AutoOnce,
    /// Keep refocusing as the scene changes.
    Continuous,
    /// Lens position fixed.
    Locked,
}

/// Exposure behaviour of the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExposureMode {
    /// Meter once, then hold.
    AutoOnce,
    /// Keep metering as the scene changes.
    ContinuousAuto,
    /// Hold the current exposure.
    Locked,
    /// Manual sensor sensitivity.
    Custom {
        /// Sensor gain as an ISO value.
        iso: f32,
    },
}

impl ExposureMode {
    /// Returns the capability kind this mode requires.
    pub fn kind(&self) -> ExposureKind {
        match self {
            Self::AutoOnce => ExposureKind::AutoOnce,
            Self::ContinuousAuto => ExposureKind::ContinuousAuto,
            Self::Locked => ExposureKind::Locked,
            Self::Custom { .. } => ExposureKind::Custom,
        }
    }

    /// Returns true for the two metering modes.
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::AutoOnce | Self::ContinuousAuto)
    }
}

/// Exposure mode without its parameters, as advertised by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureKind {
    /// See [`ExposureMode::AutoOnce`].
    AutoOnce,
    /// See [`ExposureMode::ContinuousAuto`].
    ContinuousAuto,
    /// See [`ExposureMode::Locked`].
    Locked,
    /// See [`ExposureMode::Custom`].
    Custom,
}

/// Focus and exposure as applied to a device in one configuration pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Autofocus behaviour.
    pub focus: FocusMode,
    /// Exposure behaviour.
    pub exposure: ExposureMode,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            focus: FocusMode::Continuous,
            exposure: ExposureMode::ContinuousAuto,
        }
    }
}

/// Configuration for camera capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera to select.
    pub position: CameraPosition,
    /// Orientation requested from the capture connection.
    pub orientation: VideoOrientation,
    /// Focus mode applied at start and on reconfigure.
    pub focus: FocusMode,
    /// Exposure mode applied at start and on reconfigure.
    pub exposure: ExposureMode,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let settings = DeviceSettings::default();
        Self {
            position: CameraPosition::Front,
            orientation: VideoOrientation::Portrait,
            focus: settings.focus,
            exposure: settings.exposure,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// The focus/exposure part of this configuration.
    pub fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            focus: self.focus,
            exposure: self.exposure,
        }
    }

    /// Replaces the focus/exposure part of this configuration.
    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.focus = settings.focus;
        self.exposure = settings.exposure;
        self
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if let ExposureMode::Custom { iso } = self.exposure {
            if !iso.is_finite() || iso <= 0.0 {
                return Err(ConfigError::InvalidIso(iso));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A width, height or viewport side is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame or refresh rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Manual ISO that is not a positive finite number.
    #[error("invalid ISO value: {0}")]
    InvalidIso(f32),
    /// Device scale that is not a positive finite number.
    #[error("invalid device scale: {0}")]
    InvalidDeviceScale(f64),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]` section.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[presenter]` section.
    #[serde(default)]
    pub presenter: PresenterConfig,
    /// `[output]` section.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration for the command-line runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Run until interrupted (true) or for a fixed number of rendered frames.
    pub continuous: bool,
    /// Number of render ticks if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 120,
            metrics_port: 0,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.presenter.validate()?;
        Ok(config)
    }
}

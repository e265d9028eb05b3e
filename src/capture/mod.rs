//! Camera input and frame handling.
//!
//! This module provides the device abstraction, the pixel conversion from
//! raw sensor buffers to displayable frames, and the [`CaptureSource`] that
//! drives a device on a background thread and publishes every converted
//! frame to a [`FrameSlot`](crate::presenter::FrameSlot).

mod config;
mod convert;
mod device;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod native;
mod permission;
mod source;

pub use config::{
    CameraPosition, CaptureConfig, ConfigError, DeviceSettings, ExposureKind, ExposureMode,
    FileConfig, FocusMode, OutputConfig, VideoOrientation,
};
pub use convert::{convert, to_rgba, ConversionError, PixelFormat, RawBuffer};
pub use device::{
    CameraDevice, ConfigurationLock, DeviceCapabilities, DeviceError, DeviceInfo, DeviceProvider,
    FrameStream, IsoRange, ReadFailures,
};
pub use frame::Frame;
pub use mock::{MockDevice, MockProvider};
#[cfg(feature = "camera")]
pub use native::NativeProvider;
pub use permission::{
    DeferredPermissions, PermissionCallback, PermissionService, PermissionStatus,
    StaticPermissions,
};
pub use source::{CaptureError, CaptureSource, CaptureState, CaptureStats};

//! Camera device abstraction.
//!
//! A `DeviceProvider` enumerates and opens devices. An opened `CameraDevice`
//! exposes its capabilities, an exclusive configuration lock and the
//! focus/exposure setters, and hands out a `FrameStream` that delivers raw
//! buffers to the capture loop. Backends implement these traits per platform.

use super::config::{CameraPosition, DeviceSettings, ExposureKind, ExposureMode, FocusMode};
use super::convert::RawBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a device backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The device or its stream could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),
    /// Another client holds the configuration lock.
    #[error("configuration lock unavailable: {0}")]
    LockUnavailable(String),
    /// A setter was called without the configuration lock.
    #[error("configuration change without holding the configuration lock")]
    NotLocked,
    /// The device refused a setting.
    #[error("device rejected setting: {0}")]
    Rejected(String),
    /// A transient read failure.
    #[error("failed to read buffer: {0}")]
    Stream(String),
    /// The device is gone; the stream will not recover.
    #[error("device disconnected")]
    Disconnected,
}

/// Identity of a camera device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Backend-specific identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Which way the camera faces.
    pub position: CameraPosition,
}

/// Inclusive range of supported ISO values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsoRange {
    /// Lowest supported ISO.
    pub min: f32,
    /// Highest supported ISO.
    pub max: f32,
}

impl IsoRange {
    /// Whether `iso` lies within the range, bounds included.
    pub fn contains(&self, iso: f32) -> bool {
        iso >= self.min && iso <= self.max
    }
}

/// Focus and exposure modes a device supports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Supported focus modes.
    pub focus_modes: Vec<FocusMode>,
    /// Supported exposure kinds.
    pub exposure_modes: Vec<ExposureKind>,
    /// Present when the device supports manual ISO.
    pub iso_range: Option<IsoRange>,
}

impl DeviceCapabilities {
    /// Whether the device offers `mode`.
    pub fn supports_focus(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    /// Checks the exposure kind and, for manual ISO, the value range.
    pub fn supports_exposure(&self, mode: &ExposureMode) -> bool {
        if !self.exposure_modes.contains(&mode.kind()) {
            return false;
        }
        match mode {
            ExposureMode::Custom { iso } => self.iso_range.is_some_and(|r| r.contains(*iso)),
            _ => true,
        }
    }

    /// Describes why `settings` cannot be applied, or `None` if it can.
    pub fn unsupported_reason(&self, settings: &DeviceSettings) -> Option<String> {
        if !self.supports_focus(settings.focus) {
            return Some(format!("focus mode {:?} not supported", settings.focus));
        }
        if !self.supports_exposure(&settings.exposure) {
            return Some(match (settings.exposure, self.iso_range) {
                (ExposureMode::Custom { iso }, Some(range)) => format!(
                    "ISO {iso} outside supported range {}..={}",
                    range.min, range.max
                ),
                (mode, _) => format!("exposure mode {mode:?} not supported"),
            });
        }
        None
    }
}

/// Enumerates and opens camera devices.
pub trait DeviceProvider: Send + Sync {
    /// Lists the devices currently attached.
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Opens a device for exclusive use.
    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice>, DeviceError>;
}

/// An opened camera device.
///
/// Setters must only be called while the configuration lock is held;
/// use [`ConfigurationLock`] rather than calling `lock_for_configuration`
/// directly.
pub trait CameraDevice: Send + Sync {
    /// Identity of the device.
    fn info(&self) -> &DeviceInfo;

    /// Modes and ranges the device supports.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Focus and exposure currently in effect.
    fn settings(&self) -> DeviceSettings;

    /// Takes the exclusive configuration lock. Prefer [`ConfigurationLock`].
    fn lock_for_configuration(&self) -> Result<(), DeviceError>;

    /// Releases the configuration lock.
    fn unlock_for_configuration(&self);

    /// Sets the focus mode. Requires the configuration lock.
    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), DeviceError>;

    /// Sets the exposure mode. Requires the configuration lock.
    fn set_exposure_mode(&self, mode: ExposureMode) -> Result<(), DeviceError>;

    /// Starts streaming. Called on the capture thread; the stream never
    /// leaves it.
    fn open_stream(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameStream>, DeviceError>;
}

/// Source of raw buffers for one streaming session.
pub trait FrameStream {
    /// Blocks until the next buffer is available.
    ///
    /// `DeviceError::Disconnected` ends the session; other errors are
    /// transient.
    fn next_buffer(&mut self) -> Result<RawBuffer, DeviceError>;
}

/// Escalates a run of consecutive read failures to a disconnect.
///
/// Backends that cannot tell an unplugged device from a dropped buffer feed
/// every read result through this so a dead device ends the session.
#[derive(Debug, Clone)]
pub struct ReadFailures {
    consecutive: u32,
    limit: u32,
}

impl ReadFailures {
    /// Consecutive failures tolerated before reporting a disconnect.
    pub const DEFAULT_LIMIT: u32 = 30;

    /// Creates a tracker that reports a disconnect on the `limit`-th
    /// consecutive failure. A limit of zero is treated as one.
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit: limit.max(1),
        }
    }

    /// Records a successful read.
    pub fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    /// Records a failed read and returns the error to report for it.
    pub fn failed(&mut self, reason: impl Into<String>) -> DeviceError {
        self.consecutive = self.consecutive.saturating_add(1);
        let reason = reason.into();
        if self.consecutive >= self.limit {
            tracing::warn!(
                failures = self.consecutive,
                last_error = %reason,
                "Treating repeated read failures as a disconnect"
            );
            DeviceError::Disconnected
        } else {
            DeviceError::Stream(reason)
        }
    }

    /// Failures since the last successful read.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

impl Default for ReadFailures {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

/// Holds a device's configuration lock; unlocks on drop.
pub struct ConfigurationLock<'a> {
    device: &'a dyn CameraDevice,
}

impl<'a> ConfigurationLock<'a> {
    /// Locks `device` for configuration.
    pub fn acquire(device: &'a dyn CameraDevice) -> Result<Self, DeviceError> {
        device.lock_for_configuration()?;
        tracing::trace!(device = %device.info().name, "Configuration lock acquired");
        Ok(Self { device })
    }

    /// Applies focus then exposure. On failure, restores `previous` and
    /// returns the original error.
    pub fn apply(
        &self,
        settings: &DeviceSettings,
        previous: &DeviceSettings,
    ) -> Result<(), DeviceError> {
        let result = self
            .device
            .set_focus_mode(settings.focus)
            .and_then(|()| self.device.set_exposure_mode(settings.exposure));

        if let Err(e) = result {
            let restored = self
                .device
                .set_focus_mode(previous.focus)
                .and_then(|()| self.device.set_exposure_mode(previous.exposure));
            if let Err(restore_err) = restored {
                tracing::error!(
                    error = %restore_err,
                    "Failed to restore previous device settings"
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        tracing::trace!(device = %self.device.info().name, "Configuration lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities {
            focus_modes: vec![FocusMode::Continuous, FocusMode::AutoOnce],
            exposure_modes: vec![ExposureKind::ContinuousAuto, ExposureKind::Custom],
            iso_range: Some(IsoRange {
                min: 50.0,
                max: 1600.0,
            }),
        }
    }

    /// Fails every read until `healthy` is set.
    struct FailingStream {
        failures: ReadFailures,
        healthy: bool,
    }

    impl FrameStream for FailingStream {
        fn next_buffer(&mut self) -> Result<RawBuffer, DeviceError> {
            if self.healthy {
                self.failures.succeeded();
                Ok(RawBuffer::new(vec![0; 4], 1, 1, PixelFormat::Bgra32))
            } else {
                Err(self.failures.failed("timed out"))
            }
        }
    }

    #[test]
    fn test_repeated_read_failures_become_disconnect() {
        let mut stream = FailingStream {
            failures: ReadFailures::new(3),
            healthy: false,
        };
        assert_eq!(
            stream.next_buffer(),
            Err(DeviceError::Stream("timed out".to_string()))
        );
        assert!(matches!(stream.next_buffer(), Err(DeviceError::Stream(_))));
        assert_eq!(stream.next_buffer(), Err(DeviceError::Disconnected));
    }

    #[test]
    fn test_successful_read_resets_failure_run() {
        let mut stream = FailingStream {
            failures: ReadFailures::new(2),
            healthy: false,
        };
        assert!(matches!(stream.next_buffer(), Err(DeviceError::Stream(_))));

        stream.healthy = true;
        assert!(stream.next_buffer().is_ok());
        assert_eq!(stream.failures.consecutive(), 0);

        stream.healthy = false;
        assert!(matches!(stream.next_buffer(), Err(DeviceError::Stream(_))));
        assert_eq!(stream.next_buffer(), Err(DeviceError::Disconnected));
    }

    #[test]
    fn test_zero_limit_disconnects_on_first_failure() {
        let mut failures = ReadFailures::new(0);
        assert_eq!(failures.failed("gone"), DeviceError::Disconnected);
    }

    #[test]
    fn test_supported_settings() {
        let settings = DeviceSettings {
            focus: FocusMode::AutoOnce,
            exposure: ExposureMode::Custom { iso: 800.0 },
        };
        assert_eq!(caps().unsupported_reason(&settings), None);
    }

    #[test]
    fn test_unsupported_focus() {
        let settings = DeviceSettings {
            focus: FocusMode::Locked,
            exposure: ExposureMode::ContinuousAuto,
        };
        let reason = caps().unsupported_reason(&settings).unwrap();
        assert!(reason.contains("Locked"));
    }

    #[test]
    fn test_iso_out_of_range() {
        let settings = DeviceSettings {
            focus: FocusMode::Continuous,
            exposure: ExposureMode::Custom { iso: 3200.0 },
        };
        let reason = caps().unsupported_reason(&settings).unwrap();
        assert!(reason.contains("3200"));
    }

    #[test]
    fn test_custom_without_range_unsupported() {
        let mut caps = caps();
        caps.iso_range = None;
        assert!(!caps.supports_exposure(&ExposureMode::Custom { iso: 100.0 }));
    }
}

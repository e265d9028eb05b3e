//! Native camera backend on top of `nokhwa`.
//!
//! Webcams exposed through nokhwa have no portable focus or exposure mode
//! switch, so native devices only advertise continuous autofocus and
//! continuous auto exposure. The `nokhwa::Camera` handle is created on the
//! capture thread and never leaves it.

use super::config::{CameraPosition, DeviceSettings, ExposureKind, ExposureMode, FocusMode};
use super::convert::{PixelFormat, RawBuffer};
use super::device::{
    CameraDevice, DeviceCapabilities, DeviceError, DeviceInfo, DeviceProvider, FrameStream,
    ReadFailures,
};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Enumerates cameras through the platform's native capture API.
#[derive(Debug, Default)]
pub struct NativeProvider;

impl NativeProvider {
    /// Creates a provider using the platform's default backend.
    pub fn new() -> Self {
        Self
    }

    fn query() -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate cameras");
                Vec::new()
            }
        }
    }
}

/// Desktop webcams face the user unless their name says otherwise.
fn guess_position(name: &str) -> CameraPosition {
    let name = name.to_ascii_lowercase();
    if ["back", "rear", "environment", "world"]
        .iter()
        .any(|hint| name.contains(hint))
    {
        CameraPosition::Back
    } else {
        CameraPosition::Front
    }
}

impl DeviceProvider for NativeProvider {
    fn devices(&self) -> Vec<DeviceInfo> {
        Self::query()
            .iter()
            .map(|camera| DeviceInfo {
                id: camera.index().to_string(),
                name: camera.human_name(),
                position: guess_position(&camera.human_name()),
            })
            .collect()
    }

    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice>, DeviceError> {
        let index = Self::query()
            .into_iter()
            .map(|camera| camera.index().clone())
            .find(|index| index.to_string() == info.id)
            .ok_or_else(|| DeviceError::OpenFailed(format!("camera {} not found", info.id)))?;

        tracing::info!(device = %info.name, index = %index, "Native camera selected");
        Ok(Box::new(NativeDevice {
            info: info.clone(),
            index,
            state: Mutex::new(NativeState {
                settings: DeviceSettings::default(),
                locked: false,
            }),
        }))
    }
}

struct NativeDevice {
    info: DeviceInfo,
    index: CameraIndex,
    state: Mutex<NativeState>,
}

struct NativeState {
    settings: DeviceSettings,
    locked: bool,
}

impl NativeDevice {
    fn state(&self) -> MutexGuard<'_, NativeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locked_state(&self) -> Result<MutexGuard<'_, NativeState>, DeviceError> {
        let state = self.state();
        if !state.locked {
            return Err(DeviceError::NotLocked);
        }
        Ok(state)
    }
}

impl CameraDevice for NativeDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            focus_modes: vec![FocusMode::Continuous],
            exposure_modes: vec![ExposureKind::ContinuousAuto],
            iso_range: None,
        }
    }

    fn settings(&self) -> DeviceSettings {
        self.state().settings
    }

    fn lock_for_configuration(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.locked {
            return Err(DeviceError::LockUnavailable(
                "already locked for configuration".to_string(),
            ));
        }
        state.locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state().locked = false;
    }

    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), DeviceError> {
        let mut state = self.locked_state()?;
        if mode != FocusMode::Continuous {
            return Err(DeviceError::Rejected(format!("focus mode {mode:?}")));
        }
        state.settings.focus = mode;
        Ok(())
    }

    fn set_exposure_mode(&self, mode: ExposureMode) -> Result<(), DeviceError> {
        let mut state = self.locked_state()?;
        if mode != ExposureMode::ContinuousAuto {
            return Err(DeviceError::Rejected(format!("exposure mode {mode:?}")));
        }
        state.settings.exposure = mode;
        Ok(())
    }

    fn open_stream(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameStream>, DeviceError> {
        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(self.index.clone(), requested)
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        let negotiated = camera.camera_format();
        tracing::info!(
            device = %self.info.name,
            width = negotiated.resolution().width(),
            height = negotiated.resolution().height(),
            fps = negotiated.frame_rate(),
            format = %negotiated.format(),
            "Native stream opened"
        );
        Ok(Box::new(NativeStream {
            camera,
            failures: ReadFailures::default(),
        }))
    }
}

/// nokhwa reports an unplugged camera as an ordinary read error, so a long
/// enough run of failures is taken as a disconnect.
struct NativeStream {
    camera: Camera,
    failures: ReadFailures,
}

impl FrameStream for NativeStream {
    fn next_buffer(&mut self) -> Result<RawBuffer, DeviceError> {
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => return Err(self.failures.failed(e.to_string())),
        };
        self.failures.succeeded();

        let format = match buffer.source_frame_format() {
            FrameFormat::MJPEG => PixelFormat::Mjpeg,
            FrameFormat::YUYV => PixelFormat::Yuyv,
            FrameFormat::NV12 => PixelFormat::Nv12,
            FrameFormat::GRAY => PixelFormat::Gray8,
            FrameFormat::RAWRGB => PixelFormat::Rgb24,
            other => {
                return Err(DeviceError::Stream(format!(
                    "unsupported frame format {other}"
                )))
            }
        };

        let resolution = buffer.resolution();
        Ok(RawBuffer::new(
            buffer.buffer().to_vec(),
            resolution.width(),
            resolution.height(),
            format,
        ))
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop native stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_guess() {
        assert_eq!(guess_position("FaceTime HD Camera"), CameraPosition::Front);
        assert_eq!(guess_position("USB Rear Camera"), CameraPosition::Back);
    }
}

//! Mock camera devices that generate synthetic frames.
//!
//! Used by tests and by the CLI when no hardware backend is compiled in.
//! Faults can be injected to exercise the capture loop's error paths.

use super::config::{CameraPosition, DeviceSettings, ExposureKind, ExposureMode, FocusMode};
use super::convert::{PixelFormat, RawBuffer};
use super::device::{
    CameraDevice, DeviceCapabilities, DeviceError, DeviceInfo, DeviceProvider, FrameStream,
    IsoRange,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Provider over a fixed set of mock devices.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    devices: Vec<MockDevice>,
}

impl MockProvider {
    /// A provider with one front and one back camera.
    pub fn new() -> Self {
        Self::empty()
            .with_device(MockDevice::new("mock-front", "Mock Front Camera", CameraPosition::Front))
            .with_device(MockDevice::new("mock-back", "Mock Back Camera", CameraPosition::Back))
    }

    /// A provider with no devices attached.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a device.
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Returns the handle for a device so tests can inspect or fault it.
    pub fn device(&self, id: &str) -> Option<MockDevice> {
        self.devices.iter().find(|d| d.info().id == id).cloned()
    }
}

impl DeviceProvider for MockProvider {
    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info().clone()).collect()
    }

    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice>, DeviceError> {
        let device = self
            .device(&info.id)
            .ok_or_else(|| DeviceError::OpenFailed(format!("no mock device {}", info.id)))?;
        tracing::info!(device = %info.name, "MockDevice opened");
        Ok(Box::new(device))
    }
}

/// Shared handle to a mock device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Arc<MockInner>,
}

#[derive(Debug)]
struct MockInner {
    info: DeviceInfo,
    capabilities: DeviceCapabilities,
    state: Mutex<MockState>,
    /// Every Nth buffer is truncated (0 disables).
    corrupt_every: AtomicU64,
    /// Stream reports `Disconnected` after this many buffers (0 disables).
    disconnect_after: AtomicU64,
    /// Exposure changes fail after focus has been applied.
    reject_exposure: AtomicBool,
    fail_stream_open: AtomicBool,
    open_gate: Gate,
    read_gate: Gate,
    buffers_delivered: AtomicU64,
}

/// Parks callers while closed.
#[derive(Debug, Default)]
struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
    waiting: AtomicBool,
}

impl Gate {
    fn set_closed(&self, closed: bool) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = closed;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        while *closed {
            self.waiting.store(true, Ordering::Release);
            closed = self
                .changed
                .wait(closed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.waiting.store(false, Ordering::Release);
    }

    fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct MockState {
    settings: DeviceSettings,
    locked: bool,
    lock_count: u64,
}

impl MockDevice {
    /// A device supporting every focus mode, every exposure mode and ISO 50-1600.
    pub fn new(id: &str, name: &str, position: CameraPosition) -> Self {
        Self::with_capabilities(
            id,
            name,
            position,
            DeviceCapabilities {
                focus_modes: vec![FocusMode::AutoOnce, FocusMode::Continuous, FocusMode::Locked],
                exposure_modes: vec![
                    ExposureKind::AutoOnce,
                    ExposureKind::ContinuousAuto,
                    ExposureKind::Locked,
                    ExposureKind::Custom,
                ],
                iso_range: Some(IsoRange {
                    min: 50.0,
                    max: 1600.0,
                }),
            },
        )
    }

    /// A device with the given capabilities.
    pub fn with_capabilities(
        id: &str,
        name: &str,
        position: CameraPosition,
        capabilities: DeviceCapabilities,
    ) -> Self {
        Self {
            inner: Arc::new(MockInner {
                info: DeviceInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    position,
                },
                capabilities,
                state: Mutex::new(MockState {
                    settings: DeviceSettings::default(),
                    locked: false,
                    lock_count: 0,
                }),
                corrupt_every: AtomicU64::new(0),
                disconnect_after: AtomicU64::new(0),
                reject_exposure: AtomicBool::new(false),
                fail_stream_open: AtomicBool::new(false),
                open_gate: Gate::default(),
                read_gate: Gate::default(),
                buffers_delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Truncates every `n`th buffer so that conversion fails.
    pub fn corrupt_every(&self, n: u64) {
        self.inner.corrupt_every.store(n, Ordering::Relaxed);
    }

    /// Ends the stream with `Disconnected` after `n` buffers.
    pub fn disconnect_after(&self, n: u64) {
        self.inner.disconnect_after.store(n, Ordering::Relaxed);
    }

    /// Makes the device refuse exposure changes.
    pub fn reject_exposure(&self, reject: bool) {
        self.inner.reject_exposure.store(reject, Ordering::Relaxed);
    }

    /// Makes `open_stream` fail, as a camera claimed by another process would.
    pub fn fail_stream_open(&self, fail: bool) {
        self.inner.fail_stream_open.store(fail, Ordering::Relaxed);
    }

    /// Parks `open_stream` until released.
    pub fn hold_stream_open(&self, hold: bool) {
        self.inner.open_gate.set_closed(hold);
    }

    /// Whether a caller is parked in `open_stream`.
    pub fn is_waiting_in_open(&self) -> bool {
        self.inner.open_gate.is_waiting()
    }

    /// Parks the stream's next read until released.
    pub fn hold_buffers(&self, hold: bool) {
        self.inner.read_gate.set_closed(hold);
    }

    /// Whether the stream is parked waiting for its next buffer.
    pub fn is_waiting_for_buffer(&self) -> bool {
        self.inner.read_gate.is_waiting()
    }

    /// Whether the configuration lock is held.
    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Number of times the configuration lock has been taken.
    pub fn lock_count(&self) -> u64 {
        self.state().lock_count
    }

    /// Buffers handed out across all streams.
    pub fn buffers_delivered(&self) -> u64 {
        self.inner.buffers_delivered.load(Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locked_state(&self) -> Result<MutexGuard<'_, MockState>, DeviceError> {
        let state = self.state();
        if !state.locked {
            return Err(DeviceError::NotLocked);
        }
        Ok(state)
    }

    /// Luma gain derived from the exposure setting.
    fn gain(&self) -> f32 {
        match self.state().settings.exposure {
            ExposureMode::Custom { iso } => (iso / 400.0).clamp(0.1, 4.0),
            _ => 1.0,
        }
    }
}

impl CameraDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.inner.capabilities.clone()
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
        state.lock_count += 1;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state().locked = false;
    }

    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), DeviceError> {
        let mut state = self.locked_state()?;
        if !self.inner.capabilities.supports_focus(mode) {
            return Err(DeviceError::Rejected(format!("focus mode {mode:?}")));
        }
        state.settings.focus = mode;
        Ok(())
    }

    fn set_exposure_mode(&self, mode: ExposureMode) -> Result<(), DeviceError> {
        let mut state = self.locked_state()?;
        if self.inner.reject_exposure.load(Ordering::Relaxed)
            && state.settings.exposure != mode
        {
            return Err(DeviceError::Rejected(format!("exposure mode {mode:?}")));
        }
        if !self.inner.capabilities.supports_exposure(&mode) {
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
        self.inner.open_gate.pass();
        if self.inner.fail_stream_open.load(Ordering::Relaxed) {
            return Err(DeviceError::OpenFailed(format!(
                "{} is in use by another client",
                self.inner.info.name
            )));
        }
        if width == 0 || height == 0 || fps == 0 {
            return Err(DeviceError::OpenFailed(format!(
                "unsupported stream format {width}x{height}@{fps}"
            )));
        }
        // YUYV packs pixel pairs.
        let width = width + width % 2;
        tracing::debug!(width, height, fps, "MockDevice stream opened");
        Ok(Box::new(MockStream {
            device: self.clone(),
            width,
            height,
            interval: Duration::from_secs(1) / fps,
            next_deadline: Instant::now(),
            sequence: 0,
        }))
    }
}

/// Paced generator of YUYV buffers with a moving gradient.
struct MockStream {
    device: MockDevice,
    width: u32,
    height: u32,
    interval: Duration,
    next_deadline: Instant,
    sequence: u64,
}

impl FrameStream for MockStream {
    fn next_buffer(&mut self) -> Result<RawBuffer, DeviceError> {
        let inner = &self.device.inner;
        inner.read_gate.pass();
        let disconnect_after = inner.disconnect_after.load(Ordering::Relaxed);
        if disconnect_after > 0 && self.sequence >= disconnect_after {
            return Err(DeviceError::Disconnected);
        }

        let now = Instant::now();
        if self.next_deadline > now {
            std::thread::sleep(self.next_deadline - now);
        }
        self.next_deadline = Instant::now() + self.interval;
        self.sequence += 1;

        let gain = self.device.gain();
        let mut data = Vec::with_capacity((self.width * self.height * 2) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let luma = ((x + y) as u64 + self.sequence * 4) % 256;
                let luma = (luma as f32 * gain).clamp(0.0, 255.0) as u8;
                let chroma = if x % 2 == 0 { 128 } else { (y % 256) as u8 };
                data.push(luma);
                data.push(chroma);
            }
        }

        let corrupt_every = inner.corrupt_every.load(Ordering::Relaxed);
        if corrupt_every > 0 && self.sequence % corrupt_every == 0 {
            data.truncate(data.len() / 2);
        }

        inner.buffers_delivered.fetch_add(1, Ordering::Relaxed);
        Ok(RawBuffer::new(data, self.width, self.height, PixelFormat::Yuyv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::ConfigurationLock;

    #[test]
    fn test_mock_provider_lists_both_positions() {
        let provider = MockProvider::new();
        let positions: Vec<_> = provider.devices().iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![CameraPosition::Front, CameraPosition::Back]);
    }

    #[test]
    fn test_setters_require_lock() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        assert_eq!(
            device.set_focus_mode(FocusMode::AutoOnce),
            Err(DeviceError::NotLocked)
        );

        {
            let _lock = ConfigurationLock::acquire(&device).unwrap();
            assert!(device.is_locked());
            device.set_focus_mode(FocusMode::AutoOnce).unwrap();
        }

        assert!(!device.is_locked());
        assert_eq!(device.settings().focus, FocusMode::AutoOnce);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        let _lock = ConfigurationLock::acquire(&device).unwrap();
        assert!(matches!(
            ConfigurationLock::acquire(&device),
            Err(DeviceError::LockUnavailable(_))
        ));
    }

    #[test]
    fn test_stream_delivers_yuyv_buffers() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        let mut stream = device.open_stream(8, 4, 120).unwrap();

        let buffer = stream.next_buffer().unwrap();
        assert_eq!(buffer.format, PixelFormat::Yuyv);
        assert_eq!(buffer.data.len(), 8 * 4 * 2);
        assert_eq!(device.buffers_delivered(), 1);
    }

    #[test]
    fn test_stream_open_fault() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        device.fail_stream_open(true);
        assert!(matches!(
            device.open_stream(4, 2, 30),
            Err(DeviceError::OpenFailed(_))
        ));

        device.fail_stream_open(false);
        assert!(device.open_stream(4, 2, 30).is_ok());
    }

    #[test]
    fn test_held_read_waits_for_release() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        device.hold_buffers(true);

        let handle = device.clone();
        let reader = std::thread::spawn(move || {
            let mut stream = handle.open_stream(4, 2, 120).unwrap();
            stream.next_buffer().map(|b| b.data.len())
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while !device.is_waiting_for_buffer() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(device.is_waiting_for_buffer());
        assert_eq!(device.buffers_delivered(), 0);

        device.hold_buffers(false);
        assert_eq!(reader.join().unwrap(), Ok(16));
        assert!(!device.is_waiting_for_buffer());
    }

    #[test]
    fn test_stream_corruption_and_disconnect() {
        let device = MockDevice::new("a", "A", CameraPosition::Front);
        device.corrupt_every(2);
        device.disconnect_after(2);
        let mut stream = device.open_stream(4, 2, 120).unwrap();

        assert_eq!(stream.next_buffer().unwrap().data.len(), 16);
        assert_eq!(stream.next_buffer().unwrap().data.len(), 8);
        assert_eq!(stream.next_buffer(), Err(DeviceError::Disconnected));
    }
}

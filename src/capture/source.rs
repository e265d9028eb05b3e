//! Capture source: owns the active device and the background capture loop.
//!
//! ```text
//! Stopped → Starting → Running ⇄ Reconfiguring
//!              │          │            │
//!              └──────────┴── stop() ──┴──→ Stopped
//! ```
//!
//! Each buffer the device delivers is converted on the capture thread and
//! published to the [`FrameSlot`]. Buffers that fail conversion are dropped
//! and counted; the loop keeps going.

use super::config::{CaptureConfig, ConfigError, DeviceSettings, ExposureMode, FocusMode};
use super::convert::{self, ConversionError};
use super::device::{
    CameraDevice, ConfigurationLock, DeviceError, DeviceInfo, DeviceProvider, IsoRange,
};
use super::permission::{PermissionService, PermissionStatus};
use crate::presenter::FrameSlot;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Pause after a transient stream error before reading again.
const STREAM_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Errors surfaced by capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera access is denied or not yet determined.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No matching device, it failed to open, or capture is not running.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The device cannot take the requested settings; nothing was changed.
    #[error("configuration rejected: {0}")]
    ConfigurationRejected(String),
    /// A buffer could not be converted. Only ever logged by the loop.
    #[error("frame conversion failed: {0}")]
    FrameConversionFailed(#[from] ConversionError),
    /// The configuration failed validation.
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Lifecycle state of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device open.
    Stopped,
    /// Opening the device and stream.
    Starting,
    /// Frames are being published.
    Running,
    /// Applying new settings; frames keep flowing.
    Reconfiguring,
}

/// Counters for the capture loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Buffers read from the device.
    pub frames_captured: u64,
    /// Frames handed to the slot.
    pub frames_published: u64,
    /// Buffers dropped because conversion failed.
    pub frames_dropped: u64,
    /// Transient read errors from the stream.
    pub stream_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    stream_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_published: self.published.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }
}

/// Continuously acquires frames from a camera and publishes them.
///
/// Dropping the source stops capture.
pub struct CaptureSource {
    shared: Arc<Shared>,
}

struct Shared {
    provider: Arc<dyn DeviceProvider>,
    permissions: Arc<dyn PermissionService>,
    sink: FrameSlot,
    counters: Arc<Counters>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: CaptureState,
    config: Option<CaptureConfig>,
    device: Option<Arc<dyn CameraDevice>>,
    worker: Option<Worker>,
    /// Stop flag of a worker that is still opening its stream.
    starting: Option<Arc<AtomicBool>>,
    /// Bumped by `stop()`; a permission grant only resumes capture if the
    /// generation it was requested under is still current.
    generation: u64,
    pending_resume: Option<u64>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            tracing::error!("Capture thread panicked");
        }
    }
}

impl CaptureSource {
    /// Creates a stopped source that publishes to `sink`.
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        permissions: Arc<dyn PermissionService>,
        sink: FrameSlot,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                permissions,
                sink,
                counters: Arc::new(Counters::default()),
                inner: Mutex::new(Inner {
                    state: CaptureState::Stopped,
                    config: None,
                    device: None,
                    worker: None,
                    starting: None,
                    generation: 0,
                    pending_resume: None,
                }),
            }),
        }
    }

    /// Starts capturing with `config`.
    ///
    /// When permission has not been determined yet, a request is issued and
    /// `PermissionDenied` returned; capture resumes on its own if the
    /// request is later granted and `stop()` has not been called since.
    /// Starting a running source is a no-op. A `stop()` issued while the
    /// device is still opening wins, and `start` then returns
    /// `DeviceUnavailable`.
    pub fn start(&self, config: CaptureConfig) -> Result<(), CaptureError> {
        config.validate()?;

        let mut inner = self.shared.lock();
        inner.reap_finished();
        if inner.state != CaptureState::Stopped {
            tracing::debug!(state = ?inner.state, "Capture already started");
            return Ok(());
        }

        match self.shared.permissions.check() {
            PermissionStatus::Granted => {}
            PermissionStatus::NotDetermined => {
                let generation = inner.generation;
                if inner.pending_resume == Some(generation) {
                    tracing::debug!("Camera permission request already pending");
                    return Err(CaptureError::PermissionDenied);
                }
                inner.pending_resume = Some(generation);
                drop(inner);

                tracing::info!("Camera permission not determined, requesting access");
                let weak = Arc::downgrade(&self.shared);
                self.shared.permissions.request(Box::new(move |granted| {
                    resume_after_permission(&weak, granted, generation, config);
                }));
                return Err(CaptureError::PermissionDenied);
            }
            PermissionStatus::Denied => {
                tracing::warn!("Camera permission denied");
                return Err(CaptureError::PermissionDenied);
            }
        }

        self.shared.launch(inner, config)
    }

    /// Applies the focus/exposure part of `config` to the active device.
    ///
    /// Camera position and orientation take effect on the next `start`.
    pub fn reconfigure(&self, config: &CaptureConfig) -> Result<(), CaptureError> {
        config.validate()?;
        if let Some(active) = self.active_config() {
            if active.position != config.position || active.orientation != config.orientation {
                tracing::debug!(
                    "Position and orientation changes apply on next start; ignoring for reconfigure"
                );
            }
        }
        self.shared.reconfigure(config.settings())
    }

    /// Switches between continuous and one-shot autofocus.
    ///
    /// A locked lens moves to continuous. Returns the new focus mode.
    pub fn toggle_focus_mode(&self) -> Result<FocusMode, CaptureError> {
        let current = self.active_settings().ok_or_else(not_running)?;
        let focus = match current.focus {
            FocusMode::AutoOnce | FocusMode::Locked => FocusMode::Continuous,
            FocusMode::Continuous => FocusMode::AutoOnce,
        };
        self.shared.reconfigure(DeviceSettings { focus, ..current })?;
        Ok(focus)
    }

    /// Enables continuous auto exposure, or locks the current exposure.
    pub fn set_auto_exposure(&self, enabled: bool) -> Result<(), CaptureError> {
        let current = self.active_settings().ok_or_else(not_running)?;
        let exposure = if enabled {
            ExposureMode::ContinuousAuto
        } else {
            ExposureMode::Locked
        };
        self.shared.reconfigure(DeviceSettings { exposure, ..current })
    }

    /// Switches to manual exposure at the given ISO.
    pub fn set_exposure_iso(&self, iso: f32) -> Result<(), CaptureError> {
        let current = self.active_settings().ok_or_else(not_running)?;
        self.shared.reconfigure(DeviceSettings {
            exposure: ExposureMode::Custom { iso },
            ..current
        })
    }

    /// Stops capture and cancels any pending permission resume. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Current lifecycle state. A loop that ended on a disconnect is
    /// reported as `Stopped`.
    pub fn state(&self) -> CaptureState {
        let mut inner = self.shared.lock();
        inner.reap_finished();
        inner.state
    }

    /// Loop counters, cumulative across restarts.
    pub fn stats(&self) -> CaptureStats {
        self.shared.counters.snapshot()
    }

    /// The slot frames are published to.
    pub fn sink(&self) -> &FrameSlot {
        &self.shared.sink
    }

    /// Configuration the source is running with.
    pub fn active_config(&self) -> Option<CaptureConfig> {
        self.shared.lock().config.clone()
    }

    /// Device the source is capturing from.
    pub fn active_device(&self) -> Option<DeviceInfo> {
        self.shared.active_device().map(|d| d.info().clone())
    }

    /// Focus and exposure currently in effect on the device.
    pub fn active_settings(&self) -> Option<DeviceSettings> {
        self.shared.active_device().map(|d| d.settings())
    }

    /// Manual ISO range of the active device.
    pub fn exposure_range(&self) -> Option<IsoRange> {
        self.shared
            .active_device()
            .and_then(|d| d.capabilities().iso_range)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

fn not_running() -> CaptureError {
    CaptureError::DeviceUnavailable("capture is not running".to_string())
}

fn resume_after_permission(
    shared: &Weak<Shared>,
    granted: bool,
    generation: u64,
    config: CaptureConfig,
) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.lock();
    if inner.pending_resume != Some(generation) {
        tracing::debug!("Permission resolved after stop; not resuming capture");
        return;
    }
    inner.pending_resume = None;

    if !granted {
        tracing::warn!("Camera permission request denied");
        return;
    }
    inner.reap_finished();
    if inner.state != CaptureState::Stopped {
        return;
    }

    tracing::info!("Camera permission granted, resuming capture");
    if let Err(e) = shared.launch(inner, config) {
        tracing::error!(error = %e, "Failed to resume capture after permission grant");
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_device(&self) -> Option<Arc<dyn CameraDevice>> {
        let mut inner = self.lock();
        inner.reap_finished();
        inner.device.clone()
    }

    /// Opens a device for `config` and spawns the capture thread.
    ///
    /// The lock is released while the device opens; `Starting` keeps other
    /// starts and reconfigures out. Leaves the source `Stopped` on failure.
    fn launch(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        config: CaptureConfig,
    ) -> Result<(), CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        inner.state = CaptureState::Starting;
        inner.starting = Some(Arc::clone(&stop));
        let generation = inner.generation;
        drop(inner);

        let started = self.spawn_capture(&config, stop);

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            if let Ok((_, worker)) = started {
                worker.shutdown();
            }
            tracing::info!("Capture stopped while starting");
            return Err(CaptureError::DeviceUnavailable(
                "capture stopped while starting".to_string(),
            ));
        }

        inner.starting = None;
        match started {
            Ok((device, worker)) => {
                tracing::info!(
                    device = %device.info().name,
                    position = %config.position,
                    width = config.width,
                    height = config.height,
                    fps = config.fps,
                    "Capture started"
                );
                inner.device = Some(device);
                inner.worker = Some(worker);
                inner.config = Some(config);
                inner.state = CaptureState::Running;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capture failed to start");
                inner.state = CaptureState::Stopped;
                Err(e)
            }
        }
    }

    fn spawn_capture(
        &self,
        config: &CaptureConfig,
        stop: Arc<AtomicBool>,
    ) -> Result<(Arc<dyn CameraDevice>, Worker), CaptureError> {
        let info = self
            .provider
            .devices()
            .into_iter()
            .find(|d| d.position == config.position)
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("no {} camera found", config.position))
            })?;

        let device: Arc<dyn CameraDevice> = Arc::from(
            self.provider
                .open(&info)
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?,
        );
        apply_settings(device.as_ref(), &config.settings())?;

        let finished = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let ctx = LoopContext {
            device: Arc::clone(&device),
            sink: self.sink.clone(),
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&stop),
            finished: Arc::clone(&finished),
            stream_format: (config.width, config.height, config.fps),
        };
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(ctx, ready_tx))
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::Stream("capture thread exited".to_string())));
        if let Err(e) = ready {
            if handle.join().is_err() {
                tracing::error!("Capture thread panicked during startup");
            }
            return Err(CaptureError::DeviceUnavailable(e.to_string()));
        }

        Ok((
            device,
            Worker {
                stop,
                finished,
                handle,
            },
        ))
    }

    fn reconfigure(&self, settings: DeviceSettings) -> Result<(), CaptureError> {
        let device = {
            let mut inner = self.lock();
            inner.reap_finished();
            if inner.state == CaptureState::Reconfiguring {
                return Err(CaptureError::ConfigurationRejected(
                    "another reconfiguration is in progress".to_string(),
                ));
            }
            let device = match (inner.state, inner.device.clone()) {
                (CaptureState::Running, Some(device)) => device,
                _ => return Err(not_running()),
            };
            inner.state = CaptureState::Reconfiguring;
            device
        };

        let result = apply_settings(device.as_ref(), &settings);

        let mut inner = self.lock();
        if inner.state == CaptureState::Reconfiguring {
            inner.state = CaptureState::Running;
        }
        if result.is_ok() {
            if let Some(config) = inner.config.take() {
                inner.config = Some(config.with_settings(settings));
            }
        }
        result
    }

    fn stop(&self) {
        let worker = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.pending_resume = None;
            inner.state = CaptureState::Stopped;
            inner.device = None;
            inner.config = None;
            // Raised under the lock so the loop sees it once `Stopped` is observable.
            if let Some(starting) = inner.starting.take() {
                starting.store(true, Ordering::Release);
            }
            let worker = inner.worker.take();
            if let Some(worker) = &worker {
                worker.stop.store(true, Ordering::Release);
            }
            worker
        };

        match worker {
            Some(worker) => {
                worker.shutdown();
                tracing::info!(stats = ?self.counters.snapshot(), "Capture stopped");
            }
            None => tracing::debug!("Capture already stopped"),
        }
    }
}

impl Inner {
    /// Clears a worker whose loop ended on its own (device disconnect).
    fn reap_finished(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.finished.load(Ordering::Acquire));
        if !finished {
            return;
        }
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.device = None;
        self.config = None;
        self.state = CaptureState::Stopped;
    }
}

/// Checks `settings` against the device, then applies them under the
/// configuration lock. The device is left untouched if anything is
/// unsupported, and restored if it fails mid-way.
fn apply_settings(
    device: &dyn CameraDevice,
    settings: &DeviceSettings,
) -> Result<(), CaptureError> {
    if let Some(reason) = device.capabilities().unsupported_reason(settings) {
        tracing::warn!(device = %device.info().name, %reason, "Configuration rejected");
        return Err(CaptureError::ConfigurationRejected(reason));
    }

    let previous = device.settings();
    if previous == *settings {
        tracing::trace!("Device already in requested configuration");
        return Ok(());
    }

    let lock = ConfigurationLock::acquire(device)
        .map_err(|e| CaptureError::ConfigurationRejected(e.to_string()))?;
    lock.apply(settings, &previous).map_err(|e| {
        tracing::warn!(error = %e, "Device rejected configuration; previous settings restored");
        CaptureError::ConfigurationRejected(e.to_string())
    })?;
    drop(lock);

    tracing::info!(
        device = %device.info().name,
        focus = ?settings.focus,
        exposure = ?settings.exposure,
        "Device configured"
    );
    Ok(())
}

struct LoopContext {
    device: Arc<dyn CameraDevice>,
    sink: FrameSlot,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    stream_format: (u32, u32, u32),
}

/// Marks the loop finished on every exit path, including panics.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn capture_loop(ctx: LoopContext, ready: mpsc::SyncSender<Result<(), DeviceError>>) {
    let _finish = FinishGuard(Arc::clone(&ctx.finished));
    let (width, height, fps) = ctx.stream_format;

    let mut stream = match ctx.device.open_stream(width, height, fps) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    drop(ready);

    let mut sequence = 0u64;
    while !ctx.stop.load(Ordering::Acquire) {
        let buffer = match stream.next_buffer() {
            Ok(buffer) => buffer,
            Err(DeviceError::Disconnected) => {
                tracing::warn!(device = %ctx.device.info().name, "Camera disconnected");
                break;
            }
            Err(e) => {
                ctx.counters.stream_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "Stream read failed");
                thread::sleep(STREAM_ERROR_BACKOFF);
                continue;
            }
        };

        sequence += 1;
        ctx.counters.captured.fetch_add(1, Ordering::Relaxed);

        match convert::convert(&buffer, sequence) {
            Ok(frame) => {
                if ctx.stop.load(Ordering::Acquire) {
                    tracing::trace!(sequence, "Dropping frame converted after stop");
                    break;
                }
                ctx.sink.publish(frame);
                ctx.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                ctx.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let err = CaptureError::from(e);
                tracing::debug!(sequence, error = %err, "Dropping buffer");
            }
        }
    }

    tracing::debug!(frames = sequence, "Capture loop exited");
}

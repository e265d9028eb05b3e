//! Render-side presenter state.

use super::orientation::{DeviceOrientation, ImageOrientation};
use super::scale::{display_scale, Viewport};
use super::slot::{FrameSlot, FrameSubscription};
use super::PresenterConfig;
use crate::capture::Frame;

/// What the renderer should currently show.
#[derive(Debug, Clone, Default)]
pub struct PresentationState {
    /// Latest frame pulled from the slot, `None` until the first arrives.
    pub frame: Option<Frame>,
    /// Display orientation for the frame.
    pub orientation: ImageOrientation,
}

/// Everything needed to draw one refresh.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// Frame to draw.
    pub frame: Frame,
    /// Rotation and mirroring to apply.
    pub orientation: ImageOrientation,
    /// Multiplier from frame pixels to viewport points.
    pub scale: f64,
}

/// Reads the latest frame for the renderer and tracks display orientation.
///
/// Lives on the render thread; every call is non-blocking.
#[derive(Debug)]
pub struct Presenter {
    subscription: FrameSubscription,
    state: PresentationState,
    device_scale: f64,
    frames_presented: u64,
}

impl Presenter {
    /// Subscribes to `slot`, picking up any frame already published.
    pub fn new(slot: &FrameSlot, config: &PresenterConfig) -> Self {
        let mut subscription = slot.subscribe();
        let frame = subscription.latest();
        Self {
            subscription,
            state: PresentationState {
                frame,
                orientation: ImageOrientation::default(),
            },
            device_scale: config.device_scale,
            frames_presented: 0,
        }
    }

    /// Maps a rotation event through the mirroring table.
    pub fn on_orientation_changed(&mut self, orientation: DeviceOrientation) -> ImageOrientation {
        let mapped = ImageOrientation::from(orientation);
        if mapped != self.state.orientation {
            tracing::debug!(
                device = ?orientation,
                display = ?mapped,
                "Display orientation changed"
            );
        }
        self.state.orientation = mapped;
        mapped
    }

    /// Pulls the latest frame if one was published since the last refresh.
    ///
    /// Returns true when the displayed frame changed.
    pub fn refresh(&mut self) -> bool {
        if !self.subscription.has_changed() {
            return false;
        }
        match self.subscription.latest() {
            Some(frame) => {
                self.frames_presented += 1;
                self.state.frame = Some(frame);
                true
            }
            None => false,
        }
    }

    /// Refreshes, then computes how to draw the current frame in `viewport`.
    pub fn render_plan(&mut self, viewport: Viewport) -> Option<RenderPlan> {
        self.refresh();
        let frame = self.state.frame.clone()?;
        let scale = display_scale(viewport, frame.width(), frame.height(), self.device_scale)?;
        Some(RenderPlan {
            frame,
            orientation: self.state.orientation,
            scale,
        })
    }

    /// Frame currently shown, if any.
    pub fn current_frame(&self) -> Option<&Frame> {
        self.state.frame.as_ref()
    }

    /// Current display orientation.
    pub fn orientation(&self) -> ImageOrientation {
        self.state.orientation
    }

    /// Frame and orientation together.
    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    /// Distinct frames picked up by `refresh`.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, sequence: u64) -> Frame {
        Frame::from_rgba(vec![0u8; (width * height * 4) as usize], width, height, sequence)
            .unwrap()
    }

    fn presenter(slot: &FrameSlot) -> Presenter {
        Presenter::new(slot, &PresenterConfig::default())
    }

    #[test]
    fn test_no_frame_before_publish() {
        let slot = FrameSlot::new();
        let mut presenter = presenter(&slot);
        assert!(!presenter.refresh());
        assert!(presenter.current_frame().is_none());
        assert!(presenter.render_plan(Viewport::new(300.0, 600.0)).is_none());
    }

    #[test]
    fn test_refresh_takes_latest_only() {
        let slot = FrameSlot::new();
        let mut presenter = presenter(&slot);

        for sequence in 1..=5 {
            slot.publish(frame(2, 2, sequence));
        }
        assert!(presenter.refresh());
        assert_eq!(presenter.current_frame().unwrap().sequence(), 5);
        assert_eq!(presenter.frames_presented(), 1);

        assert!(!presenter.refresh());
        assert_eq!(presenter.frames_presented(), 1);
    }

    #[test]
    fn test_picks_up_frame_published_before_creation() {
        let slot = FrameSlot::new();
        slot.publish(frame(2, 2, 3));
        let presenter = presenter(&slot);
        assert_eq!(presenter.current_frame().unwrap().sequence(), 3);
    }

    #[test]
    fn test_orientation_events() {
        let slot = FrameSlot::new();
        let mut presenter = presenter(&slot);
        assert_eq!(presenter.orientation(), ImageOrientation::UpMirrored);

        presenter.on_orientation_changed(DeviceOrientation::LandscapeRight);
        assert_eq!(presenter.orientation(), ImageOrientation::RightMirrored);

        presenter.on_orientation_changed(DeviceOrientation::FaceUp);
        assert_eq!(presenter.orientation(), ImageOrientation::UpMirrored);
    }

    #[test]
    fn test_render_plan() {
        let slot = FrameSlot::new();
        let config = PresenterConfig {
            device_scale: 2.0,
            ..Default::default()
        };
        let mut presenter = Presenter::new(&slot, &config);
        presenter.on_orientation_changed(DeviceOrientation::PortraitUpsideDown);
        slot.publish(frame(1200, 1600, 1));

        let plan = presenter.render_plan(Viewport::new(300.0, 600.0)).unwrap();
        assert_eq!(plan.frame.sequence(), 1);
        assert_eq!(plan.orientation, ImageOrientation::DownMirrored);
        assert!((plan.scale - 0.5).abs() < 1e-12);
    }
}

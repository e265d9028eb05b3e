//! Aspect-preserving display scale.

use serde::{Deserialize, Serialize};

/// Drawable area in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in points.
    pub width: f64,
    /// Height in points.
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport of the given size.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Scale that fits a frame inside `viewport`.
///
/// `min(viewport.width, viewport.height) / min(frame_width / device_scale,
/// frame_height / device_scale)`, where `device_scale` is pixels per point.
/// Returns `None` for empty or non-finite inputs.
pub fn display_scale(
    viewport: Viewport,
    frame_width: u32,
    frame_height: u32,
    device_scale: f64,
) -> Option<f64> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(viewport.width) || !valid(viewport.height) || !valid(device_scale) {
        return None;
    }
    if frame_width == 0 || frame_height == 0 {
        return None;
    }

    let frame_points =
        (frame_width as f64 / device_scale).min(frame_height as f64 / device_scale);
    Some(viewport.width.min(viewport.height) / frame_points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_portrait_phone_example() {
        // 1200x1600 at 2x is 600x800 points; 300 / 600.
        let scale = display_scale(Viewport::new(300.0, 600.0), 1200, 1600, 2.0).unwrap();
        assert!((scale - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(display_scale(Viewport::new(0.0, 600.0), 100, 100, 1.0).is_none());
        assert!(display_scale(Viewport::new(300.0, 600.0), 0, 100, 1.0).is_none());
        assert!(display_scale(Viewport::new(300.0, 600.0), 100, 100, 0.0).is_none());
        assert!(display_scale(Viewport::new(f64::NAN, 600.0), 100, 100, 1.0).is_none());
    }

    proptest! {
        #[test]
        fn prop_scaled_short_side_matches_viewport(
            vw in 1.0f64..4000.0,
            vh in 1.0f64..4000.0,
            fw in 1u32..8000,
            fh in 1u32..8000,
            ds in 1.0f64..4.0,
        ) {
            let scale = display_scale(Viewport::new(vw, vh), fw, fh, ds).unwrap();
            let short_side = (fw as f64 / ds).min(fh as f64 / ds) * scale;
            prop_assert!((short_side - vw.min(vh)).abs() < 1e-6 * vw.min(vh).max(1.0));
        }
    }
}
